//! Per-frame energy math for the capture path: linear RMS, dB conversion,
//! and the smoothed [0, 1] level fed to the UI collaborator.

use crate::constants::{LEVEL_SMOOTHING, RMS_EPSILON};

/// Linear RMS of one interleaved frame, normalized to [0, 1]. Multichannel
/// frames are averaged across channels first so a frame measures the same as
/// its mono downmix.
pub fn frame_rms(samples: &[i16], channels: u16) -> f32 {
    let channels = channels.max(1) as usize;
    let mut sum_squares = 0.0f64;
    let mut frames = 0usize;
    for frame in samples.chunks_exact(channels) {
        let mono =
            frame.iter().map(|&s| s as f64).sum::<f64>() / channels as f64 / 32768.0;
        sum_squares += mono * mono;
        frames += 1;
    }
    if frames == 0 {
        return 0.0;
    }
    (sum_squares / frames as f64).sqrt() as f32
}

/// `20·log10(rms)` with a floor keeping digital silence finite.
pub fn rms_to_db(rms: f32) -> f32 {
    20.0 * rms.max(RMS_EPSILON).log10()
}

/// Map dB in [-60, 0] onto a display level clamped to [0, 1].
pub fn normalized_level(db: f32) -> f32 {
    ((db + 60.0) / 60.0).clamp(0.0, 1.0)
}

/// Exponential moving average over the normalized level.
#[derive(Debug, Default)]
pub struct LevelMeter {
    smoothed: f32,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, rms: f32) -> f32 {
        let level = normalized_level(rms_to_db(rms));
        self.smoothed = LEVEL_SMOOTHING * level + (1.0 - LEVEL_SMOOTHING) * self.smoothed;
        self.smoothed
    }

    pub fn value(&self) -> f32 {
        self.smoothed
    }
}
