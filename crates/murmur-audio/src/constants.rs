use std::time::Duration;

// Recording format: 22.05 kHz gives headroom over the 16 kHz most STT engines
// want, 16-bit mono is standard for speech. ~2.6 MB per minute.

/// Sample rate of every recorded artifact, in Hz.
pub const SAMPLE_RATE_HZ: u32 = 22_050;

/// Bit depth of the recorded artifact.
pub const BITS_PER_SAMPLE: u16 = 16;

/// Shortest recording the analyzer accepts, in seconds.
pub const MIN_DURATION_SECS: f64 = 1.0;

/// EMA factor for the level feed. Higher tracks faster but jitters; 0.2
/// keeps an indicator readable.
pub const LEVEL_SMOOTHING: f32 = 0.2;

/// Floor applied before log conversion so digital silence maps to a finite dB.
pub const RMS_EPSILON: f32 = 1e-10;

/// Bounded wait for the capture thread to report stream startup.
pub const START_TIMEOUT: Duration = Duration::from_secs(3);

/// Bounded wait for the capture thread to wind down on stop().
pub const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Poll interval of the stream-owning loop while a session is active.
pub const CAPTURE_POLL_INTERVAL: Duration = Duration::from_millis(50);
