use std::time::{Duration, Instant};

use murmur_foundation::SharedClock;

/// Tracks silence at the head of a recording session. Once any frame clears
/// the threshold the gate disengages for the rest of the session and never
/// re-arms, even across long pauses later on.
pub struct SilenceGate {
    threshold: f32,
    timeout: Option<Duration>,
    clock: SharedClock,
    silence_since: Option<Instant>,
    first_sound_detected: bool,
}

impl SilenceGate {
    pub fn new(threshold: f32, timeout: Option<Duration>, clock: SharedClock) -> Self {
        Self {
            threshold,
            timeout,
            clock,
            silence_since: None,
            first_sound_detected: false,
        }
    }

    /// Feed one frame's RMS. Returns true when the initial-silence budget is
    /// exhausted and the session should auto-stop.
    pub fn observe(&mut self, rms: f32) -> bool {
        let Some(timeout) = self.timeout else {
            return false;
        };
        if self.first_sound_detected {
            return false;
        }

        if rms < self.threshold {
            match self.silence_since {
                None => {
                    self.silence_since = Some(self.clock.now());
                    tracing::debug!(rms, threshold = self.threshold, "initial silence started");
                }
                Some(since) => {
                    if self.clock.now().duration_since(since) >= timeout {
                        tracing::info!(
                            ?timeout,
                            rms,
                            "auto-stopping after sustained initial silence"
                        );
                        return true;
                    }
                }
            }
        } else {
            if self.silence_since.is_some() {
                tracing::debug!(
                    rms,
                    threshold = self.threshold,
                    "sound detected, silence gate disengaged"
                );
            }
            self.first_sound_detected = true;
            self.silence_since = None;
        }
        false
    }

    pub fn first_sound_detected(&self) -> bool {
        self.first_sound_detected
    }

    pub fn silence_since(&self) -> Option<Instant> {
        self.silence_since
    }
}
