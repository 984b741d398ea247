use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Linear RMS threshold below which a frame counts as silence.
/// (-30 dB = 0.0316, -40 dB = 0.01, -50 dB = 0.003)
pub const DEFAULT_SILENCE_THRESHOLD: f32 = 0.01;

/// Seconds of uninterrupted initial silence before a recording auto-stops.
pub const DEFAULT_SILENT_START_TIMEOUT_SECS: f64 = 4.0;

/// Capture tuning handed to the recording engine at construction. There is no
/// process-wide settings state; the external settings store deserializes this
/// and passes it in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Linear RMS threshold for the silence classifier.
    pub silence_threshold: f32,
    /// Initial-silence budget in seconds. `None` disables auto-stop.
    pub silent_start_timeout: Option<f64>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            silence_threshold: DEFAULT_SILENCE_THRESHOLD,
            silent_start_timeout: Some(DEFAULT_SILENT_START_TIMEOUT_SECS),
        }
    }
}

impl CaptureConfig {
    pub fn silent_start_timeout(&self) -> Option<Duration> {
        self.silent_start_timeout.map(Duration::from_secs_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = CaptureConfig::default();
        assert_eq!(config.silence_threshold, 0.01);
        assert_eq!(config.silent_start_timeout, Some(4.0));
        assert_eq!(
            config.silent_start_timeout(),
            Some(Duration::from_secs_f64(4.0))
        );
    }

    #[test]
    fn null_timeout_disables_auto_stop() {
        let config: CaptureConfig =
            serde_json::from_str(r#"{"silence_threshold": 0.003, "silent_start_timeout": null}"#)
                .unwrap();
        assert_eq!(config.silence_threshold, 0.003);
        assert_eq!(config.silent_start_timeout(), None);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: CaptureConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, CaptureConfig::default());
    }
}
