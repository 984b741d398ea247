use std::path::Path;

use crate::constants::MIN_DURATION_SECS;
use crate::level::rms_to_db;

/// Post-hoc verdict on a finished recording.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingAnalysis {
    pub valid: bool,
    /// Empty when valid; otherwise states what disqualified the file.
    pub reason: String,
}

impl RecordingAnalysis {
    fn ok() -> Self {
        Self {
            valid: true,
            reason: String::new(),
        }
    }

    fn invalid(reason: String) -> Self {
        Self {
            valid: false,
            reason,
        }
    }
}

/// Validate a completed recording for minimum duration and overall loudness.
/// Faults reading the file are reported in the verdict, never raised.
pub fn analyze_recording(path: &Path, silence_threshold: f32) -> RecordingAnalysis {
    let mut reader = match hound::WavReader::open(path) {
        Ok(reader) => reader,
        Err(e) => return RecordingAnalysis::invalid(format!("Error analyzing audio: {}", e)),
    };

    let spec = reader.spec();
    let duration = reader.duration() as f64 / spec.sample_rate as f64;
    if duration < MIN_DURATION_SECS {
        return RecordingAnalysis::invalid(format!(
            "Recording too short ({:.1}s < {:.1}s)",
            duration, MIN_DURATION_SECS
        ));
    }

    let mut sum_squares = 0.0f64;
    let mut count = 0u64;
    for sample in reader.samples::<i16>() {
        match sample {
            Ok(sample) => {
                let normalized = sample as f64 / 32768.0;
                sum_squares += normalized * normalized;
                count += 1;
            }
            Err(e) => return RecordingAnalysis::invalid(format!("Error analyzing audio: {}", e)),
        }
    }
    if count == 0 {
        return RecordingAnalysis::invalid(format!(
            "Recording too short (0.0s < {:.1}s)",
            MIN_DURATION_SECS
        ));
    }

    let rms = (sum_squares / count as f64).sqrt() as f32;
    if rms < silence_threshold {
        let db = rms_to_db(rms);
        return RecordingAnalysis::invalid(format!(
            "Recording contains mostly silence (RMS: {:.4} / {:.1}dB < threshold: {:.4})",
            rms, db, silence_threshold
        ));
    }

    RecordingAnalysis::ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SAMPLE_RATE_HZ;
    use hound::{WavSpec, WavWriter};
    use std::path::PathBuf;

    fn write_square_wav(dir: &tempfile::TempDir, secs: f64, amplitude: i16) -> PathBuf {
        let path = dir.path().join("clip.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: SAMPLE_RATE_HZ,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        let total = (secs * SAMPLE_RATE_HZ as f64) as usize;
        for i in 0..total {
            let sample = if i % 2 == 0 { amplitude } else { -amplitude };
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn rejects_short_recording_regardless_of_loudness() {
        let dir = tempfile::tempdir().unwrap();
        // Half a second of near-full-scale audio.
        let path = write_square_wav(&dir, 0.5, 30_000);
        let verdict = analyze_recording(&path, 0.01);
        assert!(!verdict.valid);
        assert!(verdict.reason.contains("too short"), "{}", verdict.reason);
    }

    #[test]
    fn rejects_mostly_silent_recording() {
        let dir = tempfile::tempdir().unwrap();
        // Three seconds at RMS ~0.002, under a 0.01 threshold.
        let path = write_square_wav(&dir, 3.0, 66);
        let verdict = analyze_recording(&path, 0.01);
        assert!(!verdict.valid);
        assert!(
            verdict.reason.contains("mostly silence"),
            "{}",
            verdict.reason
        );
    }

    #[test]
    fn accepts_long_enough_audible_recording() {
        let dir = tempfile::tempdir().unwrap();
        // Three seconds at RMS ~0.05.
        let path = write_square_wav(&dir, 3.0, 1638);
        let verdict = analyze_recording(&path, 0.01);
        assert!(verdict.valid, "{}", verdict.reason);
        assert!(verdict.reason.is_empty());
    }

    #[test]
    fn missing_file_reports_fault_as_invalid() {
        let verdict = analyze_recording(Path::new("/nonexistent/clip.wav"), 0.01);
        assert!(!verdict.valid);
        assert!(
            verdict.reason.contains("Error analyzing audio"),
            "{}",
            verdict.reason
        );
    }
}
