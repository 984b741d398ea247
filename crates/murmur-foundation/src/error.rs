use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {name:?}")]
    DeviceNotFound { name: Option<String> },

    #[error("Recording already in progress")]
    AlreadyActive,

    #[error("Format not supported: {format}")]
    FormatNotSupported { format: String },

    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Default stream config error: {0}")]
    DefaultStreamConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("Build stream error: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Play stream error: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("Fatal error, cannot recover: {0}")]
    Fatal(String),
}
