//! Error types for SoundStage

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SoundStageError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Sound stage command queue is closed")]
    QueueClosed,
}

impl SoundStageError {
    /// Returns true if this error came from data the decoder could not understand,
    /// as opposed to a failure to read it.
    pub fn is_format_error(&self) -> bool {
        matches!(self, Self::UnsupportedFormat(_))
    }
}

pub type Result<T> = std::result::Result<T, SoundStageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_convert_and_are_not_format_errors() {
        let err: SoundStageError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing.ogg").into();
        assert!(!err.is_format_error());
        assert!(err.to_string().contains("missing.ogg"));

        let err = SoundStageError::UnsupportedFormat("mod tracker".into());
        assert!(err.is_format_error());
    }
}
