use crate::converter::ConverterError;

/// Job-level failure of an image or video sticker conversion.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    /// The requested trim window yields no playable clip.
    #[error("Invalid time range: start {start}s, end {end}s")]
    InvalidTrimRange { start: f64, end: f64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Another job with the same task id is still running.
    #[error("Task already in progress: {0}")]
    TaskExists(String),

    #[error(transparent)]
    Conversion(#[from] ConverterError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessingError {
    /// Whether the caller's input caused the failure (as opposed to the service).
    pub fn is_input_error(&self) -> bool {
        match self {
            Self::InvalidTrimRange { .. } | Self::InvalidInput(_) | Self::TaskExists(_) => true,
            Self::Conversion(e) => e.is_input_error(),
            Self::Io(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_classification() {
        assert!(ProcessingError::InvalidTrimRange { start: 2.0, end: 1.0 }.is_input_error());
        assert!(ProcessingError::TaskExists("t".into()).is_input_error());
        assert!(ProcessingError::from(ConverterError::InputNotFound {
            path: PathBuf::from("/x")
        })
        .is_input_error());
        assert!(!ProcessingError::from(ConverterError::transcode_failed("exit 1", None))
            .is_input_error());
        assert!(!ProcessingError::from(std::io::Error::other("disk")).is_input_error());
    }

    #[test]
    fn test_message_is_short() {
        let err = ProcessingError::InvalidTrimRange { start: 2.0, end: 1.0 };
        assert_eq!(err.to_string(), "Invalid time range: start 2s, end 1s");
    }
}
