//! Error types for rdelta.

use std::fmt;

/// Errors that can occur while building, reading, or applying signatures and
/// deltas.
#[derive(Debug)]
pub enum DeltaError {
    /// An I/O error occurred while reading or writing a stream.
    Io(std::io::Error),

    /// The stream is not a recognized signature or delta format, or is
    /// structurally corrupt (bad magic, bad version, truncated metadata).
    Format {
        /// Description of what was malformed.
        message: String,
    },

    /// The stream names a hash or rolling-checksum algorithm this build does
    /// not know.
    UnsupportedAlgorithm {
        /// The algorithm name as recorded in the stream.
        name: String,
    },

    /// The reconstructed file's hash does not match the hash recorded in the
    /// delta metadata.
    IntegrityFailure {
        /// Expected hash, lowercase hex.
        expected: String,
        /// Actual hash of the reconstructed output, lowercase hex.
        actual: String,
    },

    /// Invalid configuration parameter.
    InvalidConfig {
        /// Description of what was invalid.
        message: &'static str,
    },

    /// The operation was cancelled via a [`CancelToken`](crate::CancelToken).
    Cancelled,
}

impl fmt::Display for DeltaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeltaError::Io(e) => write!(f, "io error: {}", e),
            DeltaError::Format { message } => write!(f, "invalid format: {}", message),
            DeltaError::UnsupportedAlgorithm { name } => {
                write!(f, "unsupported algorithm: {:?}", name)
            }
            DeltaError::IntegrityFailure { expected, actual } => {
                write!(
                    f,
                    "verification of the patched file failed: expected hash {}, got {}",
                    expected, actual
                )
            }
            DeltaError::InvalidConfig { message } => {
                write!(f, "invalid config: {}", message)
            }
            DeltaError::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for DeltaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeltaError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DeltaError {
    fn from(e: std::io::Error) -> Self {
        DeltaError::Io(e)
    }
}

impl From<serde_json::Error> for DeltaError {
    fn from(e: serde_json::Error) -> Self {
        DeltaError::Format {
            message: format!("metadata is not valid JSON: {}", e),
        }
    }
}

impl DeltaError {
    pub(crate) fn format(message: impl Into<String>) -> Self {
        DeltaError::Format {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: DeltaError = io_err.into();
        matches!(err, DeltaError::Io(_));
    }

    #[test]
    fn test_display() {
        let err = DeltaError::UnsupportedAlgorithm {
            name: "CRC32".to_string(),
        };
        assert!(err.to_string().contains("unsupported algorithm"));

        let err = DeltaError::IntegrityFailure {
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        };
        assert!(err.to_string().contains("expected hash aa"));
    }
}
