//! Error types for bcfstm

use thiserror::Error;

/// Result type alias for bcfstm operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for bcfstm
///
/// The container carries every length and offset redundantly, so most
/// failures are structural: two copies of the same fact disagree, or a
/// declared region does not fit inside the input. Those are kept distinct
/// from content the parser understands but does not decode (`Unsupported`)
/// and from the destination refusing to grow to the computed file length
/// (`Capacity`).
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The container violates its own bookkeeping
    #[error("Structural error in {field}: {reason}")]
    Structural {
        /// The header field or chunk that failed validation
        field: String,
        /// What was expected versus what was found
        reason: String,
    },

    /// Valid container, but a content variant this codec does not decode
    #[error("Unsupported content: {0}")]
    Unsupported(String),

    /// Destination sink cannot be sized to the computed file length
    #[error("Capacity error: {sink} cannot be sized to {needed} bytes")]
    Capacity {
        /// The sink that failed to resize
        sink: String,
        /// The computed file length in bytes
        needed: usize,
    },

    /// Invalid caller-supplied argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Create a structural error naming the failing field
    pub fn structural<F: Into<String>, R: Into<String>>(field: F, reason: R) -> Self {
        Error::Structural {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an unsupported-content error
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Error::Unsupported(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Error::InvalidInput(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_names_field() {
        let err = Error::structural("INFO", "length mismatch");
        assert_eq!(err.to_string(), "Structural error in INFO: length mismatch");
    }

    #[test]
    fn test_capacity_display() {
        let err = Error::Capacity {
            sink: "output buffer".to_string(),
            needed: 1024,
        };
        assert!(err.to_string().contains("1024"));
    }
}
