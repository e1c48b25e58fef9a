//! Protocol errors.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while building or decoding protocol values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Underlying CBOR error.
    #[error("codec error: {0}")]
    Codec(#[from] txsync_codec::CodecError),

    /// A timestamp that is not 20 digits of `YYYYMMDDHHMMSSffffff`.
    #[error("invalid transaction timestamp '{value}'")]
    InvalidTimestamp {
        /// The rejected text.
        value: String,
    },

    /// An action code other than `I`, `U` or `D`.
    #[error("invalid action code '{code}'")]
    InvalidAction {
        /// The rejected code.
        code: String,
    },

    /// A row or snapshot identifier that is not 16 bytes.
    #[error("invalid identifier in field '{field}'")]
    InvalidId {
        /// Field holding the identifier.
        field: String,
    },

    /// A snapshot value with an unknown or malformed shape.
    #[error("invalid snapshot value: {message}")]
    InvalidSnapshot {
        /// Description of the problem.
        message: String,
    },
}

impl ProtocolError {
    /// Create an invalid snapshot error.
    pub fn invalid_snapshot(message: impl Into<String>) -> Self {
        Self::InvalidSnapshot {
            message: message.into(),
        }
    }
}
