//! Error types for txsync core.

use std::error::Error as StdError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A model is missing a required capability or is otherwise misdeclared.
    ///
    /// Raised before any persistence attempt.
    #[error("model {model} is misconfigured: {message}")]
    Configuration {
        /// The offending model.
        model: String,
        /// What is missing.
        message: String,
    },

    /// No model with this name is registered in the schema.
    #[error("unknown model: {name}")]
    UnknownModel {
        /// The requested model name.
        name: String,
    },

    /// A field value does not fit its declaration.
    #[error("invalid value for {model}.{field}: {message}")]
    InvalidField {
        /// Model name.
        model: String,
        /// Field name.
        field: String,
        /// Description of the mismatch.
        message: String,
    },

    /// A unique field already holds this value in another entity.
    #[error("unique constraint violated on {model}.{field} ({value})")]
    UniqueViolation {
        /// Model name.
        model: String,
        /// Field name.
        field: String,
        /// The clashing value, rendered for diagnostics.
        value: String,
    },

    /// Transaction was aborted.
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Reason for abort.
        reason: String,
    },

    /// Invalid operation.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// A registered write hook failed; the write was not applied.
    #[error("write hook failed: {0}")]
    Hook(#[source] Box<dyn StdError + Send + Sync>),

    /// Encryption operation failed.
    #[error("encryption failed: {message}")]
    EncryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Decryption operation failed (wrong key, wrong keyring or tampered data).
    #[error("decryption failed: {message}")]
    DecryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Invalid encryption key size.
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize {
        /// Actual key size provided.
        actual: usize,
        /// Expected key size.
        expected: usize,
    },

    /// Key derivation failed.
    #[error("key derivation failed: {message}")]
    KeyDerivationFailed {
        /// Description of the failure.
        message: String,
    },

    /// No key is installed for the named keyring.
    #[error("unknown keyring: {name}")]
    UnknownKeyring {
        /// Keyring name.
        name: String,
    },

    /// The cipher does not implement the requested algorithm.
    #[error("unsupported algorithm: {name}")]
    UnsupportedAlgorithm {
        /// Algorithm name.
        name: String,
    },
}

impl CoreError {
    /// Create a configuration error.
    pub fn configuration(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Create an unknown model error.
    pub fn unknown_model(name: impl Into<String>) -> Self {
        Self::UnknownModel { name: name.into() }
    }

    /// Create an invalid field error.
    pub fn invalid_field(
        model: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidField {
            model: model.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a transaction aborted error.
    pub fn transaction_aborted(reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            reason: reason.into(),
        }
    }

    /// Create an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Wrap an error raised by a write hook.
    pub fn hook(err: impl StdError + Send + Sync + 'static) -> Self {
        Self::Hook(Box::new(err))
    }

    /// Create an encryption failed error.
    pub fn encryption_failed(message: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            message: message.into(),
        }
    }

    /// Create a decryption failed error.
    pub fn decryption_failed(message: impl Into<String>) -> Self {
        Self::DecryptionFailed {
            message: message.into(),
        }
    }

    /// Create an invalid key size error.
    pub fn invalid_key_size(actual: usize, expected: usize) -> Self {
        Self::InvalidKeySize { actual, expected }
    }

    /// Create a key derivation failed error.
    pub fn key_derivation_failed(message: impl Into<String>) -> Self {
        Self::KeyDerivationFailed {
            message: message.into(),
        }
    }

    /// Returns true for unique constraint violations.
    ///
    /// Concurrent creation races surface this way at commit.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }

    /// Returns the hook error as `E` if this error came from a hook of that type.
    pub fn hook_source<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            Self::Hook(source) => source.downcast_ref::<E>(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("publisher offline")]
    struct Offline;

    #[test]
    fn configuration_message_names_model() {
        let err = CoreError::configuration("BadTestModel", "missing natural_key");
        assert_eq!(
            err.to_string(),
            "model BadTestModel is misconfigured: missing natural_key"
        );
    }

    #[test]
    fn hook_source_downcasts() {
        let err = CoreError::hook(Offline);
        assert!(err.hook_source::<Offline>().is_some());
        assert!(err.to_string().contains("publisher offline"));
        assert!(CoreError::invalid_operation("x").hook_source::<Offline>().is_none());
    }
}
