//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during publishing, transport or replay.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Replay attempted on a node that is not a server.
    ///
    /// Raised before any incoming row is read.
    #[error("device {device_id} is not authorized to consume incoming transactions")]
    Authorization {
        /// Identifier of the refusing device.
        device_id: String,
    },

    /// A reference in a snapshot has no local match and the model's resolver
    /// did not supply one.
    #[error("unresolved reference {model}.{field} -> {target_model} {key}")]
    UnresolvedReference {
        /// Model being replayed.
        model: String,
        /// Field holding the reference.
        field: String,
        /// Referenced model.
        target_model: String,
        /// Natural key that was not found.
        key: String,
    },

    /// A snapshot could not be built or read back.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A payload could not be decrypted.
    #[error("decryption error: {0}")]
    Decryption(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] txsync_core::CoreError),

    /// Malformed protocol row.
    #[error("protocol error: {0}")]
    Protocol(#[from] txsync_protocol::ProtocolError),

    /// A background task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(String),
}

impl SyncError {
    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Creates a decryption error.
    pub fn decryption(message: impl Into<String>) -> Self {
        Self::Decryption(message.into())
    }

    /// Returns true if the error concerns a single incoming row.
    ///
    /// Row-level errors leave the row pending and let the batch continue.
    pub fn is_row_level(&self) -> bool {
        matches!(
            self,
            SyncError::UnresolvedReference { .. }
                | SyncError::Serialization(_)
                | SyncError::Decryption(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_level_errors() {
        assert!(SyncError::serialization("bad date").is_row_level());
        assert!(SyncError::decryption("tag mismatch").is_row_level());
        assert!(SyncError::UnresolvedReference {
            model: "ComplexTestModel".into(),
            field: "fk".into(),
            target_model: "Fk".into(),
            key: "(g)".into(),
        }
        .is_row_level());
        assert!(!SyncError::Authorization {
            device_id: "10".into()
        }
        .is_row_level());
    }

    #[test]
    fn error_display() {
        let err = SyncError::Authorization {
            device_id: "10".into(),
        };
        assert!(err.to_string().contains("10"));

        let err = SyncError::UnresolvedReference {
            model: "ComplexTestModel".into(),
            field: "fk".into(),
            target_model: "Fk".into(),
            key: "(g)".into(),
        };
        assert_eq!(
            err.to_string(),
            "unresolved reference ComplexTestModel.fk -> Fk (g)"
        );
    }

    #[test]
    fn malformed_row_is_a_protocol_error() {
        let err: SyncError = txsync_protocol::IncomingTransaction::decode(&[0xff, 0x00])
            .unwrap_err()
            .into();
        assert!(matches!(err, SyncError::Protocol(_)));
        assert!(!err.is_row_level());
    }
}
