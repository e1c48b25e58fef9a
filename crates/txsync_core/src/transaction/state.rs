//! Transaction state and staged writes.

use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been aborted, explicitly or by a failing hook.
    Aborted,
}

impl TransactionState {
    pub(crate) fn ensure_active(self) -> CoreResult<()> {
        match self {
            TransactionState::Active => Ok(()),
            TransactionState::Committed => {
                Err(CoreError::invalid_operation("transaction already committed"))
            }
            TransactionState::Aborted => {
                Err(CoreError::transaction_aborted("transaction was aborted"))
            }
        }
    }
}

/// A staged entity write.
#[derive(Debug, Clone)]
pub enum PendingWrite {
    /// Insert or update.
    Put(Entity),
    /// Removal.
    Delete,
}

impl PendingWrite {
    /// The staged entity, if this is a put.
    pub fn entity(&self) -> Option<&Entity> {
        match self {
            PendingWrite::Put(entity) => Some(entity),
            PendingWrite::Delete => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_active_accepts_work() {
        assert!(TransactionState::Active.ensure_active().is_ok());
        assert!(matches!(
            TransactionState::Committed.ensure_active(),
            Err(CoreError::InvalidOperation { .. })
        ));
        assert!(matches!(
            TransactionState::Aborted.ensure_active(),
            Err(CoreError::TransactionAborted { .. })
        ));
    }
}
