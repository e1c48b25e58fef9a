//! Replay outcome reporting.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A row that failed to replay and stayed pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// Incoming row identifier.
    pub tx_id: Uuid,
    /// What went wrong.
    pub message: String,
}

/// Counts for one model name within one replay batch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeserializationResult {
    /// Model name.
    pub tx_name: String,
    /// Entities created.
    pub inserted: usize,
    /// Entities changed.
    pub updated: usize,
    /// Entities removed.
    pub deleted: usize,
    /// Rows left pending.
    pub errors: Vec<RowError>,
}

impl DeserializationResult {
    /// An empty result for `tx_name`.
    pub fn new(tx_name: impl Into<String>) -> Self {
        Self {
            tx_name: tx_name.into(),
            ..Self::default()
        }
    }

    /// `(inserted, updated, deleted)`.
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.inserted, self.updated, self.deleted)
    }

    /// Whether every row for this model applied.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}
