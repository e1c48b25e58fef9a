//! Write hooks.
//!
//! Hooks observe every non-raw write from inside the writing transaction, so
//! anything a hook writes commits or rolls back together with the write that
//! triggered it.

use crate::entity::Entity;
use crate::error::CoreResult;
use crate::model::Model;
use crate::transaction::Transaction;
use std::sync::Arc;

/// Kind of write observed by a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteAction {
    /// First save of the entity.
    Insert,
    /// Any later save.
    Update,
    /// Removal.
    Delete,
}

/// Per-call write options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaveOptions {
    /// Skip every hook and history recording. Used when replaying.
    pub raw: bool,
    /// Overrides the publisher's global serialization switch for this call.
    pub publish: Option<bool>,
}

impl SaveOptions {
    /// Options for a replayed write.
    pub const fn raw() -> Self {
        Self {
            raw: true,
            publish: None,
        }
    }

    /// Options that force publication on or off for this call.
    pub const fn publish(enabled: bool) -> Self {
        Self {
            raw: false,
            publish: Some(enabled),
        }
    }
}

/// A write as seen by hooks.
#[derive(Debug, Clone)]
pub struct WriteEvent {
    /// What happened.
    pub action: WriteAction,
    /// Model of the written entity.
    pub model: Arc<Model>,
    /// The entity as saved, or as it was before deletion.
    pub entity: Entity,
    /// Options the write was issued with.
    pub options: SaveOptions,
}

/// Observer of writes, invoked inside the writing transaction.
///
/// Returning an error aborts the write.
pub trait WriteHook: Send + Sync {
    /// Called after `event` has been staged in `txn`.
    fn after_write(&self, txn: &mut Transaction<'_>, event: &WriteEvent) -> CoreResult<()>;
}
