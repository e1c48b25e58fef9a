//! The publishing write hook.
//!
//! [`SyncPublisher`] is registered on each database whose writes should be
//! shipped. For every non-raw write it decides whether the write is
//! published and, if so, appends one outgoing row in the same transaction.

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::outgoing::OutgoingLog;
use crate::registry::ProducerRegistry;
use crate::snapshot::SnapshotSerializer;
use std::sync::Arc;
use tracing::{debug, trace};
use txsync_core::crypto::Cipher;
use txsync_core::{
    CoreError, CoreResult, Database, Transaction, WriteAction, WriteEvent, WriteHook,
};
use txsync_protocol::{Action, OutgoingTransaction, TimestampClock};

fn action_of(action: WriteAction) -> Action {
    match action {
        WriteAction::Insert => Action::Insert,
        WriteAction::Update => Action::Update,
        WriteAction::Delete => Action::Delete,
    }
}

/// Records entity writes as encrypted outgoing transactions.
#[derive(Debug)]
pub struct SyncPublisher {
    config: SyncConfig,
    serializer: SnapshotSerializer,
    registry: ProducerRegistry,
    clock: TimestampClock,
}

impl SyncPublisher {
    /// Creates a publisher.
    pub fn new(config: SyncConfig, cipher: Arc<dyn Cipher>) -> Self {
        Self {
            serializer: SnapshotSerializer::from_config(cipher, &config),
            registry: ProducerRegistry::new(config.hostname.clone()),
            clock: TimestampClock::new(),
            config,
        }
    }

    /// Registers this publisher as a write hook of `db`.
    pub fn attach(self: &Arc<Self>, db: &Database) {
        db.register_hook(Arc::clone(self) as Arc<dyn WriteHook>);
    }

    /// The configuration in effect.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The snapshot serializer, shared with consumers of the same keyring.
    pub fn serializer(&self) -> &SnapshotSerializer {
        &self.serializer
    }

    /// The producer registry.
    pub fn registry(&self) -> &ProducerRegistry {
        &self.registry
    }

    fn should_publish(&self, db: &Database, event: &WriteEvent) -> bool {
        if db.is_default() {
            trace!(model = event.model.name(), "default database is never published");
            return false;
        }
        let enabled = event
            .options
            .publish
            .unwrap_or(self.config.allow_model_serialization);
        if !enabled {
            trace!(model = event.model.name(), "serialization disabled");
            return false;
        }
        if event.model.is_audit() && !self.config.allow_audit_trail_serialization {
            trace!(model = event.model.name(), "audit serialization disabled");
            return false;
        }
        if event.model.should_skip_saving(&event.entity) {
            debug!(
                model = event.model.name(),
                id = %event.entity.id(),
                "entity opted out of publication"
            );
            return false;
        }
        true
    }

    /// Publishes `event`, returning the staged row if one was written.
    pub fn publish(
        &self,
        txn: &mut Transaction<'_>,
        event: &WriteEvent,
    ) -> SyncResult<Option<OutgoingTransaction>> {
        if !self.should_publish(txn.database(), event) {
            return Ok(None);
        }

        // Taken before the producer exists so this row sorts first.
        let timestamp = self.clock.next();
        let producer = self.registry.ensure(txn)?;
        let payload = match event.action {
            WriteAction::Delete => {
                let snapshot = self
                    .serializer
                    .capture_removed(txn, &event.model, &event.entity)?;
                self.serializer.seal(&snapshot)?
            }
            WriteAction::Insert | WriteAction::Update => {
                self.serializer
                    .snapshot(txn, &event.model, &event.entity)?
            }
        };

        let row = OutgoingTransaction::new(
            event.model.name(),
            event.entity.id().as_uuid(),
            payload,
            timestamp,
            producer,
            action_of(event.action),
        );
        OutgoingLog::append(txn, &row)?;
        debug!(
            database = txn.database().name(),
            model = %row.tx_name,
            action = %row.action,
            timestamp = %row.timestamp,
            "published transaction"
        );
        Ok(Some(row))
    }
}

impl WriteHook for SyncPublisher {
    fn after_write(&self, txn: &mut Transaction<'_>, event: &WriteEvent) -> CoreResult<()> {
        self.publish(txn, event).map(|_| ()).map_err(CoreError::hook)
    }
}
