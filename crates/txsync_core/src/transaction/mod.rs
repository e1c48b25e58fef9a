//! Optimistic transactions.
//!
//! A transaction stages writes privately and sees its own staged writes on
//! top of the last committed state. Nothing is locked while it is open;
//! commit takes the database write lock, re-checks unique constraints
//! against whatever committed meanwhile, and applies everything at once.
//!
//! Besides entities, a transaction can stage raw records: opaque byte
//! payloads grouped in named collections, used for the sync logs.

mod state;

pub use state::{PendingWrite, TransactionState};

use crate::database::Database;
use crate::entity::{Entity, EntityId, NaturalKey};
use crate::error::{CoreError, CoreResult};
use crate::history;
use crate::hooks::{SaveOptions, WriteAction, WriteEvent};
use crate::model::Model;
use crate::types::TransactionId;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

pub(crate) type WriteKey = (String, EntityId);

/// Everything a transaction intends to change.
#[derive(Debug, Default)]
pub(crate) struct StagedWrites {
    /// Entity keys in first-write order.
    pub order: Vec<WriteKey>,
    pub writes: HashMap<WriteKey, PendingWrite>,
    /// `None` stages a removal.
    pub records: BTreeMap<WriteKey, Option<Vec<u8>>>,
}

impl StagedWrites {
    fn stage(&mut self, key: WriteKey, write: PendingWrite) {
        if !self.writes.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.writes.insert(key, write);
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.records.is_empty()
    }
}

/// Fails if `entity` repeats a unique value held by any of `others`.
pub(crate) fn check_unique<'a>(
    model: &Model,
    entity: &Entity,
    others: impl IntoIterator<Item = &'a Entity>,
) -> CoreResult<()> {
    let unique: Vec<_> = model
        .unique_fields()
        .filter_map(|def| {
            entity
                .get(def.name())
                .filter(|v| !v.is_null())
                .map(|v| (def.name(), v))
        })
        .collect();
    if unique.is_empty() {
        return Ok(());
    }
    for other in others {
        if other.id() == entity.id() {
            continue;
        }
        for (field, value) in &unique {
            if other.get(field) == Some(*value) {
                return Err(CoreError::UniqueViolation {
                    model: model.name().to_string(),
                    field: (*field).to_string(),
                    value: value.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// An open transaction on a [`Database`].
pub struct Transaction<'db> {
    id: TransactionId,
    db: &'db Database,
    state: TransactionState,
    staged: StagedWrites,
}

impl<'db> Transaction<'db> {
    pub(crate) fn new(id: TransactionId, db: &'db Database) -> Self {
        Self {
            id,
            db,
            state: TransactionState::Active,
            staged: StagedWrites::default(),
        }
    }

    /// Transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// The database this transaction writes to.
    pub fn database(&self) -> &'db Database {
        self.db
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Whether the transaction can still be used.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Number of staged entity and record writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.staged.writes.len() + self.staged.records.len()
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Reads an entity as this transaction sees it.
    pub fn get(&self, model: &str, id: EntityId) -> CoreResult<Option<Entity>> {
        if let Some(write) = self.staged.writes.get(&(model.to_string(), id)) {
            return Ok(write.entity().cloned());
        }
        Ok(self.db.committed_entity(model, id))
    }

    /// All entities of a model as this transaction sees them.
    pub fn rows(&self, model: &str) -> CoreResult<Vec<Entity>> {
        self.db.schema().get(model)?;
        let mut rows: Vec<Entity> = self
            .db
            .committed_entities(model)
            .into_iter()
            .filter(|e| {
                !self
                    .staged
                    .writes
                    .contains_key(&(model.to_string(), e.id()))
            })
            .collect();
        rows.extend(self.staged_entities(model).cloned());
        Ok(rows)
    }

    /// Finds an entity by natural key through the model's lookup capability.
    ///
    /// Committed entities win over staged ones when both match.
    pub fn get_by_natural_key(&self, model: &str, key: &NaturalKey) -> CoreResult<Option<Entity>> {
        let m = self.db.schema().get(model)?;
        if !m.uses_key_index() {
            let rows = self.rows(model)?;
            return m.find_by_natural_key(&rows, key);
        }

        let shadowed = self.staged_ids(model);
        for id in self.db.committed_ids_by_key(model, key) {
            if shadowed.contains(&id) {
                continue;
            }
            if let Some(found) = self.db.committed_entity(model, id) {
                return Ok(Some(found));
            }
        }
        for staged in self.staged_entities(model) {
            if &m.natural_key(staged)? == key {
                return Ok(Some(staged.clone()));
            }
        }
        Ok(None)
    }

    /// Ids of `model` with a staged write.
    fn staged_ids(&self, model: &str) -> HashSet<EntityId> {
        self.staged
            .order
            .iter()
            .filter(|key| key.0 == model)
            .map(|key| key.1)
            .collect()
    }

    /// Staged puts of `model`, in first-write order.
    fn staged_entities<'s>(&'s self, model: &'s str) -> impl Iterator<Item = &'s Entity> + 's {
        self.staged
            .order
            .iter()
            .filter(move |key| key.0 == model)
            .filter_map(|key| self.staged.writes.get(key))
            .filter_map(PendingWrite::entity)
    }

    // ------------------------------------------------------------------
    // Entity writes
    // ------------------------------------------------------------------

    /// Inserts or updates an entity, running write hooks.
    pub fn save(&mut self, entity: &Entity) -> CoreResult<WriteAction> {
        self.save_with(entity, SaveOptions::default())
    }

    /// Inserts or updates an entity without running hooks.
    pub fn save_raw(&mut self, entity: &Entity) -> CoreResult<WriteAction> {
        self.save_with(entity, SaveOptions::raw())
    }

    /// Inserts or updates an entity with explicit options.
    pub fn save_with(&mut self, entity: &Entity, options: SaveOptions) -> CoreResult<WriteAction> {
        self.state.ensure_active()?;
        let model = self.db.schema().get(entity.model())?;
        model.validate(entity)?;

        let action = if self.get(entity.model(), entity.id())?.is_some() {
            WriteAction::Update
        } else {
            WriteAction::Insert
        };
        let shadowed = self.staged_ids(entity.model());
        self.db.with_committed(entity.model(), |committed| {
            check_unique(
                &model,
                entity,
                committed.filter(|other| !shadowed.contains(&other.id())),
            )
        })?;
        check_unique(&model, entity, self.staged_entities(entity.model()))?;

        self.staged.stage(
            (entity.model().to_string(), entity.id()),
            PendingWrite::Put(entity.clone()),
        );

        if !options.raw {
            self.fire(WriteEvent {
                action,
                model,
                entity: entity.clone(),
                options,
            })?;
        }
        Ok(action)
    }

    /// Deletes an entity, running write hooks. Returns whether it existed.
    pub fn delete(&mut self, model: &str, id: EntityId) -> CoreResult<bool> {
        self.delete_with(model, id, SaveOptions::default())
    }

    /// Deletes an entity without running hooks. Returns whether it existed.
    pub fn delete_raw(&mut self, model: &str, id: EntityId) -> CoreResult<bool> {
        self.delete_with(model, id, SaveOptions::raw())
    }

    /// Deletes an entity with explicit options. Returns whether it existed.
    pub fn delete_with(&mut self, model: &str, id: EntityId, options: SaveOptions) -> CoreResult<bool> {
        self.state.ensure_active()?;
        let m = self.db.schema().get(model)?;
        let Some(existing) = self.get(model, id)? else {
            return Ok(false);
        };
        self.staged
            .stage((model.to_string(), id), PendingWrite::Delete);

        if !options.raw {
            self.fire(WriteEvent {
                action: WriteAction::Delete,
                model: m,
                entity: existing,
                options,
            })?;
        }
        Ok(true)
    }

    fn fire(&mut self, event: WriteEvent) -> CoreResult<()> {
        let result = self.run_hooks(&event);
        if result.is_err() {
            self.state = TransactionState::Aborted;
        }
        result
    }

    fn run_hooks(&mut self, event: &WriteEvent) -> CoreResult<()> {
        for hook in self.db.hooks() {
            hook.after_write(self, event)?;
        }
        history::record(self, event)
    }

    // ------------------------------------------------------------------
    // Raw records
    // ------------------------------------------------------------------

    /// Stages a raw record.
    pub fn put_record(&mut self, collection: &str, id: EntityId, payload: Vec<u8>) -> CoreResult<()> {
        self.state.ensure_active()?;
        self.staged
            .records
            .insert((collection.to_string(), id), Some(payload));
        Ok(())
    }

    /// Stages the removal of a raw record.
    pub fn delete_record(&mut self, collection: &str, id: EntityId) -> CoreResult<()> {
        self.state.ensure_active()?;
        self.staged.records.insert((collection.to_string(), id), None);
        Ok(())
    }

    /// Reads a raw record as this transaction sees it.
    pub fn get_record(&self, collection: &str, id: EntityId) -> Option<Vec<u8>> {
        match self.staged.records.get(&(collection.to_string(), id)) {
            Some(staged) => staged.clone(),
            None => self.db.record(collection, id),
        }
    }

    /// All raw records of a collection as this transaction sees them.
    pub fn records(&self, collection: &str) -> Vec<(EntityId, Vec<u8>)> {
        let mut merged: BTreeMap<EntityId, Vec<u8>> =
            self.db.records(collection).into_iter().collect();
        for ((name, id), staged) in &self.staged.records {
            if name != collection {
                continue;
            }
            match staged {
                Some(payload) => {
                    merged.insert(*id, payload.clone());
                }
                None => {
                    merged.remove(id);
                }
            }
        }
        merged.into_iter().collect()
    }

    // ------------------------------------------------------------------
    // Completion
    // ------------------------------------------------------------------

    /// Commits all staged writes atomically.
    pub fn commit(mut self) -> CoreResult<()> {
        self.state.ensure_active()?;
        self.db.apply(&self.staged)?;
        self.state = TransactionState::Committed;
        Ok(())
    }

    /// Discards all staged writes.
    pub fn rollback(mut self) {
        self.state = TransactionState::Aborted;
    }
}

impl fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("database", &self.db.name())
            .field("state", &self.state)
            .field("writes", &self.write_count())
            .finish()
    }
}
