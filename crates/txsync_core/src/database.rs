//! Database handle.

use crate::entity::{Entity, EntityId, FieldValue, NaturalKey};
use crate::error::{CoreError, CoreResult};
use crate::hooks::{SaveOptions, WriteAction, WriteHook};
use crate::model::Model;
use crate::schema::Schema;
use crate::transaction::{check_unique, PendingWrite, StagedWrites, Transaction};
use crate::types::{SequenceNumber, TransactionId};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Name of the local default database. Writes there are never published.
pub const DEFAULT_DATABASE: &str = "default";

#[derive(Default)]
struct Tables {
    entities: HashMap<String, BTreeMap<EntityId, Entity>>,
    /// Committed ids by natural key, for models that have one.
    keys: HashMap<String, HashMap<NaturalKey, BTreeSet<EntityId>>>,
    records: HashMap<String, BTreeMap<EntityId, Vec<u8>>>,
    sequence: SequenceNumber,
}

impl Tables {
    fn put(&mut self, model: &Model, entity: &Entity) {
        let previous = self
            .entities
            .entry(model.name().to_string())
            .or_default()
            .insert(entity.id(), entity.clone());
        if let Some(previous) = previous {
            self.unindex(model, &previous);
        }
        if let Ok(key) = model.natural_key(entity) {
            self.keys
                .entry(model.name().to_string())
                .or_default()
                .entry(key)
                .or_default()
                .insert(entity.id());
        }
    }

    fn remove(&mut self, model: &Model, id: EntityId) {
        let removed = self
            .entities
            .get_mut(model.name())
            .and_then(|table| table.remove(&id));
        if let Some(removed) = removed {
            self.unindex(model, &removed);
        }
    }

    fn unindex(&mut self, model: &Model, entity: &Entity) {
        let Ok(key) = model.natural_key(entity) else {
            return;
        };
        let Some(keys) = self.keys.get_mut(model.name()) else {
            return;
        };
        if let Some(ids) = keys.get_mut(&key) {
            ids.remove(&entity.id());
            if ids.is_empty() {
                keys.remove(&key);
            }
        }
    }
}

/// A named, independently-operated database.
///
/// Several handles usually share one [`Schema`]; each holds its own data.
/// All mutation goes through [`Transaction`]s, either explicitly via
/// [`Database::begin`] / [`Database::transaction`] or through the one-shot
/// helpers such as [`Database::save`].
///
/// # Example
///
/// ```rust,ignore
/// let db = Database::open_in_memory("client", Arc::new(schema));
/// let erik = db.create("TestModel", [("f1", "erik")])?;
///
/// db.transaction(|txn| {
///     let mut e = txn.get("TestModel", erik.id())?.unwrap();
///     e.set("f2", "dinner");
///     txn.save(&e)?;
///     Ok::<_, CoreError>(())
/// })?;
/// ```
pub struct Database {
    name: String,
    schema: Arc<Schema>,
    tables: RwLock<Tables>,
    hooks: RwLock<Vec<Arc<dyn WriteHook>>>,
    next_txn: AtomicU64,
}

impl Database {
    /// Opens an empty in-memory database.
    pub fn open_in_memory(name: impl Into<String>, schema: Arc<Schema>) -> Self {
        Self {
            name: name.into(),
            schema,
            tables: RwLock::new(Tables::default()),
            hooks: RwLock::new(Vec::new()),
            next_txn: AtomicU64::new(1),
        }
    }

    /// Database name, also used as the producer's settings key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is the local default database.
    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_DATABASE
    }

    /// The shared schema.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Registers a write hook. Hooks run in registration order.
    pub fn register_hook(&self, hook: Arc<dyn WriteHook>) {
        self.hooks.write().push(hook);
    }

    pub(crate) fn hooks(&self) -> Vec<Arc<dyn WriteHook>> {
        self.hooks.read().clone()
    }

    /// Sequence number of the last commit that wrote anything.
    pub fn committed_seq(&self) -> SequenceNumber {
        self.tables.read().sequence
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Begins a transaction.
    pub fn begin(&self) -> Transaction<'_> {
        let id = TransactionId(self.next_txn.fetch_add(1, Ordering::Relaxed));
        Transaction::new(id, self)
    }

    /// Runs `f` in a transaction, committing if it returns `Ok`.
    ///
    /// On `Err` nothing staged by `f` is applied.
    pub fn transaction<F, R, E>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<R, E>,
        E: From<CoreError>,
    {
        let mut txn = self.begin();
        let result = f(&mut txn)?;
        txn.commit()?;
        Ok(result)
    }

    pub(crate) fn apply(&self, staged: &StagedWrites) -> CoreResult<()> {
        if staged.is_empty() {
            return Ok(());
        }
        let models = staged
            .order
            .iter()
            .map(|key| self.schema.get(&key.0))
            .collect::<CoreResult<Vec<_>>>()?;
        let mut tables = self.tables.write();

        for (key, model) in staged.order.iter().zip(&models) {
            let Some(PendingWrite::Put(entity)) = staged.writes.get(key) else {
                continue;
            };
            let others = tables
                .entities
                .get(&key.0)
                .into_iter()
                .flat_map(BTreeMap::values)
                .filter(|e| !staged.writes.contains_key(&(key.0.clone(), e.id())));
            if let Err(err) = check_unique(model, entity, others) {
                debug!(database = %self.name, error = %err, "commit rejected");
                return Err(err);
            }
        }

        for (key, model) in staged.order.iter().zip(&models) {
            match staged.writes.get(key) {
                Some(PendingWrite::Put(entity)) => tables.put(model, entity),
                Some(PendingWrite::Delete) => tables.remove(model, key.1),
                None => {}
            }
        }
        for ((collection, id), write) in &staged.records {
            let table = tables.records.entry(collection.clone()).or_default();
            match write {
                Some(payload) => {
                    table.insert(*id, payload.clone());
                }
                None => {
                    table.remove(id);
                }
            }
        }
        tables.sequence = tables.sequence.next();
        trace!(database = %self.name, seq = %tables.sequence, "committed");
        Ok(())
    }

    pub(crate) fn committed_entity(&self, model: &str, id: EntityId) -> Option<Entity> {
        self.tables
            .read()
            .entities
            .get(model)
            .and_then(|t| t.get(&id))
            .cloned()
    }

    /// Runs `f` over the committed entities of `model` under the read lock.
    ///
    /// `f` must not call back into this database.
    pub(crate) fn with_committed<R>(
        &self,
        model: &str,
        f: impl FnOnce(&mut dyn Iterator<Item = &Entity>) -> R,
    ) -> R {
        let tables = self.tables.read();
        let mut rows = tables.entities.get(model).into_iter().flat_map(BTreeMap::values);
        f(&mut rows)
    }

    /// Committed ids whose natural key is `key`, in identifier order.
    pub(crate) fn committed_ids_by_key(&self, model: &str, key: &NaturalKey) -> Vec<EntityId> {
        self.tables
            .read()
            .keys
            .get(model)
            .and_then(|keys| keys.get(key))
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) fn committed_entities(&self, model: &str) -> Vec<Entity> {
        self.tables
            .read()
            .entities
            .get(model)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // One-shot helpers
    // ------------------------------------------------------------------

    /// Instantiates and inserts an entity in its own transaction.
    pub fn create<K, V>(
        &self,
        model: &str,
        values: impl IntoIterator<Item = (K, V)>,
    ) -> CoreResult<Entity>
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        let entity = self.schema.instantiate(model, values)?;
        self.save(&entity)?;
        Ok(entity)
    }

    /// Saves an entity in its own transaction.
    pub fn save(&self, entity: &Entity) -> CoreResult<WriteAction> {
        self.save_with(entity, SaveOptions::default())
    }

    /// Saves an entity in its own transaction with explicit options.
    pub fn save_with(&self, entity: &Entity, options: SaveOptions) -> CoreResult<WriteAction> {
        self.transaction(|txn| txn.save_with(entity, options))
    }

    /// Deletes an entity in its own transaction. Returns whether it existed.
    pub fn delete(&self, model: &str, id: EntityId) -> CoreResult<bool> {
        self.transaction(|txn| txn.delete(model, id))
    }

    /// Reads a committed entity.
    pub fn get(&self, model: &str, id: EntityId) -> CoreResult<Option<Entity>> {
        self.schema.get(model)?;
        Ok(self.committed_entity(model, id))
    }

    /// Finds a committed entity by natural key.
    pub fn get_by_natural_key(&self, model: &str, key: &NaturalKey) -> CoreResult<Option<Entity>> {
        self.begin().get_by_natural_key(model, key)
    }

    /// All committed entities of a model.
    pub fn all(&self, model: &str) -> CoreResult<Vec<Entity>> {
        self.schema.get(model)?;
        Ok(self.committed_entities(model))
    }

    /// Number of committed entities of a model.
    pub fn count(&self, model: &str) -> CoreResult<usize> {
        self.schema.get(model)?;
        Ok(self
            .tables
            .read()
            .entities
            .get(model)
            .map_or(0, BTreeMap::len))
    }

    /// Reads a committed raw record.
    pub fn record(&self, collection: &str, id: EntityId) -> Option<Vec<u8>> {
        self.tables
            .read()
            .records
            .get(collection)
            .and_then(|t| t.get(&id))
            .cloned()
    }

    /// All committed raw records of a collection, by identifier.
    pub fn records(&self, collection: &str) -> Vec<(EntityId, Vec<u8>)> {
        self.tables
            .read()
            .records
            .get(collection)
            .map(|t| t.iter().map(|(id, v)| (*id, v.clone())).collect())
            .unwrap_or_default()
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("hooks", &self.hooks.read().len())
            .field("committed_seq", &self.committed_seq())
            .finish_non_exhaustive()
    }
}
