//! Replay of incoming transactions.
//!
//! The [`Deserializer`] applies pending incoming rows oldest first. Each row
//! is applied and marked consumed in one transaction, so a row is either
//! fully replayed or left pending with its error recorded; earlier rows of
//! the batch stay applied either way.
//!
//! Entities are located by natural key, falling back to the identifier the
//! producer recorded. Replayed writes are raw: they never trigger write
//! hooks, so nothing is published back.

use crate::device::RoleProvider;
use crate::error::{SyncError, SyncResult};
use crate::incoming::IncomingQueue;
use crate::snapshot::{parse_date, parse_datetime, SnapshotSerializer};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use txsync_core::{
    Database, DuplicatePolicy, Entity, EntityId, EntityRef, FieldValue, Fields, MissingReference,
    Model, NaturalKey, Transaction,
};
use txsync_protocol::{
    Action, DeserializationResult, IncomingTransaction, ProducerRecord, RefKey, RowError,
    Snapshot, SnapshotValue, TimestampClock,
};

/// What replaying one row did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Applied {
    Inserted,
    Updated,
    Deleted,
    Unchanged,
}

/// The producers [`Deserializer::check_hostname`] treats as local.
#[derive(Debug, Clone)]
struct LocalHost {
    host: String,
    databases: Vec<String>,
}

/// Replays incoming transactions into a database.
pub struct Deserializer {
    serializer: SnapshotSerializer,
    role: Arc<dyn RoleProvider>,
    local_host: Option<LocalHost>,
    clock: TimestampClock,
}

impl Deserializer {
    /// Creates a deserializer that decrypts with `serializer` and is gated
    /// by `role`.
    pub fn new(serializer: SnapshotSerializer, role: Arc<dyn RoleProvider>) -> Self {
        Self {
            serializer,
            role,
            local_host: None,
            clock: TimestampClock::new(),
        }
    }

    /// Leaves rows produced by any of `databases` on `host` pending and
    /// untouched.
    #[must_use]
    pub fn check_hostname<I, S>(mut self, host: impl Into<String>, databases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.local_host = Some(LocalHost {
            host: host.into(),
            databases: databases.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Replays every pending row of `db`.
    ///
    /// Returns one result per model name, in order of first appearance.
    /// Fails without touching any row if this node is not a server.
    pub fn deserialize(&self, db: &Database) -> SyncResult<Vec<DeserializationResult>> {
        if !self.role.is_server() {
            return Err(SyncError::Authorization {
                device_id: self.role.device_id().to_string(),
            });
        }

        let queue = IncomingQueue::new(db);
        let mut results: Vec<DeserializationResult> = Vec::new();
        for row in queue.pending()? {
            if let Some(local) = &self.local_host {
                if ProducerRecord::is_on_host(&row.producer, &local.host, &local.databases) {
                    debug!(producer = %row.producer, id = %row.id, "skipping local row");
                    continue;
                }
            }

            let index = match results.iter().position(|r| r.tx_name == row.tx_name) {
                Some(index) => index,
                None => {
                    results.push(DeserializationResult::new(row.tx_name.as_str()));
                    results.len() - 1
                }
            };
            let result = &mut results[index];

            let applied = db.transaction(|txn| {
                let applied = self.apply(txn, &row)?;
                IncomingQueue::mark_consumed(txn, &row, self.clock.next())?;
                Ok::<_, SyncError>(applied)
            });
            match applied {
                Ok(Applied::Inserted) => result.inserted += 1,
                Ok(Applied::Updated) => result.updated += 1,
                Ok(Applied::Deleted) => result.deleted += 1,
                Ok(Applied::Unchanged) => {}
                Err(err) => {
                    if err.is_row_level() {
                        warn!(id = %row.id, model = %row.tx_name, %err, "row left pending");
                    } else {
                        error!(id = %row.id, model = %row.tx_name, %err, "row failed");
                    }
                    let message = err.to_string();
                    if let Err(record_err) = queue.record_error(row.id, &message) {
                        warn!(id = %row.id, error = %record_err, "could not record row failure");
                    }
                    result.errors.push(RowError {
                        tx_id: row.id,
                        message,
                    });
                }
            }
        }

        for result in &results {
            info!(
                database = db.name(),
                model = %result.tx_name,
                inserted = result.inserted,
                updated = result.updated,
                deleted = result.deleted,
                failed = result.errors.len(),
                "replayed transactions"
            );
        }
        Ok(results)
    }

    fn apply(&self, txn: &mut Transaction<'_>, row: &IncomingTransaction) -> SyncResult<Applied> {
        let snapshot = self.serializer.restore(&row.tx)?;
        let model = txn.database().schema().get(&row.tx_name)?;
        let recorded_id = EntityId::from(row.tx_pk);

        if row.action == Action::Delete {
            return Ok(if txn.delete_raw(model.name(), recorded_id)? {
                Applied::Deleted
            } else {
                debug!(model = model.name(), id = %recorded_id, "nothing to delete");
                Applied::Unchanged
            });
        }

        let existing = locate(txn, &model, &snapshot, recorded_id)?;
        let fields = resolve_fields(txn, &model, &snapshot)?;
        match (row.action, existing) {
            (_, None) => {
                let entity = model.instantiate_with_id(recorded_id, fields)?;
                txn.save_raw(&entity)?;
                Ok(Applied::Inserted)
            }
            (Action::Insert, Some(existing)) => match model.duplicate_policy(&existing, &fields) {
                DuplicatePolicy::Skip => {
                    debug!(model = model.name(), id = %existing.id(), "duplicate insert skipped");
                    Ok(Applied::Unchanged)
                }
                DuplicatePolicy::OverwriteAsUpdate => {
                    overwrite(txn, existing, fields)?;
                    Ok(Applied::Updated)
                }
                DuplicatePolicy::OverwriteAsInsert => {
                    overwrite(txn, existing, fields)?;
                    Ok(Applied::Inserted)
                }
            },
            (_, Some(existing)) => {
                overwrite(txn, existing, fields)?;
                Ok(Applied::Updated)
            }
        }
    }
}

impl fmt::Debug for Deserializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deserializer")
            .field("serializer", &self.serializer)
            .field("device_id", &self.role.device_id())
            .field("local_host", &self.local_host)
            .finish_non_exhaustive()
    }
}

fn overwrite(txn: &mut Transaction<'_>, mut entity: Entity, fields: Fields) -> SyncResult<()> {
    for (name, value) in fields {
        entity.set(name, value);
    }
    txn.save_raw(&entity)?;
    Ok(())
}

/// The local entity a snapshot describes, by natural key then by id.
fn locate(
    txn: &Transaction<'_>,
    model: &Model,
    snapshot: &Snapshot,
    recorded_id: EntityId,
) -> SyncResult<Option<Entity>> {
    if let Some(key) = natural_key(txn, &snapshot.natural_key)? {
        if let Some(found) = txn.get_by_natural_key(model.name(), &key)? {
            return Ok(Some(found));
        }
    }
    Ok(txn.get(model.name(), recorded_id)?)
}

/// Converts natural key parts, or `None` if a nested reference is unknown.
fn natural_key(txn: &Transaction<'_>, parts: &[SnapshotValue]) -> SyncResult<Option<NaturalKey>> {
    let mut values = Vec::with_capacity(parts.len());
    for part in parts {
        match decode_value(txn, part)? {
            Some(value) => values.push(value),
            None => return Ok(None),
        }
    }
    Ok(Some(NaturalKey::new(values)))
}

/// Local identifier of the entity `reference` names.
fn find_ref(txn: &Transaction<'_>, reference: &RefKey) -> SyncResult<Option<EntityId>> {
    let Some(key) = natural_key(txn, &reference.key)? else {
        return Ok(None);
    };
    Ok(txn
        .get_by_natural_key(&reference.model, &key)?
        .map(|entity| entity.id()))
}

/// Converts a snapshot value, or `None` if a reference is unknown.
fn decode_value(txn: &Transaction<'_>, value: &SnapshotValue) -> SyncResult<Option<FieldValue>> {
    Ok(Some(match value {
        SnapshotValue::Null => FieldValue::Null,
        SnapshotValue::Bool(b) => FieldValue::Bool(*b),
        SnapshotValue::Integer(i) => FieldValue::Integer(*i),
        SnapshotValue::Text(s) => FieldValue::Text(s.clone()),
        SnapshotValue::Date(d) => FieldValue::Date(parse_date(d)?),
        SnapshotValue::DateTime(t) => FieldValue::DateTime(parse_datetime(t)?),
        SnapshotValue::Ref(reference) => match find_ref(txn, reference)? {
            Some(id) => FieldValue::Ref(EntityRef::new(reference.model.as_str(), id)),
            None => return Ok(None),
        },
        SnapshotValue::RefList(references) => {
            let mut refs = Vec::with_capacity(references.len());
            for reference in references {
                match find_ref(txn, reference)? {
                    Some(id) => refs.push(EntityRef::new(reference.model.as_str(), id)),
                    None => return Ok(None),
                }
            }
            FieldValue::RefList(refs)
        }
    }))
}

/// Resolves one field-level reference, consulting the model's resolver
/// when no local entity matches.
fn resolve_ref(
    txn: &Transaction<'_>,
    model: &Model,
    field: &str,
    reference: &RefKey,
) -> SyncResult<EntityRef> {
    if let Some(id) = find_ref(txn, reference)? {
        return Ok(EntityRef::new(reference.model.as_str(), id));
    }
    let unresolved = || SyncError::UnresolvedReference {
        model: model.name().to_string(),
        field: field.to_string(),
        target_model: reference.model.clone(),
        key: reference.to_string(),
    };
    // A key that itself holds unknown references cannot be offered to the
    // resolver.
    let Some(key) = natural_key(txn, &reference.key)? else {
        return Err(unresolved());
    };
    let missing = MissingReference {
        field: field.to_string(),
        model: reference.model.clone(),
        key,
    };
    match model.resolve_missing(&missing, txn)? {
        Some(id) => {
            debug!(model = model.name(), field, target = %reference, "reference resolved by model");
            Ok(EntityRef::new(reference.model.as_str(), id))
        }
        None => Err(unresolved()),
    }
}

fn resolve_fields(txn: &Transaction<'_>, model: &Model, snapshot: &Snapshot) -> SyncResult<Fields> {
    let mut fields = Fields::new();
    for (name, value) in &snapshot.fields {
        let resolved = match value {
            SnapshotValue::Ref(reference) => FieldValue::Ref(resolve_ref(txn, model, name, reference)?),
            SnapshotValue::RefList(references) => FieldValue::RefList(
                references
                    .iter()
                    .map(|reference| resolve_ref(txn, model, name, reference))
                    .collect::<SyncResult<_>>()?,
            ),
            scalar => match decode_value(txn, scalar)? {
                Some(value) => value,
                None => FieldValue::Null,
            },
        };
        fields.insert(name.clone(), resolved);
    }
    Ok(fields)
}
