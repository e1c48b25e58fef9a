//! Producer registry.
//!
//! Every publishing database is identified by a `Producer` entity named
//! `"{host}-{database}"`. The registry creates it on first use, in a
//! transaction of its own, so it exists even if the write that triggered it
//! later rolls back. Two writers may race to create it; the loser's unique
//! violation is absorbed.

use crate::error::SyncResult;
use txsync_core::{FieldDef, FieldValue, Model, NaturalKey, Schema, Transaction};
use txsync_protocol::ProducerRecord;
use tracing::debug;

/// Model name of producer entities.
pub const PRODUCER_MODEL: &str = "Producer";

/// Declaration of the `Producer` model.
pub fn producer_model() -> Model {
    Model::builder(PRODUCER_MODEL)
        .field(FieldDef::text("name").unique())
        .field(FieldDef::text("url"))
        .field(FieldDef::boolean("is_active").default_value(true))
        .field(FieldDef::text("settings_key"))
        .natural_key_fields(["name"])
        .lookup_by_natural_key()
        .build()
}

/// Registers the models the engine itself writes.
pub fn register_sync_models(schema: &mut Schema) -> &mut Schema {
    schema.register(producer_model())
}

/// Ensures a producer exists for each database written on this host.
#[derive(Debug, Clone)]
pub struct ProducerRegistry {
    hostname: String,
}

impl ProducerRegistry {
    /// Creates a registry for `hostname`.
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
        }
    }

    /// Host part of every producer name.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Returns the producer name for the database of `txn`, creating the
    /// producer if neither `txn` nor the committed state has it.
    pub fn ensure(&self, txn: &Transaction<'_>) -> SyncResult<String> {
        let db = txn.database();
        let record = ProducerRecord::for_database(&self.hostname, db.name());
        let key = NaturalKey::single(record.name.as_str());
        if txn.get_by_natural_key(PRODUCER_MODEL, &key)?.is_some() {
            return Ok(record.name);
        }

        let entity = db.schema().instantiate(
            PRODUCER_MODEL,
            [
                ("name", FieldValue::from(record.name.as_str())),
                ("url", FieldValue::from(record.url.as_str())),
                ("is_active", FieldValue::from(record.is_active)),
                ("settings_key", FieldValue::from(record.settings_key.as_str())),
            ],
        )?;
        match db.save(&entity) {
            Ok(_) => debug!(producer = %record.name, "registered producer"),
            Err(err) if err.is_unique_violation() => {
                debug!(producer = %record.name, "producer registered concurrently");
            }
            Err(err) => return Err(err.into()),
        }
        Ok(record.name)
    }
}
