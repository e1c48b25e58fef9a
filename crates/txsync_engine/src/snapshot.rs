//! Snapshot capture and encryption.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use chrono::{NaiveDate, SecondsFormat};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use txsync_core::crypto::{Algorithm, Cipher};
use txsync_core::{Entity, EntityRef, FieldValue, Model, Transaction};
use txsync_protocol::{RefKey, Snapshot, SnapshotValue};

/// Date format inside snapshots.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// How to encode a reference whose target no longer exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dangling {
    Fail,
    Null,
}

/// Builds snapshots of entities and seals them with the configured cipher.
#[derive(Clone)]
pub struct SnapshotSerializer {
    cipher: Arc<dyn Cipher>,
    algorithm: Algorithm,
    keyring: String,
}

impl SnapshotSerializer {
    /// Creates a serializer.
    pub fn new(cipher: Arc<dyn Cipher>, algorithm: Algorithm, keyring: impl Into<String>) -> Self {
        Self {
            cipher,
            algorithm,
            keyring: keyring.into(),
        }
    }

    /// Creates a serializer using the algorithm and keyring of `config`.
    pub fn from_config(cipher: Arc<dyn Cipher>, config: &SyncConfig) -> Self {
        Self::new(cipher, config.algorithm, config.keyring.clone())
    }

    /// Captures `entity` as `txn` sees it.
    ///
    /// References become `(model, natural key)` pairs; a reference to an
    /// entity that does not exist is an error.
    pub fn capture(
        &self,
        txn: &Transaction<'_>,
        model: &Model,
        entity: &Entity,
    ) -> SyncResult<Snapshot> {
        self.capture_with(txn, model, entity, Dangling::Fail)
    }

    /// Like [`SnapshotSerializer::capture`], but encodes dangling references
    /// as null. Used for deletions, where the referenced entity may already
    /// be gone.
    pub fn capture_removed(
        &self,
        txn: &Transaction<'_>,
        model: &Model,
        entity: &Entity,
    ) -> SyncResult<Snapshot> {
        self.capture_with(txn, model, entity, Dangling::Null)
    }

    fn capture_with(
        &self,
        txn: &Transaction<'_>,
        model: &Model,
        entity: &Entity,
        dangling: Dangling,
    ) -> SyncResult<Snapshot> {
        let natural_key = model
            .natural_key(entity)?
            .parts()
            .iter()
            .map(|part| encode_value(txn, part, dangling))
            .collect::<SyncResult<_>>()?;
        let mut fields = BTreeMap::new();
        for (name, value) in entity.fields() {
            fields.insert(name.clone(), encode_value(txn, value, dangling)?);
        }
        Ok(Snapshot {
            model: model.name().to_string(),
            pk: entity.id().as_uuid(),
            natural_key,
            fields,
        })
    }

    /// Encodes and encrypts a snapshot.
    pub fn seal(&self, snapshot: &Snapshot) -> SyncResult<Vec<u8>> {
        let plaintext = snapshot
            .encode()
            .map_err(|e| SyncError::serialization(e.to_string()))?;
        self.cipher
            .encrypt(&plaintext, self.algorithm, &self.keyring)
            .map_err(|e| SyncError::serialization(e.to_string()))
    }

    /// Captures and seals `entity`.
    pub fn snapshot(
        &self,
        txn: &Transaction<'_>,
        model: &Model,
        entity: &Entity,
    ) -> SyncResult<Vec<u8>> {
        self.seal(&self.capture(txn, model, entity)?)
    }

    /// Decrypts and decodes a sealed snapshot.
    pub fn restore(&self, payload: &[u8]) -> SyncResult<Snapshot> {
        let plaintext = self
            .cipher
            .decrypt(payload, self.algorithm, &self.keyring)
            .map_err(|e| SyncError::decryption(e.to_string()))?;
        Snapshot::decode(&plaintext).map_err(|e| SyncError::serialization(e.to_string()))
    }
}

impl fmt::Debug for SnapshotSerializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotSerializer")
            .field("algorithm", &self.algorithm)
            .field("keyring", &self.keyring)
            .finish_non_exhaustive()
    }
}

fn encode_ref(
    txn: &Transaction<'_>,
    reference: &EntityRef,
    dangling: Dangling,
) -> SyncResult<Option<RefKey>> {
    let Some(target) = txn.get(&reference.model, reference.id)? else {
        return match dangling {
            Dangling::Null => Ok(None),
            Dangling::Fail => Err(SyncError::serialization(format!(
                "reference to missing {} {}",
                reference.model, reference.id
            ))),
        };
    };
    let model = txn.database().schema().get(&reference.model)?;
    let key = model
        .natural_key(&target)?
        .parts()
        .iter()
        .map(|part| encode_value(txn, part, dangling))
        .collect::<SyncResult<_>>()?;
    Ok(Some(RefKey {
        model: reference.model.clone(),
        key,
    }))
}

fn encode_value(
    txn: &Transaction<'_>,
    value: &FieldValue,
    dangling: Dangling,
) -> SyncResult<SnapshotValue> {
    Ok(match value {
        FieldValue::Null => SnapshotValue::Null,
        FieldValue::Bool(b) => SnapshotValue::Bool(*b),
        FieldValue::Integer(i) => SnapshotValue::Integer(*i),
        FieldValue::Text(s) => SnapshotValue::Text(s.clone()),
        FieldValue::Date(d) => SnapshotValue::Date(d.format(DATE_FORMAT).to_string()),
        FieldValue::DateTime(t) => {
            SnapshotValue::DateTime(t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        }
        FieldValue::Ref(r) => match encode_ref(txn, r, dangling)? {
            Some(key) => SnapshotValue::Ref(key),
            None => SnapshotValue::Null,
        },
        FieldValue::RefList(refs) => {
            let mut keys = Vec::with_capacity(refs.len());
            for r in refs {
                if let Some(key) = encode_ref(txn, r, dangling)? {
                    keys.push(key);
                }
            }
            SnapshotValue::RefList(keys)
        }
    })
}

/// Parses a snapshot date.
pub(crate) fn parse_date(text: &str) -> SyncResult<NaiveDate> {
    NaiveDate::parse_from_str(text, DATE_FORMAT)
        .map_err(|e| SyncError::serialization(format!("invalid date '{text}': {e}")))
}

/// Parses a snapshot timestamp.
pub(crate) fn parse_datetime(text: &str) -> SyncResult<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&chrono::Utc))
        .map_err(|e| SyncError::serialization(format!("invalid timestamp '{text}': {e}")))
}
