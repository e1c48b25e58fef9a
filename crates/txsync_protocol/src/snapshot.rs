//! Entity snapshots as they travel inside a transaction row.
//!
//! A snapshot never carries a local identifier for a referenced entity:
//! references are `(model, natural key)` pairs so they resolve on any peer.
//! Scalars encode as plain CBOR; dates, times and references encode as
//! single-entry maps tagged by a `$`-prefixed key.

use crate::error::{ProtocolError, ProtocolResult};
use std::collections::BTreeMap;
use std::fmt;
use txsync_codec::{from_cbor, to_canonical_cbor, Value};
use uuid::Uuid;

const DATE: &str = "$date";
const DATETIME: &str = "$datetime";
const REF: &str = "$ref";
const REFS: &str = "$refs";

/// A reference by natural key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefKey {
    /// Referenced model.
    pub model: String,
    /// Natural key of the referenced entity.
    pub key: Vec<SnapshotValue>,
}

impl RefKey {
    fn to_value(&self) -> Value {
        Value::text_map([
            ("model", Value::from(self.model.as_str())),
            (
                "key",
                Value::Array(self.key.iter().map(SnapshotValue::to_value).collect()),
            ),
        ])
    }

    fn from_value(value: &Value) -> ProtocolResult<Self> {
        let key = value
            .require("key")?
            .as_array()
            .ok_or_else(|| ProtocolError::invalid_snapshot("reference key must be an array"))?
            .iter()
            .map(SnapshotValue::from_value)
            .collect::<ProtocolResult<_>>()?;
        Ok(Self {
            model: value.require_text("model")?.to_string(),
            key,
        })
    }
}

/// One field value inside a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotValue {
    /// No value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Integer(i64),
    /// Text.
    Text(String),
    /// `YYYY-MM-DD`.
    Date(String),
    /// RFC 3339, UTC.
    DateTime(String),
    /// Foreign key by natural key.
    Ref(RefKey),
    /// Many-to-many by natural keys.
    RefList(Vec<RefKey>),
}

impl SnapshotValue {
    fn to_value(&self) -> Value {
        match self {
            SnapshotValue::Null => Value::Null,
            SnapshotValue::Bool(b) => Value::Bool(*b),
            SnapshotValue::Integer(i) => Value::Integer(*i),
            SnapshotValue::Text(s) => Value::Text(s.clone()),
            SnapshotValue::Date(d) => Value::text_map([(DATE, Value::from(d.as_str()))]),
            SnapshotValue::DateTime(t) => Value::text_map([(DATETIME, Value::from(t.as_str()))]),
            SnapshotValue::Ref(r) => Value::text_map([(REF, r.to_value())]),
            SnapshotValue::RefList(refs) => Value::text_map([(
                REFS,
                Value::Array(refs.iter().map(RefKey::to_value).collect()),
            )]),
        }
    }

    fn from_value(value: &Value) -> ProtocolResult<Self> {
        Ok(match value {
            Value::Null => SnapshotValue::Null,
            Value::Bool(b) => SnapshotValue::Bool(*b),
            Value::Integer(i) => SnapshotValue::Integer(*i),
            Value::Text(s) => SnapshotValue::Text(s.clone()),
            Value::Map(entries) if entries.len() == 1 => {
                let (tag, inner) = &entries[0];
                match (tag.as_text(), inner) {
                    (Some(DATE), Value::Text(d)) => SnapshotValue::Date(d.clone()),
                    (Some(DATETIME), Value::Text(t)) => SnapshotValue::DateTime(t.clone()),
                    (Some(REF), r) => SnapshotValue::Ref(RefKey::from_value(r)?),
                    (Some(REFS), Value::Array(items)) => SnapshotValue::RefList(
                        items
                            .iter()
                            .map(RefKey::from_value)
                            .collect::<ProtocolResult<_>>()?,
                    ),
                    _ => return Err(ProtocolError::invalid_snapshot("unknown tagged value")),
                }
            }
            _ => return Err(ProtocolError::invalid_snapshot("unsupported value shape")),
        })
    }
}

fn write_parts(f: &mut fmt::Formatter<'_>, parts: &[SnapshotValue]) -> fmt::Result {
    f.write_str("(")?;
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{part}")?;
    }
    f.write_str(")")
}

impl fmt::Display for RefKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.model)?;
        write_parts(f, &self.key)
    }
}

impl fmt::Display for SnapshotValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotValue::Null => f.write_str("null"),
            SnapshotValue::Bool(b) => write!(f, "{b}"),
            SnapshotValue::Integer(i) => write!(f, "{i}"),
            SnapshotValue::Text(s) | SnapshotValue::Date(s) | SnapshotValue::DateTime(s) => {
                f.write_str(s)
            }
            SnapshotValue::Ref(r) => write!(f, "{r}"),
            SnapshotValue::RefList(refs) => {
                f.write_str("[")?;
                for (i, r) in refs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{r}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// The captured state of one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Model name.
    pub model: String,
    /// Identifier on the producing side.
    pub pk: Uuid,
    /// Natural key at capture time.
    pub natural_key: Vec<SnapshotValue>,
    /// Field values by name.
    pub fields: BTreeMap<String, SnapshotValue>,
}

impl Snapshot {
    /// Encodes to CBOR bytes (before encryption).
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let value = Value::text_map([
            ("model", Value::from(self.model.as_str())),
            ("pk", Value::Bytes(self.pk.as_bytes().to_vec())),
            (
                "natural_key",
                Value::Array(self.natural_key.iter().map(SnapshotValue::to_value).collect()),
            ),
            (
                "fields",
                Value::text_map(
                    self.fields
                        .iter()
                        .map(|(name, v)| (name.as_str(), v.to_value())),
                ),
            ),
        ]);
        Ok(to_canonical_cbor(&value)?)
    }

    /// Decodes from CBOR bytes (after decryption).
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let value = from_cbor(bytes)?;
        let pk = Uuid::from_slice(value.require_bytes("pk")?).map_err(|_| {
            ProtocolError::InvalidId {
                field: "pk".to_string(),
            }
        })?;
        let natural_key = value
            .require("natural_key")?
            .as_array()
            .ok_or_else(|| ProtocolError::invalid_snapshot("natural_key must be an array"))?
            .iter()
            .map(SnapshotValue::from_value)
            .collect::<ProtocolResult<_>>()?;
        let mut fields = BTreeMap::new();
        let entries = value
            .require("fields")?
            .as_map()
            .ok_or_else(|| ProtocolError::invalid_snapshot("fields must be a map"))?;
        for (name, v) in entries {
            let name = name
                .as_text()
                .ok_or_else(|| ProtocolError::invalid_snapshot("field names must be text"))?;
            fields.insert(name.to_string(), SnapshotValue::from_value(v)?);
        }
        Ok(Self {
            model: value.require_text("model")?.to_string(),
            pk,
            natural_key,
            fields,
        })
    }
}
