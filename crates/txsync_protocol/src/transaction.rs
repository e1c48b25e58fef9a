//! Outgoing and incoming transaction rows.

use crate::action::Action;
use crate::error::{ProtocolError, ProtocolResult};
use crate::timestamp::TxTimestamp;
use std::collections::BTreeMap;
use txsync_codec::{from_cbor, to_canonical_cbor, CodecError, Value};
use uuid::Uuid;

fn uuid_at(map: &Value, field: &str) -> ProtocolResult<Uuid> {
    let bytes = map.require_bytes(field)?;
    Uuid::from_slice(bytes).map_err(|_| ProtocolError::InvalidId {
        field: field.to_string(),
    })
}

fn optional_text(map: &Value, field: &str) -> ProtocolResult<Option<String>> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Text(s)) => Ok(Some(s.clone())),
        Some(_) => Err(CodecError::invalid_structure(format!("'{field}' must be text")).into()),
    }
}

/// The fields shared by outgoing and incoming rows.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Envelope {
    id: Uuid,
    tx_name: String,
    tx_pk: Uuid,
    tx: Vec<u8>,
    timestamp: TxTimestamp,
    producer: String,
    action: Action,
}

impl Envelope {
    fn pairs(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", Value::Bytes(self.id.as_bytes().to_vec())),
            ("tx_name", Value::from(self.tx_name.as_str())),
            ("tx_pk", Value::Bytes(self.tx_pk.as_bytes().to_vec())),
            ("tx", Value::Bytes(self.tx.clone())),
            ("timestamp", Value::from(self.timestamp.as_str())),
            ("producer", Value::from(self.producer.as_str())),
            ("action", Value::from(self.action.to_code())),
        ]
    }

    fn read(map: &Value) -> ProtocolResult<Self> {
        Ok(Self {
            id: uuid_at(map, "id")?,
            tx_name: map.require_text("tx_name")?.to_string(),
            tx_pk: uuid_at(map, "tx_pk")?,
            tx: map.require_bytes("tx")?.to_vec(),
            timestamp: TxTimestamp::parse(map.require_text("timestamp")?)?,
            producer: map.require_text("producer")?.to_string(),
            action: Action::from_code(map.require_text("action")?)?,
        })
    }
}

/// A locally-produced transaction awaiting delivery.
///
/// Immutable once written, except for [`OutgoingTransaction::consumed_by`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingTransaction {
    /// Row identifier; carried to the peer and used for duplicate detection.
    pub id: Uuid,
    /// Model name of the captured entity.
    pub tx_name: String,
    /// Local identifier of the captured entity.
    pub tx_pk: Uuid,
    /// Encrypted snapshot.
    pub tx: Vec<u8>,
    /// When the write happened.
    pub timestamp: TxTimestamp,
    /// Name of the producer that wrote the row.
    pub producer: String,
    /// Recorded mutation.
    pub action: Action,
    /// Per-peer delivery flags.
    pub consumed_by: BTreeMap<String, bool>,
}

impl OutgoingTransaction {
    /// Creates a row with a fresh identifier, not yet delivered anywhere.
    pub fn new(
        tx_name: impl Into<String>,
        tx_pk: Uuid,
        tx: Vec<u8>,
        timestamp: TxTimestamp,
        producer: impl Into<String>,
        action: Action,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx_name: tx_name.into(),
            tx_pk,
            tx,
            timestamp,
            producer: producer.into(),
            action,
            consumed_by: BTreeMap::new(),
        }
    }

    /// Whether the row has been delivered to `peer`.
    pub fn is_consumed_by(&self, peer: &str) -> bool {
        self.consumed_by.get(peer).copied().unwrap_or(false)
    }

    /// Flags the row as delivered to `peer`.
    pub fn mark_consumed_by(&mut self, peer: impl Into<String>) {
        self.consumed_by.insert(peer.into(), true);
    }

    fn envelope(&self) -> Envelope {
        Envelope {
            id: self.id,
            tx_name: self.tx_name.clone(),
            tx_pk: self.tx_pk,
            tx: self.tx.clone(),
            timestamp: self.timestamp.clone(),
            producer: self.producer.clone(),
            action: self.action,
        }
    }

    /// Encodes to CBOR bytes.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let mut pairs = self.envelope().pairs();
        pairs.push((
            "consumed_by",
            Value::text_map(
                self.consumed_by
                    .iter()
                    .map(|(peer, flag)| (peer.as_str(), Value::Bool(*flag))),
            ),
        ));
        Ok(to_canonical_cbor(&Value::text_map(pairs))?)
    }

    /// Decodes from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let value = from_cbor(bytes)?;
        let envelope = Envelope::read(&value)?;
        let mut consumed_by = BTreeMap::new();
        if let Some(entries) = value.require("consumed_by")?.as_map() {
            for (peer, flag) in entries {
                let peer = peer
                    .as_text()
                    .ok_or_else(|| CodecError::invalid_structure("peer names must be text"))?;
                let flag = flag
                    .as_bool()
                    .ok_or_else(|| CodecError::invalid_structure("peer flags must be booleans"))?;
                consumed_by.insert(peer.to_string(), flag);
            }
        }
        Ok(Self {
            id: envelope.id,
            tx_name: envelope.tx_name,
            tx_pk: envelope.tx_pk,
            tx: envelope.tx,
            timestamp: envelope.timestamp,
            producer: envelope.producer,
            action: envelope.action,
            consumed_by,
        })
    }
}

/// A transaction received from a peer, awaiting replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingTransaction {
    /// Identifier of the originating outgoing row.
    pub id: Uuid,
    /// Model name of the captured entity.
    pub tx_name: String,
    /// Identifier of the entity on the producing side.
    pub tx_pk: Uuid,
    /// Encrypted snapshot.
    pub tx: Vec<u8>,
    /// When the write happened on the producer.
    pub timestamp: TxTimestamp,
    /// Producer name.
    pub producer: String,
    /// Recorded mutation.
    pub action: Action,
    /// Set once replay succeeded; never cleared.
    pub is_consumed: bool,
    /// When replay succeeded.
    pub consumed_at: Option<TxTimestamp>,
    /// Most recent replay failure, if any.
    pub last_error: Option<String>,
}

impl IncomingTransaction {
    /// The pending incoming copy of an outgoing row.
    pub fn from_outgoing(row: &OutgoingTransaction) -> Self {
        Self {
            id: row.id,
            tx_name: row.tx_name.clone(),
            tx_pk: row.tx_pk,
            tx: row.tx.clone(),
            timestamp: row.timestamp.clone(),
            producer: row.producer.clone(),
            action: row.action,
            is_consumed: false,
            consumed_at: None,
            last_error: None,
        }
    }

    /// Marks the row consumed.
    pub fn mark_consumed(&mut self, at: TxTimestamp) {
        self.is_consumed = true;
        self.consumed_at = Some(at);
        self.last_error = None;
    }

    fn envelope(&self) -> Envelope {
        Envelope {
            id: self.id,
            tx_name: self.tx_name.clone(),
            tx_pk: self.tx_pk,
            tx: self.tx.clone(),
            timestamp: self.timestamp.clone(),
            producer: self.producer.clone(),
            action: self.action,
        }
    }

    /// Encodes to CBOR bytes.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let mut pairs = self.envelope().pairs();
        pairs.push(("is_consumed", Value::Bool(self.is_consumed)));
        pairs.push((
            "consumed_at",
            Value::from(self.consumed_at.as_ref().map(TxTimestamp::as_str)),
        ));
        pairs.push(("last_error", Value::from(self.last_error.clone())));
        Ok(to_canonical_cbor(&Value::text_map(pairs))?)
    }

    /// Decodes from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let value = from_cbor(bytes)?;
        let envelope = Envelope::read(&value)?;
        let consumed_at = optional_text(&value, "consumed_at")?
            .map(|s| TxTimestamp::parse(&s))
            .transpose()?;
        Ok(Self {
            id: envelope.id,
            tx_name: envelope.tx_name,
            tx_pk: envelope.tx_pk,
            tx: envelope.tx,
            timestamp: envelope.timestamp,
            producer: envelope.producer,
            action: envelope.action,
            is_consumed: value.require_bool("is_consumed")?,
            consumed_at,
            last_error: optional_text(&value, "last_error")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outgoing() -> OutgoingTransaction {
        OutgoingTransaction::new(
            "TestModel",
            Uuid::new_v4(),
            vec![9, 9, 9],
            TxTimestamp::parse("20240309070503000042").unwrap(),
            "host-client",
            Action::Insert,
        )
    }

    #[test]
    fn outgoing_consumption_is_per_peer() {
        let mut row = outgoing();
        assert!(!row.is_consumed_by("server"));
        row.mark_consumed_by("server");
        assert!(row.is_consumed_by("server"));
        assert!(!row.is_consumed_by("other"));

        let decoded = OutgoingTransaction::decode(&row.encode().unwrap()).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn incoming_copy_preserves_envelope() {
        let out = outgoing();
        let mut incoming = IncomingTransaction::from_outgoing(&out);
        assert_eq!(incoming.id, out.id);
        assert_eq!(incoming.tx, out.tx);
        assert!(!incoming.is_consumed);

        incoming.last_error = Some("boom".into());
        let decoded = IncomingTransaction::decode(&incoming.encode().unwrap()).unwrap();
        assert_eq!(decoded, incoming);

        incoming.mark_consumed(TxTimestamp::parse("20240309070503000043").unwrap());
        assert!(incoming.last_error.is_none());
        let decoded = IncomingTransaction::decode(&incoming.encode().unwrap()).unwrap();
        assert!(decoded.is_consumed);
        assert_eq!(decoded.consumed_at, incoming.consumed_at);
    }

    #[test]
    fn decode_rejects_bad_action() {
        let row = outgoing();
        let mut pairs = row.envelope().pairs();
        pairs.retain(|(k, _)| *k != "action");
        pairs.push(("action", Value::from("Z")));
        pairs.push(("consumed_by", Value::text_map(Vec::<(String, Value)>::new())));
        let bytes = to_canonical_cbor(&Value::text_map(pairs)).unwrap();
        assert!(matches!(
            OutgoingTransaction::decode(&bytes),
            Err(ProtocolError::InvalidAction { .. })
        ));
    }
}
