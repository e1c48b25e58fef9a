//! Canonical encoder backed by `ciborium`.

use crate::error::{CodecError, CodecResult};
use crate::value::{sort_pairs, Value};
use ciborium::value::Value as Cbor;

/// Encodes [`Value`]s to canonical CBOR.
///
/// `ciborium` already writes shortest-form integers and definite lengths;
/// this type is responsible for map key order, which it re-establishes on
/// every map so hand-built `Value::Map`s encode identically to sorted ones.
#[derive(Debug, Default, Clone, Copy)]
pub struct CanonicalEncoder;

impl CanonicalEncoder {
    /// Creates an encoder.
    pub fn new() -> Self {
        Self
    }

    /// Encodes a value into a fresh buffer.
    pub fn encode(&self, value: &Value) -> CodecResult<Vec<u8>> {
        let mut out = Vec::new();
        ciborium::ser::into_writer(&to_cbor(value), &mut out)
            .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
        Ok(out)
    }
}

fn to_cbor(value: &Value) -> Cbor {
    match value {
        Value::Null => Cbor::Null,
        Value::Bool(b) => Cbor::Bool(*b),
        Value::Integer(i) => Cbor::Integer((*i).into()),
        Value::Bytes(b) => Cbor::Bytes(b.clone()),
        Value::Text(s) => Cbor::Text(s.clone()),
        Value::Array(items) => Cbor::Array(items.iter().map(to_cbor).collect()),
        Value::Map(pairs) => {
            let mut sorted = pairs.clone();
            sort_pairs(&mut sorted);
            Cbor::Map(
                sorted
                    .iter()
                    .map(|(k, v)| (to_cbor(k), to_cbor(v)))
                    .collect(),
            )
        }
    }
}

/// Encodes a value to canonical CBOR bytes.
pub fn to_canonical_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    CanonicalEncoder::new().encode(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_integers_use_one_byte() {
        assert_eq!(to_canonical_cbor(&Value::Integer(10)).unwrap(), vec![0x0a]);
        assert_eq!(to_canonical_cbor(&Value::Integer(-1)).unwrap(), vec![0x20]);
    }

    #[test]
    fn unsorted_map_encodes_like_sorted_map() {
        let unsorted = Value::Map(vec![
            (Value::from("bb"), Value::Integer(2)),
            (Value::from("a"), Value::Integer(1)),
        ]);
        let sorted = Value::map(vec![
            (Value::from("a"), Value::Integer(1)),
            (Value::from("bb"), Value::Integer(2)),
        ]);
        assert_eq!(
            to_canonical_cbor(&unsorted).unwrap(),
            to_canonical_cbor(&sorted).unwrap()
        );
    }

    #[test]
    fn nested_unsorted_maps_keep_their_entries() {
        let inner = Value::Map(vec![
            (Value::from("z"), Value::Integer(1)),
            (Value::from("a"), Value::Null),
        ]);
        let outer = Value::Map(vec![(Value::from("k"), inner)]);
        let decoded = crate::from_cbor(&to_canonical_cbor(&outer).unwrap()).unwrap();
        assert_eq!(
            decoded,
            Value::map(vec![(
                Value::from("k"),
                Value::map(vec![
                    (Value::from("a"), Value::Null),
                    (Value::from("z"), Value::Integer(1)),
                ]),
            )])
        );
    }

    #[test]
    fn text_header() {
        let bytes = to_canonical_cbor(&Value::from("abc")).unwrap();
        assert_eq!(bytes, vec![0x63, b'a', b'b', b'c']);
    }
}
