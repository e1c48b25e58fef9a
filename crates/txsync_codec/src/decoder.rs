//! Strict decoder backed by `ciborium`.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use ciborium::value::Value as Cbor;

/// Decodes CBOR into [`Value`]s, rejecting anything a txsync encoder would
/// never produce: floats, tags, and maps with duplicate keys.
#[derive(Debug, Default, Clone, Copy)]
pub struct CanonicalDecoder;

impl CanonicalDecoder {
    /// Creates a decoder.
    pub fn new() -> Self {
        Self
    }

    /// Decodes one complete item from `bytes`.
    pub fn decode(&self, bytes: &[u8]) -> CodecResult<Value> {
        if bytes.is_empty() {
            return Err(CodecError::decoding_failed("empty input"));
        }
        let raw: Cbor = ciborium::de::from_reader(bytes)
            .map_err(|e| CodecError::decoding_failed(e.to_string()))?;
        from_cbor_value(raw)
    }
}

fn from_cbor_value(raw: Cbor) -> CodecResult<Value> {
    Ok(match raw {
        Cbor::Null => Value::Null,
        Cbor::Bool(b) => Value::Bool(b),
        Cbor::Integer(i) => Value::Integer(i64::try_from(i).map_err(|_| CodecError::IntegerOverflow)?),
        Cbor::Bytes(b) => Value::Bytes(b),
        Cbor::Text(s) => Value::Text(s),
        Cbor::Float(_) => return Err(CodecError::FloatForbidden),
        Cbor::Tag(tag, _) => return Err(CodecError::unsupported_type(format!("tag {tag}"))),
        Cbor::Array(items) => Value::Array(
            items
                .into_iter()
                .map(from_cbor_value)
                .collect::<CodecResult<_>>()?,
        ),
        Cbor::Map(pairs) => {
            let pairs = pairs
                .into_iter()
                .map(|(k, v)| Ok((from_cbor_value(k)?, from_cbor_value(v)?)))
                .collect::<CodecResult<Vec<_>>>()?;
            let map = Value::map(pairs);
            if let Value::Map(entries) = &map {
                if entries.windows(2).any(|w| w[0].0 == w[1].0) {
                    return Err(CodecError::invalid_structure("duplicate map key"));
                }
            }
            map
        }
        _ => return Err(CodecError::unsupported_type("simple value")),
    })
}

/// Decodes CBOR bytes into a [`Value`].
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    CanonicalDecoder::new().decode(bytes)
}
