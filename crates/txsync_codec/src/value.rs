//! Dynamic CBOR value type.

use crate::encoder::to_canonical_cbor;
use crate::error::{CodecError, CodecResult};

/// A dynamic CBOR value.
///
/// Floats are not representable: every number that crosses the wire is an
/// integer, and dates travel as ISO strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Byte string.
    Bytes(Vec<u8>),
    /// Text string (UTF-8).
    Text(String),
    /// Array of values.
    Array(Vec<Value>),
    /// Map of key-value pairs, kept in canonical key order.
    Map(Vec<(Value, Value)>),
}

/// Puts map entries in canonical key order.
pub(crate) fn sort_pairs(pairs: &mut [(Value, Value)]) {
    pairs.sort_by_cached_key(|(key, _)| {
        let bytes = key.sort_key();
        (bytes.len(), bytes)
    });
}

impl Value {
    /// Create a map value with keys in canonical order.
    ///
    /// Keys are ordered by the length of their encoding first, then
    /// bytewise, which is the order the encoder emits.
    pub fn map(mut pairs: Vec<(Value, Value)>) -> Self {
        sort_pairs(&mut pairs);
        Value::Map(pairs)
    }

    /// Convenience constructor for maps keyed by text.
    pub fn text_map<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::map(
            pairs
                .into_iter()
                .map(|(k, v)| (Value::Text(k.into()), v))
                .collect(),
        )
    }

    fn sort_key(&self) -> Vec<u8> {
        to_canonical_cbor(self).unwrap_or_default()
    }

    /// Returns true if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean value if this is a Bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer value if this is an Integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the bytes if this is a Bytes value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the text if this is a Text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the elements if this is an Array.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Returns the entries if this is a Map.
    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Looks up a text key in a map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_text() == Some(key))
            .map(|(_, v)| v)
    }

    /// Looks up a required text key, failing with [`CodecError::MissingField`].
    pub fn require(&self, key: &str) -> CodecResult<&Value> {
        self.get(key).ok_or_else(|| CodecError::missing_field(key))
    }

    /// Required text field.
    pub fn require_text(&self, key: &str) -> CodecResult<&str> {
        self.require(key)?
            .as_text()
            .ok_or_else(|| CodecError::invalid_structure(format!("'{key}' must be text")))
    }

    /// Required byte-string field.
    pub fn require_bytes(&self, key: &str) -> CodecResult<&[u8]> {
        self.require(key)?
            .as_bytes()
            .ok_or_else(|| CodecError::invalid_structure(format!("'{key}' must be bytes")))
    }

    /// Required boolean field.
    pub fn require_bool(&self, key: &str) -> CodecResult<bool> {
        self.require(key)?
            .as_bool()
            .ok_or_else(|| CodecError::invalid_structure(format!("'{key}' must be a boolean")))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
