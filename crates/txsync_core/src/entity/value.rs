//! Field values, references and natural keys.

use super::EntityId;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;

/// A reference from one entity to another by local identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef {
    /// Target model name.
    pub model: String,
    /// Target identifier in the holding database.
    pub id: EntityId,
}

impl EntityRef {
    /// Creates a reference.
    pub fn new(model: impl Into<String>, id: EntityId) -> Self {
        Self {
            model: model.into(),
            id,
        }
    }
}

/// The value stored in one field of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldValue {
    /// No value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Text.
    Text(String),
    /// Calendar date.
    Date(NaiveDate),
    /// Point in time, UTC.
    DateTime(DateTime<Utc>),
    /// Foreign key.
    Ref(EntityRef),
    /// Many-to-many membership, in insertion order.
    RefList(Vec<EntityRef>),
}

impl FieldValue {
    /// Returns true for [`FieldValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Returns the text if this is a Text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer if this is an Integer value.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the reference if this is a Ref value.
    pub fn as_reference(&self) -> Option<&EntityRef> {
        match self {
            FieldValue::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// Returns the references if this is a RefList value.
    pub fn as_references(&self) -> Option<&[EntityRef]> {
        match self {
            FieldValue::RefList(r) => Some(r),
            _ => None,
        }
    }

    /// Short name of the variant, used in validation messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "bool",
            FieldValue::Integer(_) => "integer",
            FieldValue::Text(_) => "text",
            FieldValue::Date(_) => "date",
            FieldValue::DateTime(_) => "datetime",
            FieldValue::Ref(_) => "reference",
            FieldValue::RefList(_) => "reference list",
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Integer(i) => write!(f, "{i}"),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            FieldValue::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            FieldValue::Ref(r) => write!(f, "{}:{}", r.model, r.id),
            FieldValue::RefList(refs) => write!(f, "[{} refs]", refs.len()),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(v: NaiveDate) -> Self {
        FieldValue::Date(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::DateTime(v)
    }
}

impl From<EntityRef> for FieldValue {
    fn from(v: EntityRef) -> Self {
        FieldValue::Ref(v)
    }
}

impl From<Vec<EntityRef>> for FieldValue {
    fn from(v: Vec<EntityRef>) -> Self {
        FieldValue::RefList(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(FieldValue::Null, Into::into)
    }
}

/// A database-independent identity tuple for an entity.
///
/// Two entities of the same model in different databases denote the same
/// logical record exactly when their natural keys are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NaturalKey(Vec<FieldValue>);

impl NaturalKey {
    /// Builds a key from its components.
    pub fn new(parts: Vec<FieldValue>) -> Self {
        Self(parts)
    }

    /// Builds a single-component key.
    pub fn single(part: impl Into<FieldValue>) -> Self {
        Self(vec![part.into()])
    }

    /// The key components.
    pub fn parts(&self) -> &[FieldValue] {
        &self.0
    }

    /// Consumes the key, returning its components.
    pub fn into_parts(self) -> Vec<FieldValue> {
        self.0
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{part}")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_key_display() {
        let key = NaturalKey::new(vec!["erik".into(), FieldValue::Integer(3)]);
        assert_eq!(key.to_string(), "(erik, 3)");
    }

    #[test]
    fn option_into_null() {
        assert!(FieldValue::from(None::<&str>).is_null());
        assert_eq!(FieldValue::from(Some("x")).as_text(), Some("x"));
    }
}
