//! Entities and their field values.

mod id;
mod value;

pub use id::EntityId;
pub use value::{EntityRef, FieldValue, NaturalKey};

use std::collections::BTreeMap;

/// Field name to value, in field-name order.
pub type Fields = BTreeMap<String, FieldValue>;

/// One row of a model.
///
/// Entities are created through [`Model::instantiate`](crate::Model::instantiate),
/// which enforces the capability contract. Field edits made with
/// [`Entity::set`] are validated when the entity is saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    model: String,
    id: EntityId,
    fields: Fields,
}

impl Entity {
    pub(crate) fn from_parts(model: String, id: EntityId, fields: Fields) -> Self {
        Self { model, id, fields }
    }

    /// Name of the model this entity belongs to.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Local identifier.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// A reference to this entity, for use in another entity's fields.
    pub fn to_ref(&self) -> EntityRef {
        EntityRef::new(self.model.clone(), self.id)
    }

    /// Returns a field value.
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Returns a text field.
    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_text)
    }

    /// Sets a field value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(field.into(), value.into());
    }

    /// All field values.
    pub fn fields(&self) -> &Fields {
        &self.fields
    }
}
