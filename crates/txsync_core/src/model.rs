//! Model declarations and the entity capability contract.
//!
//! A model becomes syncable by carrying two capabilities:
//!
//! - a [`NaturalKeySource`], which yields the database-independent identity
//!   of an entity, and
//! - a [`NaturalKeyLookup`], which finds the local entity for such a key.
//!
//! Both are checked every time an entity is instantiated, so a misdeclared
//! model fails with [`CoreError::Configuration`] before anything is written.
//!
//! Models may also carry replay hooks: a skip-saving predicate, a duplicate
//! policy and a missing-reference resolver.

use crate::entity::{Entity, EntityId, FieldValue, Fields, NaturalKey};
use crate::error::{CoreError, CoreResult};
use crate::transaction::Transaction;
use std::fmt;
use std::sync::Arc;

/// Declared type of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Boolean.
    Bool,
    /// Signed integer.
    Integer,
    /// Text.
    Text,
    /// Calendar date.
    Date,
    /// UTC timestamp.
    DateTime,
    /// Reference to one entity of the named model.
    ForeignKey(String),
    /// References to any number of entities of the named model.
    ManyToMany(String),
}

impl FieldKind {
    fn accepts(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (FieldKind::Bool, FieldValue::Bool(_))
            | (FieldKind::Integer, FieldValue::Integer(_))
            | (FieldKind::Text, FieldValue::Text(_))
            | (FieldKind::Date, FieldValue::Date(_))
            | (FieldKind::DateTime, FieldValue::DateTime(_)) => true,
            (FieldKind::ForeignKey(target), FieldValue::Ref(r)) => &r.model == target,
            (FieldKind::ManyToMany(target), FieldValue::RefList(refs)) => {
                refs.iter().all(|r| &r.model == target)
            }
            _ => false,
        }
    }

    /// The referenced model for relation fields.
    pub fn target(&self) -> Option<&str> {
        match self {
            FieldKind::ForeignKey(t) | FieldKind::ManyToMany(t) => Some(t),
            _ => None,
        }
    }
}

/// Produces a default value for a field at instantiation.
pub type DefaultFn = Arc<dyn Fn() -> FieldValue + Send + Sync>;

/// Declaration of one field.
#[derive(Clone)]
pub struct FieldDef {
    name: String,
    kind: FieldKind,
    unique: bool,
    nullable: bool,
    default: Option<DefaultFn>,
}

impl FieldDef {
    /// Declares a field of the given kind.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            unique: false,
            nullable: false,
            default: None,
        }
    }

    /// Declares a text field.
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text)
    }

    /// Declares an integer field.
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    /// Declares a boolean field.
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Bool)
    }

    /// Declares a date field.
    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Date)
    }

    /// Declares a timestamp field.
    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::DateTime)
    }

    /// Declares a foreign key to `target`.
    pub fn foreign_key(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, FieldKind::ForeignKey(target.into()))
    }

    /// Declares a many-to-many relation to `target`. Defaults to empty.
    pub fn many_to_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, FieldKind::ManyToMany(target.into()))
    }

    /// Marks the field unique within its model.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Allows null; a missing value then defaults to null.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Uses a fixed default value.
    #[must_use]
    pub fn default_value(self, value: impl Into<FieldValue>) -> Self {
        let value = value.into();
        self.default_with(move || value.clone())
    }

    /// Computes the default value on every instantiation.
    #[must_use]
    pub fn default_with(mut self, f: impl Fn() -> FieldValue + Send + Sync + 'static) -> Self {
        self.default = Some(Arc::new(f));
        self
    }

    /// Field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared kind.
    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// Whether values must be unique within the model.
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Whether null is accepted.
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    fn initial(&self) -> Option<FieldValue> {
        if let Some(default) = &self.default {
            return Some(default());
        }
        match self.kind {
            FieldKind::ManyToMany(_) => Some(FieldValue::RefList(Vec::new())),
            _ if self.nullable => Some(FieldValue::Null),
            _ => None,
        }
    }

    fn check(&self, model: &str, value: &FieldValue) -> CoreResult<()> {
        if value.is_null() {
            if self.nullable {
                return Ok(());
            }
            return Err(CoreError::invalid_field(model, &self.name, "may not be null"));
        }
        if self.kind.accepts(value) {
            Ok(())
        } else {
            Err(CoreError::invalid_field(
                model,
                &self.name,
                format!("expected {:?}, got {}", self.kind, value.kind_name()),
            ))
        }
    }

    /// Copy of this declaration without uniqueness and accepting null.
    pub(crate) fn relaxed(&self) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind.clone(),
            unique: false,
            nullable: true,
            default: None,
        }
    }
}

impl fmt::Debug for FieldDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("unique", &self.unique)
            .field("nullable", &self.nullable)
            .field("has_default", &self.default.is_some())
            .finish()
    }
}

/// Natural-key capability.
pub trait NaturalKeySource: Send + Sync {
    /// Returns the database-independent key of `entity`.
    fn natural_key(&self, entity: &Entity) -> CoreResult<NaturalKey>;
}

/// Natural key made of the values of named fields, in order.
#[derive(Debug, Clone)]
pub struct FieldNaturalKey {
    fields: Vec<String>,
}

impl FieldNaturalKey {
    /// Key over the given fields.
    pub fn new<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

impl NaturalKeySource for FieldNaturalKey {
    fn natural_key(&self, entity: &Entity) -> CoreResult<NaturalKey> {
        self.fields
            .iter()
            .map(|field| {
                entity.get(field).cloned().ok_or_else(|| {
                    CoreError::invalid_field(entity.model(), field, "natural key field missing")
                })
            })
            .collect::<CoreResult<Vec<_>>>()
            .map(NaturalKey::new)
    }
}

/// Lookup-by-natural-key capability.
pub trait NaturalKeyLookup: Send + Sync {
    /// Finds the entity among `candidates` whose natural key is `key`.
    fn get_by_natural_key(
        &self,
        model: &Model,
        candidates: &[Entity],
        key: &NaturalKey,
    ) -> CoreResult<Option<Entity>>;

    /// Whether a match is exactly equality of [`Model::natural_key`], so a
    /// database may answer from its natural-key index instead of a scan.
    fn uses_key_index(&self) -> bool {
        false
    }
}

/// Lookup by equality of natural keys.
///
/// Transactions answer it from the database's natural-key index;
/// [`Model::find_by_natural_key`] compares every candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexedLookup;

impl NaturalKeyLookup for IndexedLookup {
    fn uses_key_index(&self) -> bool {
        true
    }

    fn get_by_natural_key(
        &self,
        model: &Model,
        candidates: &[Entity],
        key: &NaturalKey,
    ) -> CoreResult<Option<Entity>> {
        for entity in candidates {
            if &model.natural_key(entity)? == key {
                return Ok(Some(entity.clone()));
            }
        }
        Ok(None)
    }
}

/// What replay does when an Insert arrives for an entity that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Leave the local entity untouched.
    #[default]
    Skip,
    /// Apply the incoming fields and count an update.
    OverwriteAsUpdate,
    /// Apply the incoming fields and count an insert.
    OverwriteAsInsert,
}

/// A reference that could not be resolved on the receiving side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingReference {
    /// Field holding the reference.
    pub field: String,
    /// Referenced model.
    pub model: String,
    /// Natural key that had no local match.
    pub key: NaturalKey,
}

/// Opt-out predicate: entities for which it returns true are not published.
pub type SkipSavingFn = Arc<dyn Fn(&Entity) -> bool + Send + Sync>;

/// Chooses the [`DuplicatePolicy`] given the local entity and incoming fields.
pub type DuplicatePolicyFn = Arc<dyn Fn(&Entity, &Fields) -> DuplicatePolicy + Send + Sync>;

/// Resolves a reference that has no local match, or returns `None`.
pub type MissingReferenceFn =
    Arc<dyn Fn(&MissingReference, &Transaction<'_>) -> CoreResult<Option<EntityId>> + Send + Sync>;

/// A registered model.
pub struct Model {
    name: String,
    fields: Vec<FieldDef>,
    natural_key: Option<Arc<dyn NaturalKeySource>>,
    lookup: Option<Arc<dyn NaturalKeyLookup>>,
    history: bool,
    audit_of: Option<String>,
    skip_saving: Option<SkipSavingFn>,
    on_duplicate: Option<DuplicatePolicyFn>,
    missing_reference: Option<MissingReferenceFn>,
}

impl Model {
    /// Starts declaring a model.
    pub fn builder(name: impl Into<String>) -> ModelBuilder {
        ModelBuilder {
            model: Model {
                name: name.into(),
                fields: Vec::new(),
                natural_key: None,
                lookup: None,
                history: false,
                audit_of: None,
                skip_saving: None,
                on_duplicate: None,
                missing_reference: None,
            },
        }
    }

    /// Model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field declarations in declaration order.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Looks up a field declaration.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Unique field declarations.
    pub fn unique_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.unique)
    }

    /// Whether writes are recorded in an audit counterpart.
    pub fn has_history(&self) -> bool {
        self.history
    }

    /// Whether this is an audit counterpart.
    pub fn is_audit(&self) -> bool {
        self.audit_of.is_some()
    }

    /// The audited model, for audit counterparts.
    pub fn audit_of(&self) -> Option<&str> {
        self.audit_of.as_deref()
    }

    /// Fails unless both sync capabilities are present.
    pub fn check_capabilities(&self) -> CoreResult<()> {
        if self.natural_key.is_none() {
            return Err(CoreError::configuration(
                &self.name,
                "missing natural_key capability",
            ));
        }
        if self.lookup.is_none() {
            return Err(CoreError::configuration(
                &self.name,
                "missing get_by_natural_key capability",
            ));
        }
        Ok(())
    }

    /// Creates a new entity with a fresh identifier.
    ///
    /// Unset fields take their default, null if nullable, or empty for
    /// many-to-many relations; any other unset field is an error.
    pub fn instantiate<K, V>(&self, values: impl IntoIterator<Item = (K, V)>) -> CoreResult<Entity>
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.instantiate_with_id(EntityId::new(), values)
    }

    /// Creates a new entity with the given identifier.
    pub fn instantiate_with_id<K, V>(
        &self,
        id: EntityId,
        values: impl IntoIterator<Item = (K, V)>,
    ) -> CoreResult<Entity>
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.check_capabilities()?;

        let mut fields: Fields = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        for def in &self.fields {
            if fields.contains_key(&def.name) {
                continue;
            }
            let value = def
                .initial()
                .ok_or_else(|| CoreError::invalid_field(&self.name, &def.name, "required"))?;
            fields.insert(def.name.clone(), value);
        }

        let entity = Entity::from_parts(self.name.clone(), id, fields);
        self.validate(&entity)?;
        Ok(entity)
    }

    /// Checks every field of `entity` against its declaration.
    pub fn validate(&self, entity: &Entity) -> CoreResult<()> {
        if entity.model() != self.name {
            return Err(CoreError::invalid_operation(format!(
                "entity of {} validated against {}",
                entity.model(),
                self.name
            )));
        }
        for (name, value) in entity.fields() {
            let def = self
                .field(name)
                .ok_or_else(|| CoreError::invalid_field(&self.name, name, "unknown field"))?;
            def.check(&self.name, value)?;
        }
        for def in &self.fields {
            if !entity.fields().contains_key(&def.name) && !def.nullable {
                return Err(CoreError::invalid_field(&self.name, &def.name, "required"));
            }
        }
        Ok(())
    }

    /// Natural key of `entity`.
    pub fn natural_key(&self, entity: &Entity) -> CoreResult<NaturalKey> {
        match &self.natural_key {
            Some(source) => source.natural_key(entity),
            None => Err(CoreError::configuration(
                &self.name,
                "missing natural_key capability",
            )),
        }
    }

    /// Whether lookups of this model may use the natural-key index.
    pub fn uses_key_index(&self) -> bool {
        self.lookup.as_ref().is_some_and(|lookup| lookup.uses_key_index())
    }

    /// Finds the entity with natural key `key` among `candidates`.
    pub fn find_by_natural_key(
        &self,
        candidates: &[Entity],
        key: &NaturalKey,
    ) -> CoreResult<Option<Entity>> {
        match &self.lookup {
            Some(lookup) => lookup.get_by_natural_key(self, candidates, key),
            None => Err(CoreError::configuration(
                &self.name,
                "missing get_by_natural_key capability",
            )),
        }
    }

    /// Whether `entity` opts out of publication.
    pub fn should_skip_saving(&self, entity: &Entity) -> bool {
        self.skip_saving.as_ref().is_some_and(|f| f(entity))
    }

    /// Policy for an Insert that finds `existing` already present.
    pub fn duplicate_policy(&self, existing: &Entity, incoming: &Fields) -> DuplicatePolicy {
        self.on_duplicate
            .as_ref()
            .map_or(DuplicatePolicy::Skip, |f| f(existing, incoming))
    }

    /// Gives the model a chance to resolve a dangling reference.
    pub fn resolve_missing(
        &self,
        missing: &MissingReference,
        txn: &Transaction<'_>,
    ) -> CoreResult<Option<EntityId>> {
        match &self.missing_reference {
            Some(resolve) => resolve(missing, txn),
            None => Ok(None),
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("natural_key", &self.natural_key.is_some())
            .field("lookup", &self.lookup.is_some())
            .field("history", &self.history)
            .field("audit_of", &self.audit_of)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Model`].
#[must_use]
pub struct ModelBuilder {
    model: Model,
}

impl ModelBuilder {
    /// Adds a field.
    pub fn field(mut self, def: FieldDef) -> Self {
        self.model.fields.push(def);
        self
    }

    /// Uses the named fields, in order, as the natural key.
    pub fn natural_key_fields<S: Into<String>>(self, fields: impl IntoIterator<Item = S>) -> Self {
        self.natural_key(Arc::new(FieldNaturalKey::new(fields)))
    }

    /// Installs a natural-key capability.
    pub fn natural_key(mut self, source: Arc<dyn NaturalKeySource>) -> Self {
        self.model.natural_key = Some(source);
        self
    }

    /// Installs a lookup capability.
    pub fn lookup(mut self, lookup: Arc<dyn NaturalKeyLookup>) -> Self {
        self.model.lookup = Some(lookup);
        self
    }

    /// Installs [`IndexedLookup`].
    pub fn lookup_by_natural_key(self) -> Self {
        self.lookup(Arc::new(IndexedLookup))
    }

    /// Records every write in an audit counterpart model.
    pub fn history(mut self) -> Self {
        self.model.history = true;
        self
    }

    /// Installs a skip-saving predicate.
    pub fn skip_saving(mut self, f: impl Fn(&Entity) -> bool + Send + Sync + 'static) -> Self {
        self.model.skip_saving = Some(Arc::new(f));
        self
    }

    /// Installs a duplicate policy.
    pub fn on_duplicate(
        mut self,
        f: impl Fn(&Entity, &Fields) -> DuplicatePolicy + Send + Sync + 'static,
    ) -> Self {
        self.model.on_duplicate = Some(Arc::new(f));
        self
    }

    /// Installs a missing-reference resolver.
    pub fn missing_reference(
        mut self,
        f: impl Fn(&MissingReference, &Transaction<'_>) -> CoreResult<Option<EntityId>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.model.missing_reference = Some(Arc::new(f));
        self
    }

    pub(crate) fn audit_of(mut self, source: impl Into<String>) -> Self {
        self.model.audit_of = Some(source.into());
        self
    }

    /// Finishes the declaration.
    pub fn build(self) -> Model {
        self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named() -> Model {
        Model::builder("Named")
            .field(FieldDef::text("name").unique())
            .field(FieldDef::text("note").nullable())
            .field(FieldDef::integer("rank").default_value(7))
            .natural_key_fields(["name"])
            .lookup_by_natural_key()
            .build()
    }

    #[test]
    fn instantiate_fills_defaults() {
        let entity = named().instantiate([("name", "erik")]).unwrap();
        assert_eq!(entity.get("note"), Some(&FieldValue::Null));
        assert_eq!(entity.get("rank"), Some(&FieldValue::Integer(7)));
    }

    #[test]
    fn instantiate_requires_non_nullable() {
        let err = named()
            .instantiate(Vec::<(String, FieldValue)>::new())
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidField { ref field, .. } if field == "name"));
    }

    #[test]
    fn instantiate_rejects_wrong_kind_and_unknown_field() {
        assert!(named().instantiate([("name", FieldValue::Integer(1))]).is_err());
        assert!(named()
            .instantiate([("name", FieldValue::from("a")), ("bogus", FieldValue::from("b"))])
            .is_err());
    }

    #[test]
    fn missing_natural_key_is_configuration_error() {
        let model = Model::builder("BadTestModel")
            .field(FieldDef::text("f1"))
            .build();
        let err = model.instantiate([("f1", "x")]).unwrap_err();
        assert!(matches!(err, CoreError::Configuration { .. }));
        assert!(err.to_string().contains("natural_key"));
    }

    #[test]
    fn missing_lookup_is_configuration_error() {
        let model = Model::builder("AnotherBadTestModel")
            .field(FieldDef::text("f1"))
            .natural_key_fields(["f1"])
            .build();
        let err = model.instantiate([("f1", "x")]).unwrap_err();
        assert!(err.to_string().contains("get_by_natural_key"));
    }

    #[test]
    fn lookup_scans_given_candidates() {
        let model = named();
        let a = model.instantiate([("name", "a")]).unwrap();
        let b = model.instantiate([("name", "b")]).unwrap();
        let found = model
            .find_by_natural_key(&[a, b.clone()], &NaturalKey::single("b"))
            .unwrap();
        assert_eq!(found, Some(b));
    }

    #[test]
    fn foreign_key_checks_target_model() {
        let model = Model::builder("Holder")
            .field(FieldDef::text("name"))
            .field(FieldDef::foreign_key("fk", "Fk"))
            .natural_key_fields(["name"])
            .lookup_by_natural_key()
            .build();
        let wrong = crate::EntityRef::new("Other", EntityId::new());
        assert!(model
            .instantiate([("name", FieldValue::from("x")), ("fk", wrong.into())])
            .is_err());
        let right = crate::EntityRef::new("Fk", EntityId::new());
        assert!(model
            .instantiate([("name", FieldValue::from("x")), ("fk", right.into())])
            .is_ok());
    }

    #[test]
    fn default_duplicate_policy_is_skip() {
        let model = named();
        let e = model.instantiate([("name", "a")]).unwrap();
        assert_eq!(model.duplicate_policy(&e, e.fields()), DuplicatePolicy::Skip);
    }
}
