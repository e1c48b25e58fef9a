//! Registry of models shared by every database handle.

use crate::entity::{Entity, FieldValue};
use crate::error::{CoreError, CoreResult};
use crate::history;
use crate::model::Model;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The set of models known to a group of databases.
///
/// Registration does not check capabilities: a misdeclared model can be
/// registered and only fails once something tries to instantiate it.
#[derive(Debug, Default, Clone)]
pub struct Schema {
    models: BTreeMap<String, Arc<Model>>,
}

impl Schema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model, plus its audit counterpart if it keeps history.
    ///
    /// A later registration under the same name replaces the earlier one.
    pub fn register(&mut self, model: Model) -> &mut Self {
        if model.has_history() {
            let audit = history::audit_model(&model);
            self.models
                .insert(audit.name().to_string(), Arc::new(audit));
        }
        self.models.insert(model.name().to_string(), Arc::new(model));
        self
    }

    /// Builder-style [`Schema::register`].
    #[must_use]
    pub fn with(mut self, model: Model) -> Self {
        self.register(model);
        self
    }

    /// Looks up a model.
    pub fn get(&self, name: &str) -> CoreResult<Arc<Model>> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::unknown_model(name))
    }

    /// Whether a model is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// Instantiates an entity of the named model.
    pub fn instantiate<K, V>(
        &self,
        model: &str,
        values: impl IntoIterator<Item = (K, V)>,
    ) -> CoreResult<Entity>
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.get(model)?.instantiate(values)
    }

    /// All registered models, by name.
    pub fn models(&self) -> impl Iterator<Item = &Arc<Model>> {
        self.models.values()
    }
}
