//! Fixture models.
//!
//! Every model here is syncable unless its name says otherwise.

use chrono::Utc;
use txsync_core::{DuplicatePolicy, FieldDef, FieldValue, Model, NaturalKey, Schema};
use txsync_engine::register_sync_models;
use uuid::Uuid;

/// Name of the Fk row that [`fallback_note`] resolves dangling references to.
pub const FALLBACK_FK: &str = "unknown";

/// `TestModel`: unique `f1`, nullable `f2`, `f3` defaulting to a fresh
/// uuid. Keeps history.
pub fn test_model() -> Model {
    Model::builder("TestModel")
        .field(FieldDef::text("f1").unique())
        .field(FieldDef::text("f2").nullable())
        .field(FieldDef::text("f3").default_with(|| Uuid::new_v4().to_string().into()))
        .natural_key_fields(["f1"])
        .lookup_by_natural_key()
        .history()
        .build()
}

/// `TestModelDates`: a date and a timestamp.
pub fn test_model_dates() -> Model {
    Model::builder("TestModelDates")
        .field(FieldDef::text("f1").unique())
        .field(FieldDef::date("f2").nullable())
        .field(FieldDef::datetime("f3").default_with(|| FieldValue::DateTime(Utc::now())))
        .natural_key_fields(["f1"])
        .lookup_by_natural_key()
        .build()
}

/// `BadTestModel`: neither capability.
pub fn bad_test_model() -> Model {
    Model::builder("BadTestModel")
        .field(FieldDef::text("f1").default_value("f1"))
        .build()
}

/// `AnotherBadTestModel`: a natural key but no lookup.
pub fn another_bad_test_model() -> Model {
    Model::builder("AnotherBadTestModel")
        .field(FieldDef::text("f1").default_value("f1"))
        .natural_key_fields(["f1"])
        .build()
}

/// `Fk`: a named row referenced by [`complex_test_model`].
pub fn fk() -> Model {
    Model::builder("Fk")
        .field(FieldDef::text("name").unique())
        .natural_key_fields(["name"])
        .lookup_by_natural_key()
        .build()
}

/// `M2m`: a named row related many-to-many by [`complex_test_model`].
pub fn m2m() -> Model {
    Model::builder("M2m")
        .field(FieldDef::text("name").unique())
        .natural_key_fields(["name"])
        .lookup_by_natural_key()
        .build()
}

/// `ComplexTestModel`: a foreign key to `Fk` and a relation to `M2m`.
/// Keeps history.
pub fn complex_test_model() -> Model {
    Model::builder("ComplexTestModel")
        .field(FieldDef::text("f1").unique())
        .field(FieldDef::foreign_key("fk", "Fk").nullable())
        .field(FieldDef::many_to_many("m2m", "M2m"))
        .natural_key_fields(["f1"])
        .lookup_by_natural_key()
        .history()
        .build()
}

/// `FallbackNote`: resolves a dangling `Fk` reference to the row named
/// [`FALLBACK_FK`], if the receiving side has one.
pub fn fallback_note() -> Model {
    Model::builder("FallbackNote")
        .field(FieldDef::text("title").unique())
        .field(FieldDef::foreign_key("fk", "Fk"))
        .natural_key_fields(["title"])
        .lookup_by_natural_key()
        .missing_reference(|missing, txn| {
            if missing.model != "Fk" {
                return Ok(None);
            }
            Ok(txn
                .get_by_natural_key("Fk", &NaturalKey::single(FALLBACK_FK))?
                .map(|fk| fk.id()))
        })
        .build()
}

/// `OverwriteModel`: a duplicate insert overwrites and counts as an update.
pub fn overwrite_model() -> Model {
    Model::builder("OverwriteModel")
        .field(FieldDef::text("f1").unique())
        .field(FieldDef::text("f2").nullable())
        .natural_key_fields(["f1"])
        .lookup_by_natural_key()
        .on_duplicate(|_, _| DuplicatePolicy::OverwriteAsUpdate)
        .build()
}

/// `DraftModel`: rows with `draft` set are never published.
pub fn draft_model() -> Model {
    Model::builder("DraftModel")
        .field(FieldDef::text("f1").unique())
        .field(FieldDef::boolean("draft").default_value(false))
        .natural_key_fields(["f1"])
        .lookup_by_natural_key()
        .skip_saving(|entity| entity.get("draft") == Some(&FieldValue::Bool(true)))
        .build()
}

/// A schema with every fixture model and the engine's own models.
pub fn schema() -> Schema {
    let mut schema = Schema::new();
    register_sync_models(&mut schema);
    for model in [
        test_model(),
        test_model_dates(),
        bad_test_model(),
        another_bad_test_model(),
        fk(),
        m2m(),
        complex_test_model(),
        fallback_note(),
        overwrite_model(),
        draft_model(),
    ] {
        schema.register(model);
    }
    schema
}
