//! Audit history.
//!
//! Every non-raw write of a model declared with `history()` appends a row to
//! the audit counterpart `"{Model}Audit"` in the same transaction. Audit rows
//! are ordinary entities of a syncable model, so publishers see them too.

use crate::entity::{EntityId, FieldValue, Fields};
use crate::error::CoreResult;
use crate::hooks::{SaveOptions, WriteAction, WriteEvent};
use crate::model::{FieldDef, Model};
use crate::transaction::Transaction;
use chrono::Utc;

/// Suffix of audit counterpart model names.
pub const AUDIT_SUFFIX: &str = "Audit";

/// Identifier of the audit row; also its natural key.
pub const HISTORY_ID: &str = "history_id";
/// When the audited write happened.
pub const HISTORY_DATE: &str = "history_date";
/// `+` for inserts, `~` for updates, `-` for deletes.
pub const HISTORY_TYPE: &str = "history_type";
/// Identifier of the audited entity.
pub const HISTORY_OBJECT_ID: &str = "history_object_id";

/// Name of the audit counterpart of `model`.
pub fn audit_model_name(model: &str) -> String {
    format!("{model}{AUDIT_SUFFIX}")
}

fn history_type(action: WriteAction) -> &'static str {
    match action {
        WriteAction::Insert => "+",
        WriteAction::Update => "~",
        WriteAction::Delete => "-",
    }
}

pub(crate) fn audit_model(source: &Model) -> Model {
    let mut builder = Model::builder(audit_model_name(source.name())).audit_of(source.name());
    for def in source.fields() {
        builder = builder.field(def.relaxed());
    }
    builder
        .field(FieldDef::text(HISTORY_ID).unique())
        .field(FieldDef::datetime(HISTORY_DATE))
        .field(FieldDef::text(HISTORY_TYPE))
        .field(FieldDef::text(HISTORY_OBJECT_ID))
        .natural_key_fields([HISTORY_ID])
        .lookup_by_natural_key()
        .build()
}

pub(crate) fn record(txn: &mut Transaction<'_>, event: &WriteEvent) -> CoreResult<()> {
    if event.options.raw || !event.model.has_history() {
        return Ok(());
    }
    let audit = txn
        .database()
        .schema()
        .get(&audit_model_name(event.model.name()))?;

    let history_id = EntityId::new();
    let mut values: Fields = event.entity.fields().clone();
    values.insert(HISTORY_ID.into(), FieldValue::Text(history_id.to_string()));
    values.insert(HISTORY_DATE.into(), FieldValue::DateTime(Utc::now()));
    values.insert(HISTORY_TYPE.into(), history_type(event.action).into());
    values.insert(
        HISTORY_OBJECT_ID.into(),
        FieldValue::Text(event.entity.id().to_string()),
    );

    let row = audit.instantiate_with_id(history_id, values)?;
    txn.save_with(
        &row,
        SaveOptions {
            raw: false,
            publish: event.options.publish,
        },
    )?;
    Ok(())
}
