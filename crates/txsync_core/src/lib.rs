//! # txsync core
//!
//! The persistence side of txsync.
//!
//! This crate provides:
//! - Models, the entity capability contract and replay hooks
//! - Named in-memory databases with optimistic transactions
//! - Write hooks that run inside the writing transaction
//! - Audit history counterparts for models that keep history
//! - The cipher capability used to encrypt snapshots

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crypto;
mod database;
mod entity;
mod error;
pub mod history;
mod hooks;
mod model;
mod schema;
mod transaction;
mod types;

pub use database::{Database, DEFAULT_DATABASE};
pub use entity::{Entity, EntityId, EntityRef, FieldValue, Fields, NaturalKey};
pub use error::{CoreError, CoreResult};
pub use hooks::{SaveOptions, WriteAction, WriteEvent, WriteHook};
pub use model::{
    DuplicatePolicy, FieldDef, FieldKind, FieldNaturalKey, IndexedLookup, MissingReference,
    Model, ModelBuilder, NaturalKeyLookup, NaturalKeySource,
};
pub use schema::Schema;
pub use transaction::{PendingWrite, Transaction, TransactionState};
pub use types::{SequenceNumber, TransactionId};
