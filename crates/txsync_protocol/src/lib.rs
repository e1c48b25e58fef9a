//! # txsync protocol
//!
//! Transaction rows and their CBOR codecs.
//!
//! This crate provides:
//! - `Action` and the 20-digit `TxTimestamp` with its monotonic clock
//! - `OutgoingTransaction` / `IncomingTransaction` log rows
//! - `Snapshot`, the plaintext form of an encrypted entity payload
//! - `ProducerRecord` and `DeserializationResult`
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod action;
mod error;
mod producer;
mod result;
mod snapshot;
mod timestamp;
mod transaction;

pub use action::Action;
pub use error::{ProtocolError, ProtocolResult};
pub use producer::{producer_name, ProducerRecord};
pub use result::{DeserializationResult, RowError};
pub use snapshot::{RefKey, Snapshot, SnapshotValue};
pub use timestamp::{TimestampClock, TxTimestamp, TIMESTAMP_FORMAT};
pub use transaction::{IncomingTransaction, OutgoingTransaction};
