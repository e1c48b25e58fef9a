//! # txsync engine
//!
//! Transaction synchronization between independently-operated databases.
//!
//! This crate provides:
//! - [`SyncPublisher`], a write hook that records every published write as an
//!   encrypted outgoing transaction
//! - The producer registry and the `Producer` model
//! - Outgoing log and incoming queue access
//! - [`LocalTransport`] for copying rows between databases
//! - [`Deserializer`], the role-gated, idempotent replay of incoming rows
//! - [`ConsumerLoop`] for periodic replay on a tokio runtime
//!
//! ## Flow
//!
//! 1. A write in a non-default database fires the publisher, which ensures
//!    the producer, snapshots and encrypts the entity, and stages one
//!    outgoing row in the writing transaction.
//! 2. A transport copies rows not yet delivered to a peer into the peer's
//!    incoming queue and flags them as delivered.
//! 3. On a server, the deserializer replays pending rows oldest first,
//!    locating entities by natural key, and marks each row consumed in the
//!    transaction that applies it.
//!
//! ## Key Invariants
//!
//! - At most one outgoing row per published write
//! - Timestamps from one publisher strictly increase
//! - A consumed row is never replayed again
//! - Only servers replay

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod consumer;
mod device;
mod error;
mod incoming;
mod outgoing;
mod publisher;
mod registry;
mod scheduler;
mod snapshot;
mod transport;

pub use config::{SyncConfig, DEFAULT_KEYRING};
pub use consumer::Deserializer;
pub use device::{Device, RoleProvider, DEFAULT_SERVER_IDS};
pub use error::{SyncError, SyncResult};
pub use incoming::{IncomingQueue, INCOMING_COLLECTION};
pub use outgoing::{OutgoingLog, OUTGOING_COLLECTION};
pub use publisher::SyncPublisher;
pub use registry::{producer_model, register_sync_models, ProducerRegistry, PRODUCER_MODEL};
pub use scheduler::{ConsumerHandle, ConsumerLoop, LoopStats, DEFAULT_INTERVAL};
pub use snapshot::{SnapshotSerializer, DATE_FORMAT};
pub use transport::{CopyReport, LocalTransport, Transport};
