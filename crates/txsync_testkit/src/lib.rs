//! # txsync testkit
//!
//! Test utilities for txsync.
//!
//! This crate provides:
//! - Fixture models covering every entity capability
//! - A client/server/default database fixture sharing one publisher
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use txsync_testkit::prelude::*;
//!
//! #[test]
//! fn replays_on_server() {
//!     let fixture = SyncFixture::new();
//!     fixture.client.create("TestModel", [("f1", "erik")]).unwrap();
//!     let results = fixture.sync();
//!     assert_eq!(totals(&results), (3, 0, 0));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod models;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::models::*;
}

pub use fixtures::*;
pub use generators::*;
pub use models::*;
