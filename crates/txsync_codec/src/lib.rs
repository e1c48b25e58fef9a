//! # txsync codec
//!
//! Canonical CBOR for everything txsync persists or ships: log rows,
//! entity snapshots and incoming queue entries.
//!
//! ## Canonical CBOR Rules
//!
//! - Map keys sorted by encoded length, then bytewise
//! - Integers use shortest encoding
//! - No floats, no tags
//! - No indefinite-length items
//!
//! ## Usage
//!
//! ```
//! use txsync_codec::{to_canonical_cbor, from_cbor, Value};
//!
//! let value = Value::text_map([("action", Value::from("I"))]);
//! let bytes = to_canonical_cbor(&value).unwrap();
//! assert_eq!(from_cbor(&bytes).unwrap(), value);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod value;

pub use decoder::{from_cbor, CanonicalDecoder};
pub use encoder::{to_canonical_cbor, CanonicalEncoder};
pub use error::{CodecError, CodecResult};
pub use value::Value;

/// Types with a canonical CBOR representation.
pub trait Encode {
    /// Encode this value to canonical CBOR bytes.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Types that can be rebuilt from CBOR.
pub trait Decode: Sized {
    /// Decode this value from CBOR bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl Encode for Value {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_canonical_cbor(self)
    }
}

impl Decode for Value {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}
