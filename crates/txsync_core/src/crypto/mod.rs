//! Payload encryption.
//!
//! Snapshots leave a database only in encrypted form. The engine talks to a
//! [`Cipher`]; [`KeyringCipher`] is the stock implementation.
//!
//! ## Security Model
//!
//! - AES-256-GCM authenticated encryption
//! - Fresh random nonce per payload
//! - Keys are zeroized on drop
//! - Keyring keys are derived from a shared secret with HKDF-SHA256, so they
//!   do not depend on which database encrypts

mod cipher;
mod key;

pub use cipher::{Algorithm, Cipher, KeyringCipher};
pub use key::{CryptoManager, EncryptionKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
