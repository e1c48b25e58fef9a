//! The cipher capability used for snapshot payloads.

use super::key::{CryptoManager, EncryptionKey};
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Encryption algorithm selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum Algorithm {
    /// AES-256-GCM.
    #[default]
    Aes,
}

impl Algorithm {
    /// Configuration name of the algorithm.
    pub const fn as_str(self) -> &'static str {
        match self {
            Algorithm::Aes => "aes",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aes" => Ok(Algorithm::Aes),
            other => Err(CoreError::UnsupportedAlgorithm {
                name: other.to_string(),
            }),
        }
    }
}

/// Symmetric encryption of opaque payloads under a named keyring.
///
/// Implementations must be deterministic in their key choice: a payload
/// encrypted on one node decrypts on any node configured with the same
/// keyring.
pub trait Cipher: Send + Sync {
    /// Encrypts `plaintext`.
    fn encrypt(&self, plaintext: &[u8], algorithm: Algorithm, keyring: &str) -> CoreResult<Vec<u8>>;

    /// Decrypts a payload produced by [`Cipher::encrypt`].
    fn decrypt(&self, ciphertext: &[u8], algorithm: Algorithm, keyring: &str) -> CoreResult<Vec<u8>>;
}

/// [`Cipher`] holding one AES-256-GCM key per keyring.
///
/// The keyring name is bound as associated data, so a payload cannot be
/// opened under a different keyring even if the keys happen to match.
#[derive(Default)]
pub struct KeyringCipher {
    keyrings: HashMap<String, CryptoManager>,
}

impl KeyringCipher {
    /// Creates a cipher with no keyrings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the key for `keyring`.
    #[must_use]
    pub fn with_key(mut self, keyring: impl Into<String>, key: &EncryptionKey) -> Self {
        self.keyrings.insert(keyring.into(), CryptoManager::new(key));
        self
    }

    /// Derives and installs keys for `keyrings` from a shared secret.
    pub fn from_secret<'a>(
        secret: &[u8],
        keyrings: impl IntoIterator<Item = &'a str>,
    ) -> CoreResult<Self> {
        let mut cipher = Self::new();
        for name in keyrings {
            let key = EncryptionKey::derive(secret, name)?;
            cipher = cipher.with_key(name, &key);
        }
        Ok(cipher)
    }

    fn keyring(&self, name: &str) -> CoreResult<&CryptoManager> {
        self.keyrings
            .get(name)
            .ok_or_else(|| CoreError::UnknownKeyring {
                name: name.to_string(),
            })
    }
}

impl Cipher for KeyringCipher {
    fn encrypt(&self, plaintext: &[u8], algorithm: Algorithm, keyring: &str) -> CoreResult<Vec<u8>> {
        match algorithm {
            Algorithm::Aes => self.keyring(keyring)?.seal(plaintext, keyring.as_bytes()),
        }
    }

    fn decrypt(&self, ciphertext: &[u8], algorithm: Algorithm, keyring: &str) -> CoreResult<Vec<u8>> {
        match algorithm {
            Algorithm::Aes => self.keyring(keyring)?.open(ciphertext, keyring.as_bytes()),
        }
    }
}

impl fmt::Debug for KeyringCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.keyrings.keys().collect();
        names.sort();
        f.debug_struct("KeyringCipher")
            .field("keyrings", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peers_sharing_a_secret_interoperate() {
        let client = KeyringCipher::from_secret(b"shared", ["local"]).unwrap();
        let server = KeyringCipher::from_secret(b"shared", ["local"]).unwrap();
        let sealed = client.encrypt(b"payload", Algorithm::Aes, "local").unwrap();
        assert_eq!(
            server.decrypt(&sealed, Algorithm::Aes, "local").unwrap(),
            b"payload"
        );
    }

    #[test]
    fn unknown_keyring_is_an_error() {
        let cipher = KeyringCipher::from_secret(b"shared", ["local"]).unwrap();
        assert!(matches!(
            cipher.encrypt(b"x", Algorithm::Aes, "restricted"),
            Err(CoreError::UnknownKeyring { .. })
        ));
    }

    #[test]
    fn keyring_is_bound_to_the_payload() {
        let key = EncryptionKey::generate();
        let cipher = KeyringCipher::new()
            .with_key("local", &key)
            .with_key("restricted", &key);
        let sealed = cipher.encrypt(b"x", Algorithm::Aes, "local").unwrap();
        assert!(cipher.decrypt(&sealed, Algorithm::Aes, "restricted").is_err());
    }

    #[test]
    fn algorithm_names() {
        assert_eq!("aes".parse::<Algorithm>().unwrap(), Algorithm::Aes);
        assert!("rsa".parse::<Algorithm>().is_err());
    }

    proptest::proptest! {
        #[test]
        fn sealed_payloads_open(payload in proptest::collection::vec(proptest::num::u8::ANY, 0..512)) {
            let cipher = KeyringCipher::from_secret(b"shared", ["local"]).unwrap();
            let sealed = cipher.encrypt(&payload, Algorithm::Aes, "local").unwrap();
            proptest::prop_assert_ne!(&sealed, &payload);
            proptest::prop_assert_eq!(cipher.decrypt(&sealed, Algorithm::Aes, "local").unwrap(), payload);
        }
    }
}
