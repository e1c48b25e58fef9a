//! Configuration for the sync engine.

use serde::{Deserialize, Serialize};
use txsync_core::crypto::Algorithm;

/// Name of the default keyring.
pub const DEFAULT_KEYRING: &str = "local";

fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Configuration for publishing and replay.
///
/// Every field has a default, so a partial document deserializes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Global switch for publishing entity writes.
    pub allow_model_serialization: bool,
    /// Switch for publishing audit counterpart rows.
    pub allow_audit_trail_serialization: bool,
    /// Host part of producer names.
    pub hostname: String,
    /// Snapshot encryption algorithm.
    pub algorithm: Algorithm,
    /// Keyring used for snapshots.
    pub keyring: String,
}

impl SyncConfig {
    /// Creates a configuration with defaults for this host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the global serialization switch.
    pub fn with_model_serialization(mut self, enabled: bool) -> Self {
        self.allow_model_serialization = enabled;
        self
    }

    /// Sets the audit serialization switch.
    pub fn with_audit_trail_serialization(mut self, enabled: bool) -> Self {
        self.allow_audit_trail_serialization = enabled;
        self
    }

    /// Sets the host name.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Sets the encryption algorithm.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Sets the keyring.
    pub fn with_keyring(mut self, keyring: impl Into<String>) -> Self {
        self.keyring = keyring.into();
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            allow_model_serialization: true,
            allow_audit_trail_serialization: true,
            hostname: local_hostname(),
            algorithm: Algorithm::Aes,
            keyring: DEFAULT_KEYRING.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_everything() {
        let config = SyncConfig::new();
        assert!(config.allow_model_serialization);
        assert!(config.allow_audit_trail_serialization);
        assert!(!config.hostname.is_empty());
        assert_eq!(config.algorithm, Algorithm::Aes);
        assert_eq!(config.keyring, "local");
    }

    #[test]
    fn builder() {
        let config = SyncConfig::new()
            .with_model_serialization(false)
            .with_audit_trail_serialization(false)
            .with_hostname("mac2")
            .with_keyring("restricted");
        assert!(!config.allow_model_serialization);
        assert!(!config.allow_audit_trail_serialization);
        assert_eq!(config.hostname, "mac2");
        assert_eq!(config.keyring, "restricted");
    }

    #[test]
    fn partial_document_uses_defaults() {
        let config: SyncConfig =
            serde_json::from_str(r#"{"allow_model_serialization": false, "algorithm": "aes"}"#)
                .unwrap();
        assert!(!config.allow_model_serialization);
        assert!(config.allow_audit_trail_serialization);
        assert_eq!(config.keyring, "local");
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        let result: Result<SyncConfig, _> = serde_json::from_str(r#"{"algorithm": "rot13"}"#);
        assert!(result.is_err());
    }
}
