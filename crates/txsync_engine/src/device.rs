//! Device roles.

use serde::{Deserialize, Serialize};

/// Device identifiers that act as servers unless configured otherwise.
pub const DEFAULT_SERVER_IDS: &[&str] = &["99"];

/// Tells the consumer whether this node may replay incoming transactions.
pub trait RoleProvider: Send + Sync {
    /// Whether this node is a server.
    fn is_server(&self) -> bool;

    /// Identifier reported in authorization errors.
    fn device_id(&self) -> &str;
}

/// A device identified by id; servers are recognised by a fixed id list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    device_id: String,
    server_ids: Vec<String>,
}

impl Device {
    /// A device using [`DEFAULT_SERVER_IDS`].
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            server_ids: DEFAULT_SERVER_IDS.iter().map(|id| id.to_string()).collect(),
        }
    }

    /// Replaces the list of server ids.
    #[must_use]
    pub fn with_server_ids<S: Into<String>>(mut self, ids: impl IntoIterator<Item = S>) -> Self {
        self.server_ids = ids.into_iter().map(Into::into).collect();
        self
    }
}

impl RoleProvider for Device {
    fn is_server(&self) -> bool {
        self.server_ids.iter().any(|id| *id == self.device_id)
    }

    fn device_id(&self) -> &str {
        &self.device_id
    }
}
