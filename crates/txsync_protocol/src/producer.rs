//! Producer identity.

use serde::{Deserialize, Serialize};

/// Canonical producer name for a database on a host.
pub fn producer_name(host: &str, database: &str) -> String {
    format!("{host}-{database}")
}

/// A node/database pair that emits transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerRecord {
    /// `"{host}-{database}"`; unique.
    pub name: String,
    /// `"http://{host}/"`.
    pub url: String,
    /// Whether the producer is live.
    pub is_active: bool,
    /// Name of the database on the producing host.
    pub settings_key: String,
}

impl ProducerRecord {
    /// The record for `database` on `host`.
    pub fn for_database(host: &str, database: &str) -> Self {
        Self {
            name: producer_name(host, database),
            url: format!("http://{host}/"),
            is_active: true,
            settings_key: database.to_string(),
        }
    }

    /// Whether `name` is the producer of one of `databases` on `host`.
    ///
    /// Host and database names may both contain `-`, so a name is never
    /// split; it must equal one of the names the pairs produce.
    pub fn is_on_host<S: AsRef<str>>(name: &str, host: &str, databases: &[S]) -> bool {
        databases
            .iter()
            .any(|database| producer_name(host, database.as_ref()) == name)
    }
}
