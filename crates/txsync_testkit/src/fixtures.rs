//! Client/server fixtures.
//!
//! A [`SyncFixture`] holds three databases sharing the fixture schema:
//! `client` and `server` publish through one [`SyncPublisher`], `default`
//! is the local default database and never publishes.

use crate::models::schema;
use std::sync::Arc;
use txsync_core::crypto::{Cipher, KeyringCipher};
use txsync_core::{Database, DEFAULT_DATABASE};
use txsync_engine::{
    CopyReport, Deserializer, Device, IncomingQueue, LocalTransport, OutgoingLog, RoleProvider,
    SyncConfig, SyncPublisher, Transport, DEFAULT_KEYRING,
};
use txsync_protocol::{Action, DeserializationResult, OutgoingTransaction};

/// Secret every fixture cipher derives its keys from.
pub const SHARED_SECRET: &[u8] = b"txsync testkit shared secret";

/// Host name used by fixture publishers.
pub const TEST_HOST: &str = "testhost";

/// Device id recognised as a server.
pub const SERVER_DEVICE_ID: &str = "99";

/// Device id of an ordinary client.
pub const CLIENT_DEVICE_ID: &str = "10";

/// A cipher with the default keyring derived from [`SHARED_SECRET`].
pub fn test_cipher() -> Arc<dyn Cipher> {
    Arc::new(
        KeyringCipher::from_secret(SHARED_SECRET, [DEFAULT_KEYRING])
            .expect("Failed to derive test keyring"),
    )
}

/// The default fixture configuration.
pub fn test_config() -> SyncConfig {
    SyncConfig::new().with_hostname(TEST_HOST)
}

/// Three databases and the publisher attached to them.
pub struct SyncFixture {
    /// Publishing client database.
    pub client: Arc<Database>,
    /// Publishing server database; replays land here.
    pub server: Arc<Database>,
    /// The local default database.
    pub default: Arc<Database>,
    /// Publisher attached to all three.
    pub publisher: Arc<SyncPublisher>,
}

impl SyncFixture {
    /// A fixture with [`test_config`].
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// A fixture with the given configuration.
    pub fn with_config(config: SyncConfig) -> Self {
        let schema = Arc::new(schema());
        let publisher = Arc::new(SyncPublisher::new(config, test_cipher()));
        let open = |name: &str| {
            let db = Arc::new(Database::open_in_memory(name, Arc::clone(&schema)));
            publisher.attach(&db);
            db
        };
        let client = open("client");
        let server = open("server");
        let default = open(DEFAULT_DATABASE);
        Self {
            client,
            server,
            default,
            publisher,
        }
    }

    /// The server role.
    pub fn server_device() -> Arc<dyn RoleProvider> {
        Arc::new(Device::new(SERVER_DEVICE_ID))
    }

    /// A non-server role.
    pub fn client_device() -> Arc<dyn RoleProvider> {
        Arc::new(Device::new(CLIENT_DEVICE_ID))
    }

    /// A deserializer acting as the server.
    pub fn deserializer(&self) -> Deserializer {
        self.deserializer_as(Self::server_device())
    }

    /// A deserializer acting as `role`.
    pub fn deserializer_as(&self, role: Arc<dyn RoleProvider>) -> Deserializer {
        Deserializer::new(self.publisher.serializer().clone(), role)
    }

    /// Copies every client row not yet sent to the server.
    pub fn copy_to_server(&self) -> CopyReport {
        LocalTransport
            .copy_unsent(&self.client, &self.server)
            .expect("Failed to copy to server")
    }

    /// Replays the server's pending rows as the server.
    pub fn consume(&self) -> Vec<DeserializationResult> {
        self.deserializer()
            .deserialize(&self.server)
            .expect("Failed to deserialize")
    }

    /// Copies to the server and replays.
    pub fn sync(&self) -> Vec<DeserializationResult> {
        self.copy_to_server();
        self.consume()
    }

    /// Number of unconsumed rows on the server.
    pub fn server_pending(&self) -> usize {
        IncomingQueue::new(&self.server)
            .pending_count()
            .expect("Failed to read incoming queue")
    }
}

impl Default for SyncFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// The outgoing rows of `db`, in order.
pub fn outgoing(db: &Database) -> Vec<OutgoingTransaction> {
    OutgoingLog::new(db)
        .all()
        .expect("Failed to read outgoing log")
}

/// Model names of the outgoing rows of `db`, in order, optionally limited to
/// one action.
pub fn outgoing_names(db: &Database, action: Option<Action>) -> Vec<String> {
    outgoing(db)
        .into_iter()
        .filter(|row| action.map_or(true, |a| row.action == a))
        .map(|row| row.tx_name)
        .collect()
}

/// `(inserted, updated, deleted)` summed over `results`.
pub fn totals(results: &[DeserializationResult]) -> (usize, usize, usize) {
    results.iter().fold((0, 0, 0), |(i, u, d), r| {
        (i + r.inserted, u + r.updated, d + r.deleted)
    })
}

/// The result for `tx_name`, if the batch touched it.
pub fn result_for<'a>(
    results: &'a [DeserializationResult],
    tx_name: &str,
) -> Option<&'a DeserializationResult> {
    results.iter().find(|r| r.tx_name == tx_name)
}
