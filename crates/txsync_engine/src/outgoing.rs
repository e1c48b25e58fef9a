//! The outgoing transaction log.
//!
//! Rows are raw records in the `outgoing_transaction` collection of the
//! database that produced them, keyed by row id.

use crate::error::{SyncError, SyncResult};
use txsync_core::{Database, EntityId, Transaction};
use txsync_protocol::OutgoingTransaction;
use uuid::Uuid;

/// Collection holding outgoing rows.
pub const OUTGOING_COLLECTION: &str = "outgoing_transaction";

/// Read and bookkeeping access to a database's outgoing log.
#[derive(Debug, Clone, Copy)]
pub struct OutgoingLog<'db> {
    db: &'db Database,
}

impl<'db> OutgoingLog<'db> {
    /// The log of `db`.
    pub fn new(db: &'db Database) -> Self {
        Self { db }
    }

    /// Stages `row` in `txn`.
    pub fn append(txn: &mut Transaction<'_>, row: &OutgoingTransaction) -> SyncResult<()> {
        txn.put_record(OUTGOING_COLLECTION, EntityId::from(row.id), row.encode()?)?;
        Ok(())
    }

    /// Every row, by timestamp then id.
    pub fn all(&self) -> SyncResult<Vec<OutgoingTransaction>> {
        let mut rows = self
            .db
            .records(OUTGOING_COLLECTION)
            .iter()
            .map(|(_, bytes)| OutgoingTransaction::decode(bytes))
            .collect::<Result<Vec<_>, _>>()?;
        rows.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    /// Rows not yet delivered to `peer`, in order.
    pub fn unsent_to(&self, peer: &str) -> SyncResult<Vec<OutgoingTransaction>> {
        let mut rows = self.all()?;
        rows.retain(|row| !row.is_consumed_by(peer));
        Ok(rows)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.db.records(OUTGOING_COLLECTION).len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flags the given rows as delivered to `peer`. Unknown ids are ignored.
    ///
    /// Returns the number of rows flagged.
    pub fn mark_sent(&self, ids: &[Uuid], peer: &str) -> SyncResult<usize> {
        self.db.transaction(|txn| {
            let mut marked = 0;
            for id in ids {
                let key = EntityId::from(*id);
                let Some(bytes) = txn.get_record(OUTGOING_COLLECTION, key) else {
                    continue;
                };
                let mut row = OutgoingTransaction::decode(&bytes)?;
                row.mark_consumed_by(peer);
                txn.put_record(OUTGOING_COLLECTION, key, row.encode()?)?;
                marked += 1;
            }
            Ok::<_, SyncError>(marked)
        })
    }
}
