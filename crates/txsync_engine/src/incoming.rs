//! The incoming transaction queue.
//!
//! Rows are raw records in the `incoming_transaction` collection of the
//! receiving database, keyed by the id of the outgoing row they copy.

use crate::error::{SyncError, SyncResult};
use crate::transport::CopyReport;
use txsync_core::{Database, EntityId, Transaction};
use txsync_protocol::{IncomingTransaction, TxTimestamp};
use uuid::Uuid;

/// Collection holding incoming rows.
pub const INCOMING_COLLECTION: &str = "incoming_transaction";

/// Access to a database's incoming queue.
#[derive(Debug, Clone, Copy)]
pub struct IncomingQueue<'db> {
    db: &'db Database,
}

impl<'db> IncomingQueue<'db> {
    /// The queue of `db`.
    pub fn new(db: &'db Database) -> Self {
        Self { db }
    }

    /// Adds rows in one transaction, skipping ids already queued.
    pub fn enqueue(&self, rows: &[IncomingTransaction]) -> SyncResult<CopyReport> {
        self.db.transaction(|txn| {
            let mut report = CopyReport::default();
            for row in rows {
                let key = EntityId::from(row.id);
                if txn.get_record(INCOMING_COLLECTION, key).is_some() {
                    report.duplicates += 1;
                    continue;
                }
                txn.put_record(INCOMING_COLLECTION, key, row.encode()?)?;
                report.copied += 1;
            }
            Ok::<_, SyncError>(report)
        })
    }

    /// A row by id.
    pub fn get(&self, id: Uuid) -> SyncResult<Option<IncomingTransaction>> {
        self.db
            .record(INCOMING_COLLECTION, EntityId::from(id))
            .map(|bytes| IncomingTransaction::decode(&bytes))
            .transpose()
            .map_err(Into::into)
    }

    /// Every row, by timestamp then id.
    pub fn all(&self) -> SyncResult<Vec<IncomingTransaction>> {
        let mut rows = self
            .db
            .records(INCOMING_COLLECTION)
            .iter()
            .map(|(_, bytes)| IncomingTransaction::decode(bytes))
            .collect::<Result<Vec<_>, _>>()?;
        rows.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    /// Unconsumed rows, by timestamp then id.
    pub fn pending(&self) -> SyncResult<Vec<IncomingTransaction>> {
        let mut rows = self.all()?;
        rows.retain(|row| !row.is_consumed);
        Ok(rows)
    }

    /// Number of unconsumed rows.
    pub fn pending_count(&self) -> SyncResult<usize> {
        Ok(self.pending()?.len())
    }

    /// Stages `row` as consumed at `at` in `txn`.
    pub fn mark_consumed(
        txn: &mut Transaction<'_>,
        row: &IncomingTransaction,
        at: TxTimestamp,
    ) -> SyncResult<()> {
        let mut row = row.clone();
        row.mark_consumed(at);
        txn.put_record(INCOMING_COLLECTION, EntityId::from(row.id), row.encode()?)?;
        Ok(())
    }

    /// Records a replay failure on a row, leaving it pending.
    pub fn record_error(&self, id: Uuid, message: &str) -> SyncResult<()> {
        self.db.transaction(|txn| {
            let key = EntityId::from(id);
            let Some(bytes) = txn.get_record(INCOMING_COLLECTION, key) else {
                return Ok(());
            };
            let mut row = IncomingTransaction::decode(&bytes)?;
            if row.is_consumed {
                return Ok(());
            }
            row.last_error = Some(message.to_string());
            txn.put_record(INCOMING_COLLECTION, key, row.encode()?)?;
            Ok::<_, SyncError>(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use txsync_core::Schema;
    use txsync_protocol::{Action, OutgoingTransaction};

    fn row(timestamp: &str) -> IncomingTransaction {
        IncomingTransaction::from_outgoing(&OutgoingTransaction::new(
            "TestModel",
            Uuid::new_v4(),
            vec![1, 2, 3],
            TxTimestamp::parse(timestamp).unwrap(),
            "mac2-client",
            Action::Insert,
        ))
    }

    fn database() -> Database {
        Database::open_in_memory("server", Arc::new(Schema::new()))
    }

    #[test]
    fn enqueue_skips_known_ids() {
        let db = database();
        let queue = IncomingQueue::new(&db);
        let rows = vec![row("20240309070503000001"), row("20240309070503000002")];

        let first = queue.enqueue(&rows).unwrap();
        assert_eq!((first.copied, first.duplicates), (2, 0));
        let again = queue.enqueue(&rows).unwrap();
        assert_eq!((again.copied, again.duplicates), (0, 2));
        assert_eq!(queue.all().unwrap().len(), 2);
    }

    #[test]
    fn pending_is_ordered_and_excludes_consumed() {
        let db = database();
        let queue = IncomingQueue::new(&db);
        let late = row("20240309070503000009");
        let early = row("20240309070503000001");
        queue.enqueue(&[late.clone(), early.clone()]).unwrap();

        let pending = queue.pending().unwrap();
        assert_eq!(pending[0].id, early.id);
        assert_eq!(pending[1].id, late.id);

        db.transaction(|txn| {
            IncomingQueue::mark_consumed(txn, &early, TxTimestamp::parse("20240310000000000000").unwrap())
        })
        .unwrap();
        let pending = queue.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, late.id);
        assert!(queue.get(early.id).unwrap().unwrap().consumed_at.is_some());
    }

    #[test]
    fn record_error_keeps_row_pending() {
        let db = database();
        let queue = IncomingQueue::new(&db);
        let pending = row("20240309070503000001");
        queue.enqueue(std::slice::from_ref(&pending)).unwrap();

        queue.record_error(pending.id, "unresolved reference").unwrap();
        let stored = queue.get(pending.id).unwrap().unwrap();
        assert!(!stored.is_consumed);
        assert_eq!(stored.last_error.as_deref(), Some("unresolved reference"));
        assert_eq!(queue.pending_count().unwrap(), 1);
    }
}
