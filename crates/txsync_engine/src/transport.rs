//! Transport layer abstraction.

use crate::error::SyncResult;
use crate::incoming::IncomingQueue;
use crate::outgoing::OutgoingLog;
use tracing::info;
use txsync_core::Database;
use txsync_protocol::{IncomingTransaction, OutgoingTransaction};
use uuid::Uuid;

/// Outcome of one copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CopyReport {
    /// Rows newly queued at the peer.
    pub copied: usize,
    /// Rows the peer already had.
    pub duplicates: usize,
}

/// Moves outgoing rows into a peer's incoming queue.
///
/// After a successful copy every source row is flagged as delivered to the
/// peer, so it is not selected again.
pub trait Transport: Send + Sync {
    /// Copies `rows` from `source` into the incoming queue of `peer`.
    fn copy_to_incoming(
        &self,
        source: &Database,
        rows: &[OutgoingTransaction],
        peer: &Database,
    ) -> SyncResult<CopyReport>;

    /// Copies every row of `source` not yet delivered to `peer`.
    fn copy_unsent(&self, source: &Database, peer: &Database) -> SyncResult<CopyReport> {
        let rows = OutgoingLog::new(source).unsent_to(peer.name())?;
        self.copy_to_incoming(source, &rows, peer)
    }
}

/// Transport between two databases in the same process.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTransport;

impl Transport for LocalTransport {
    fn copy_to_incoming(
        &self,
        source: &Database,
        rows: &[OutgoingTransaction],
        peer: &Database,
    ) -> SyncResult<CopyReport> {
        if rows.is_empty() {
            return Ok(CopyReport::default());
        }
        let incoming: Vec<IncomingTransaction> =
            rows.iter().map(IncomingTransaction::from_outgoing).collect();
        let report = IncomingQueue::new(peer).enqueue(&incoming)?;

        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        OutgoingLog::new(source).mark_sent(&ids, peer.name())?;
        info!(
            source = source.name(),
            peer = peer.name(),
            copied = report.copied,
            duplicates = report.duplicates,
            "copied transactions"
        );
        Ok(report)
    }
}
