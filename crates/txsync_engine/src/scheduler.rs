//! Periodic replay.

use crate::consumer::Deserializer;
use crate::error::{SyncError, SyncResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{self, JoinHandle};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};
use txsync_core::Database;
use txsync_protocol::DeserializationResult;

/// Default time between runs.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Totals accumulated by a [`ConsumerLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopStats {
    /// Completed runs.
    pub runs: u64,
    /// Runs that failed as a whole.
    pub failed_runs: u64,
    /// Entities created.
    pub inserted: usize,
    /// Entities changed.
    pub updated: usize,
    /// Entities removed.
    pub deleted: usize,
    /// Rows left pending.
    pub failed_rows: usize,
}

impl LoopStats {
    fn absorb(&mut self, results: &[DeserializationResult]) {
        for result in results {
            self.inserted += result.inserted;
            self.updated += result.updated;
            self.deleted += result.deleted;
            self.failed_rows += result.errors.len();
        }
    }
}

/// Runs a [`Deserializer`] against one database on a fixed interval.
///
/// One loop is one runner: runs never overlap.
#[derive(Debug)]
pub struct ConsumerLoop {
    deserializer: Arc<Deserializer>,
    db: Arc<Database>,
    period: Duration,
}

impl ConsumerLoop {
    /// Creates a loop with [`DEFAULT_INTERVAL`].
    pub fn new(deserializer: Arc<Deserializer>, db: Arc<Database>) -> Self {
        Self {
            deserializer,
            db,
            period: DEFAULT_INTERVAL,
        }
    }

    /// Sets the time between runs.
    #[must_use]
    pub fn with_interval(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Starts the loop on the current tokio runtime. The first run starts
    /// immediately.
    pub fn spawn(self) -> ConsumerHandle {
        let (shutdown, signal) = watch::channel(false);
        let task = tokio::spawn(self.run(signal));
        ConsumerHandle { shutdown, task }
    }

    /// One batch on the blocking pool; replay takes locks and decrypts.
    async fn run_once(&self) -> SyncResult<Vec<DeserializationResult>> {
        let deserializer = Arc::clone(&self.deserializer);
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || deserializer.deserialize(&db))
            .await
            .map_err(|e| SyncError::Task(e.to_string()))?
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) -> LoopStats {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stats = LoopStats::default();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(results) => stats.absorb(&results),
                        Err(err) => {
                            warn!(database = self.db.name(), %err, "consumer run failed");
                            stats.failed_runs += 1;
                        }
                    }
                    stats.runs += 1;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(
            database = self.db.name(),
            runs = stats.runs,
            inserted = stats.inserted,
            updated = stats.updated,
            deleted = stats.deleted,
            "consumer loop stopped"
        );
        stats
    }
}

/// Handle to a running [`ConsumerLoop`].
#[derive(Debug)]
pub struct ConsumerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<LoopStats>,
}

impl ConsumerHandle {
    /// Stops the loop after the current run and returns its totals.
    pub async fn shutdown(self) -> SyncResult<LoopStats> {
        // The loop may already have exited; that is not an error.
        let _ = self.shutdown.send(true);
        self.task
            .await
            .map_err(|e| SyncError::Task(e.to_string()))
    }

    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
