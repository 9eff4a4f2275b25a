//! Session counting and the threshold-triggered snapshot + renew
//!
//! Every finished session reports to the [`SessionCoordinator`] exactly once.
//! When the count reaches the configured threshold the coordinator exports a
//! snapshot of the grid, renews the grid and resets the count. Increment,
//! threshold check and the triggered work all run under one lock, so only a
//! single session can ever perform a given flush.

use crate::error::{ExportError, GridError};
use crate::grid::GridStore;
use crate::snapshot::{ExportSummary, SnapshotExporter};
use log::{error, info};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// What happened when a session was reported complete
#[derive(Debug)]
pub enum SessionOutcome {
    /// Below threshold; `completed` sessions counted since the last flush
    Counted { completed: usize },
    /// Threshold reached; the grid was exported (or the export failed) and renewed
    Flushed {
        export: Result<ExportSummary, ExportError>,
    },
}

pub struct SessionCoordinator {
    store: Arc<GridStore>,
    exporter: SnapshotExporter,
    threshold: usize,
    completed: Mutex<usize>,
    flushes: AtomicU64,
}

impl SessionCoordinator {
    pub fn new(store: Arc<GridStore>, exporter: SnapshotExporter, threshold: usize) -> Self {
        Self {
            store,
            exporter,
            threshold: threshold.max(1),
            completed: Mutex::new(0),
            flushes: AtomicU64::new(0),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Number of threshold flushes performed so far
    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Sessions counted since the last flush
    pub async fn completed_sessions(&self) -> usize {
        *self.completed.lock().await
    }

    /// Records one finished session and flushes when the threshold is hit.
    ///
    /// A failed export is logged and reported in the outcome; the grid is
    /// renewed regardless. The count is reset before any flush work starts.
    /// A grid that cannot be copied or renewed is returned as an error and
    /// the flush is not counted.
    pub async fn session_completed(&self) -> Result<SessionOutcome, GridError> {
        let mut completed = self.completed.lock().await;
        *completed += 1;

        if *completed < self.threshold {
            return Ok(SessionOutcome::Counted {
                completed: *completed,
            });
        }

        info!(
            "{} sessions completed, exporting snapshot to {}",
            *completed,
            self.exporter.path().display()
        );
        *completed = 0;

        let snapshot = self.store.blocking(GridStore::snapshot).await??;
        let export = self.exporter.export(snapshot).await;
        match &export {
            Ok(summary) => info!(
                "Snapshot written: {} rows, {} occupied cells, {} bytes",
                summary.rows, summary.occupied_cells, summary.bytes_written
            ),
            Err(e) => error!("Snapshot export failed, renewing grid anyway: {}", e),
        }

        self.store.blocking(GridStore::renew).await??;
        self.flushes.fetch_add(1, Ordering::Relaxed);

        Ok(SessionOutcome::Flushed { export })
    }
}
