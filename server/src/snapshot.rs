//! Parallel export of the grid to a text snapshot
//!
//! Every grid row becomes exactly one line listing its occupied cells as
//! `(row,col):value`, separated by single spaces in increasing column order.
//! Empty rows produce empty lines.
//!
//! Rows are formatted by worker tasks, at most `workers` of them in flight at
//! once. Each worker owns an `Arc` of the snapshot and its row index. The
//! finished lines are appended to the target file in row order by a single
//! writer, so concurrent workers never interleave inside the file.

use crate::error::ExportError;
use crate::grid::GridSnapshot;
use log::debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Semaphore;

/// Counts reported after a successful export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
    pub rows: usize,
    pub occupied_cells: usize,
    pub bytes_written: u64,
}

pub struct SnapshotExporter {
    path: PathBuf,
    workers: usize,
}

impl SnapshotExporter {
    pub fn new(path: impl AsRef<Path>, workers: usize) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            workers: workers.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `snapshot` to the target file, replacing any previous content.
    ///
    /// Returns once every row worker has finished and the file is synced.
    pub async fn export(&self, snapshot: GridSnapshot) -> Result<ExportSummary, ExportError> {
        let file = File::create(&self.path).await?;
        let snapshot = Arc::new(snapshot);
        let pool = Arc::new(Semaphore::new(self.workers));

        let mut rows = Vec::with_capacity(snapshot.size());
        for row in 0..snapshot.size() {
            // Waits for a free pool slot before starting the next row
            let permit = Arc::clone(&pool)
                .acquire_owned()
                .await
                .map_err(|e| ExportError::WorkerFailed(e.to_string()))?;
            let snapshot = Arc::clone(&snapshot);

            rows.push(tokio::spawn(async move {
                let line = format_row(&snapshot, row);
                drop(permit);
                line
            }));
        }

        let mut writer = BufWriter::new(file);
        let mut bytes_written = 0u64;
        for (row, handle) in rows.into_iter().enumerate() {
            let line = handle
                .await
                .map_err(|e| ExportError::WorkerFailed(format!("row {}: {}", row, e)))?;
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            bytes_written += line.len() as u64 + 1;
        }
        writer.flush().await?;
        writer.get_ref().sync_all().await?;

        let summary = ExportSummary {
            rows: snapshot.size(),
            occupied_cells: snapshot.occupied_count(),
            bytes_written,
        };
        debug!("Exported snapshot to {}: {:?}", self.path.display(), summary);
        Ok(summary)
    }
}

/// Formats one row as `(row,col):value` entries joined by spaces
pub fn format_row(snapshot: &GridSnapshot, row: usize) -> String {
    snapshot
        .occupied_in_row(row)
        .map(|(position, cell)| format!("{}:{}", position, cell as char))
        .collect::<Vec<_>>()
        .join(" ")
}
