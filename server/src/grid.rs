//! File-backed shared character grid
//!
//! The grid is an N x N matrix of single-byte cells held in memory and written
//! through to a backing file of exactly N * N bytes after every mutation. A
//! zero byte marks an empty cell.
//!
//! All operations take the same grid-wide lock, so writes and reads from
//! different sessions are totally ordered by lock acquisition: once a
//! `write` returns, every later `read` observes it.
//!
//! A renew that fails leaves the store without a backing file. Every
//! operation then fails with [`GridError::Unavailable`] until a later renew
//! succeeds.

use crate::error::GridError;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use shared::{is_placeable, Direction, Position, EMPTY_CELL};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// In-memory cells plus the file they mirror
struct Backing {
    cells: Vec<u8>,
    file: File,
}

impl Backing {
    fn persist(&mut self) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&self.cells)
    }
}

/// The shared grid store
pub struct GridStore {
    path: PathBuf,
    size: usize,
    len: usize,
    backing: Mutex<Option<Backing>>,
}

impl GridStore {
    /// Opens the grid backed by `path`.
    ///
    /// An existing file of exactly `size * size` bytes holding only empty or
    /// printable cells is loaded as-is. A missing file, one of any other
    /// length, or one with foreign bytes is initialized to all-empty.
    pub fn open(path: impl AsRef<Path>, size: usize) -> Result<Self, GridError> {
        let path = path.as_ref().to_path_buf();
        let len = size.checked_mul(size).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("grid size {} overflows the cell count", size),
            )
        })?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let existing = file.metadata()?.len();
        let mut cells = vec![EMPTY_CELL; len];
        let mut loaded = false;
        if existing == len as u64 {
            file.read_exact(&mut cells)?;
            match cells.iter().position(|cell| !is_cell_value(*cell)) {
                None => loaded = true,
                Some(offset) => {
                    warn!(
                        "Grid file {} holds byte 0x{:02x} at offset {}; reinitializing",
                        path.display(),
                        cells[offset],
                        offset
                    );
                    cells.fill(EMPTY_CELL);
                }
            }
        } else if existing != 0 {
            warn!(
                "Grid file {} has {} bytes, expected {}; reinitializing",
                path.display(),
                existing,
                len
            );
        }

        if loaded {
            info!("Loaded {}x{} grid from {}", size, size, path.display());
        } else {
            file.set_len(0)?;
            file.set_len(len as u64)?;
            info!("Initialized empty {}x{} grid at {}", size, size, path.display());
        }

        Ok(Self {
            path,
            size,
            len,
            backing: Mutex::new(Some(Backing { cells, file })),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the store still has a backing file to serve from
    pub fn is_available(&self) -> bool {
        self.backing.lock().is_some()
    }

    fn index(&self, position: Position) -> usize {
        position.row * self.size + position.col
    }

    /// Runs `op` on the blocking pool so file I/O under the grid lock never
    /// stalls a runtime worker.
    pub async fn blocking<T, F>(self: &Arc<Self>, op: F) -> Result<T, tokio::task::JoinError>
    where
        F: FnOnce(&GridStore) -> T + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(self);
        tokio::task::spawn_blocking(move || op(&store)).await
    }

    /// Places `word` one byte per cell starting at `origin` along `direction`.
    ///
    /// Every touched cell is bounds-checked before the first byte is stored,
    /// so an out-of-range placement leaves the grid unchanged.
    pub fn write(
        &self,
        origin: Position,
        direction: Direction,
        word: &[u8],
    ) -> Result<(), GridError> {
        if !origin.is_inside(self.size) {
            return Err(self.out_of_range(origin));
        }

        let mut indices = Vec::with_capacity(word.len());
        for steps in 0..word.len() {
            let position = origin
                .step(direction, steps, self.size)
                .ok_or_else(|| self.out_of_range(origin))?;
            indices.push(self.index(position));
        }

        let mut guard = self.backing.lock();
        let backing = guard.as_mut().ok_or(GridError::Unavailable)?;
        for (index, byte) in indices.into_iter().zip(word) {
            backing.cells[index] = *byte;
        }
        backing.persist()?;

        debug!("Wrote {} bytes at {} along {}", word.len(), origin, direction);
        Ok(())
    }

    /// Collects consecutive non-empty cells from `origin` along `direction`.
    ///
    /// Stops at the first empty cell or at the grid edge. Returns an empty
    /// string when `origin` itself is empty.
    pub fn read(&self, origin: Position, direction: Direction) -> Result<String, GridError> {
        if !origin.is_inside(self.size) {
            return Err(self.out_of_range(origin));
        }

        let guard = self.backing.lock();
        let backing = guard.as_ref().ok_or(GridError::Unavailable)?;
        let mut bytes = Vec::new();
        let mut steps = 0;
        while let Some(position) = origin.step(direction, steps, self.size) {
            let cell = backing.cells[self.index(position)];
            if cell == EMPTY_CELL {
                break;
            }
            bytes.push(cell);
            steps += 1;
        }

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Discards the current backing file and replaces it with a fresh,
    /// all-empty one at the same path.
    ///
    /// On failure the old contents are gone as well and the store stays
    /// unavailable until a renew succeeds.
    pub fn renew(&self) -> Result<(), GridError> {
        let mut backing = self.backing.lock();
        *backing = None;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .and_then(|file| file.set_len(self.len as u64).map(|()| file))
            .map_err(|e| {
                error!("Renewing grid at {} failed: {}", self.path.display(), e);
                e
            })?;

        *backing = Some(Backing {
            cells: vec![EMPTY_CELL; self.len],
            file,
        });

        info!("Renewed grid at {}", self.path.display());
        Ok(())
    }

    /// Writes the grid to its file and syncs it to disk
    pub fn flush(&self) -> Result<(), GridError> {
        let mut guard = self.backing.lock();
        let backing = guard.as_mut().ok_or(GridError::Unavailable)?;
        backing.persist()?;
        backing.file.sync_data()?;
        Ok(())
    }

    /// Copies the current grid into an immutable snapshot
    pub fn snapshot(&self) -> Result<GridSnapshot, GridError> {
        let guard = self.backing.lock();
        let backing = guard.as_ref().ok_or(GridError::Unavailable)?;
        Ok(GridSnapshot {
            size: self.size,
            cells: backing.cells.clone(),
        })
    }

    fn out_of_range(&self, origin: Position) -> GridError {
        GridError::OutOfRange {
            row: origin.row,
            col: origin.col,
            size: self.size,
        }
    }
}

fn is_cell_value(byte: u8) -> bool {
    byte == EMPTY_CELL || is_placeable(byte)
}

/// Point-in-time copy of the grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridSnapshot {
    size: usize,
    cells: Vec<u8>,
}

impl GridSnapshot {
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn cell(&self, position: Position) -> Option<u8> {
        position
            .is_inside(self.size)
            .then(|| self.cells[position.row * self.size + position.col])
    }

    pub fn row(&self, row: usize) -> &[u8] {
        &self.cells[row * self.size..(row + 1) * self.size]
    }

    /// Non-empty cells of `row` in increasing column order
    pub fn occupied_in_row(&self, row: usize) -> impl Iterator<Item = (Position, u8)> + '_ {
        self.row(row)
            .iter()
            .enumerate()
            .filter(|(_, cell)| **cell != EMPTY_CELL)
            .map(move |(col, cell)| (Position::new(row, col), *cell))
    }

    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|cell| **cell != EMPTY_CELL).count()
    }

    pub fn is_empty(&self) -> bool {
        self.occupied_count() == 0
    }
}
