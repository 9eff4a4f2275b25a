//! Error types for the grid server

use shared::ProtocolError;
use thiserror::Error;

/// Failures of the grid store
#[derive(Error, Debug)]
pub enum GridError {
    #[error("access at ({row},{col}) leaves the {size}x{size} grid")]
    OutOfRange { row: usize, col: usize, size: usize },

    #[error("grid storage I/O error: {0}")]
    StorageIo(#[from] std::io::Error),

    #[error("grid storage unavailable after a failed renew")]
    Unavailable,

    #[error("grid task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl GridError {
    /// Whether the store can no longer serve any command
    pub fn is_fatal(&self) -> bool {
        !matches!(self, GridError::OutOfRange { .. })
    }
}

/// Failures of a snapshot export
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("row worker failed: {0}")]
    WorkerFailed(String),
}

/// Reasons a single command is dropped by the dispatcher
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Grid(#[from] GridError),
}

impl DispatchError {
    /// Storage failures take the grid offline; everything else only drops
    /// the offending command.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DispatchError::Grid(e) if e.is_fatal())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("grid size {size} exceeds the maximum of {max}")]
    GridTooLarge { size: usize, max: usize },
}

/// Reasons a session ends abnormally
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("grid unavailable: {0}")]
    Storage(GridError),

    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("command task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
