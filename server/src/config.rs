//! Server configuration

use crate::error::ConfigError;
use shared::GRID_SIZE;
use std::path::PathBuf;

pub const DEFAULT_SESSION_THRESHOLD: usize = 3;
pub const DEFAULT_EXPORT_WORKERS: usize = 3;
/// Largest accepted grid side; the whole grid is held in memory
pub const MAX_GRID_SIZE: usize = 4096;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Backing file of the grid, exactly `grid_size * grid_size` bytes
    pub grid_file: PathBuf,
    /// Text snapshot rewritten at every threshold flush
    pub snapshot_file: PathBuf,
    pub grid_size: usize,
    /// Completed sessions that trigger a snapshot and renew
    pub session_threshold: usize,
    /// Row workers allowed to run at once during an export
    pub export_workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            grid_file: PathBuf::from("matrix.dat"),
            snapshot_file: PathBuf::from("snapshot.log"),
            grid_size: GRID_SIZE,
            session_threshold: DEFAULT_SESSION_THRESHOLD,
            export_workers: DEFAULT_EXPORT_WORKERS,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_size == 0 {
            return Err(ConfigError::Zero("grid size"));
        }
        if self.grid_size > MAX_GRID_SIZE {
            return Err(ConfigError::GridTooLarge {
                size: self.grid_size,
                max: MAX_GRID_SIZE,
            });
        }
        if self.session_threshold == 0 {
            return Err(ConfigError::Zero("session threshold"));
        }
        if self.export_workers == 0 {
            return Err(ConfigError::Zero("export workers"));
        }
        Ok(())
    }
}
