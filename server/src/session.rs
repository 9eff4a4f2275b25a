//! Per-connection command loop
//!
//! A session reads raw bytes from its stream, feeds them through a
//! [`CommandDecoder`] that survives across reads, and dispatches every
//! complete command in arrival order. READ replies are written back raw,
//! without any terminator. Protocol and range errors drop only the offending
//! command; the client never sees them. A peer that streams more than
//! [`MAX_COMMAND_LEN`] bytes without a sentinel is disconnected.

use crate::coordinator::{SessionCoordinator, SessionOutcome};
use crate::dispatcher::process_tokens;
use crate::error::{DispatchError, GridError, SessionError};
use crate::grid::GridStore;
use log::{debug, error, info, warn};
use shared::{CommandDecoder, MAX_COMMAND_LEN};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const READ_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    /// Complete commands decoded
    pub commands: u64,
    /// READ replies sent
    pub replies: u64,
    /// Commands rejected as malformed or out of range
    pub dropped: u64,
}

pub struct Session {
    id: u64,
    store: Arc<GridStore>,
    decoder: CommandDecoder,
    stats: SessionStats,
}

impl Session {
    pub fn new(id: u64, store: Arc<GridStore>) -> Self {
        Self {
            id,
            store,
            decoder: CommandDecoder::new(),
            stats: SessionStats::default(),
        }
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Serves commands until the peer closes the stream.
    ///
    /// Returns an error on connection I/O failure, on an oversized
    /// unterminated command, or when the grid storage itself fails.
    pub async fn run<S>(&mut self, stream: &mut S) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut buffer = [0u8; READ_BUFFER_SIZE];

        loop {
            let len = stream.read(&mut buffer).await?;
            if len == 0 {
                if self.decoder.pending() > 0 {
                    debug!(
                        "Session {}: {} unterminated bytes at close",
                        self.id,
                        self.decoder.pending()
                    );
                }
                return Ok(());
            }

            self.decoder.extend(&buffer[..len]);
            while let Some(tokens) = self.decoder.next_command() {
                self.stats.commands += 1;

                let (tokens, result) = self
                    .store
                    .blocking(move |store| {
                        let result = process_tokens(store, &tokens);
                        (tokens, result)
                    })
                    .await?;

                match result {
                    Ok(Some(reply)) => {
                        stream.write_all(reply.as_bytes()).await?;
                        self.stats.replies += 1;
                    }
                    Ok(None) => {}
                    Err(DispatchError::Grid(e)) if e.is_fatal() => {
                        return Err(SessionError::Storage(e));
                    }
                    Err(e) => {
                        self.stats.dropped += 1;
                        debug!("Session {}: dropped {:?}: {}", self.id, tokens, e);
                    }
                }
            }
            self.decoder.check_pending()?;
        }
    }
}

/// Serves one accepted connection to completion, then reports it to the
/// coordinator exactly once, whether it closed cleanly or not.
///
/// Returns the grid failure when the store broke during the session or
/// while flushing after it; the server cannot keep serving in that case.
pub async fn handle_connection<S>(
    id: u64,
    mut stream: S,
    store: Arc<GridStore>,
    coordinator: Arc<SessionCoordinator>,
) -> Result<SessionStats, GridError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut session = Session::new(id, store);
    let mut failure = None;

    match session.run(&mut stream).await {
        Ok(()) => {
            let stats = session.stats();
            info!(
                "Session {} closed: {} commands, {} replies, {} dropped",
                id, stats.commands, stats.replies, stats.dropped
            );
        }
        Err(SessionError::Io(e)) => warn!("Session {} ended with I/O error: {}", id, e),
        Err(SessionError::Storage(e)) => {
            error!("Session {} aborted: {}", id, e);
            failure = Some(e);
        }
        Err(e) => warn!("Session {} disconnected: {}", id, e),
    }
    drop(stream);

    match coordinator.session_completed().await {
        Ok(SessionOutcome::Counted { completed }) => debug!(
            "Session {} counted ({}/{})",
            id,
            completed,
            coordinator.threshold()
        ),
        Ok(SessionOutcome::Flushed { .. }) => info!("Session {} triggered grid flush", id),
        Err(e) => {
            error!("Grid flush after session {} failed: {}", id, e);
            failure = Some(e);
        }
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(session.stats()),
    }
}
