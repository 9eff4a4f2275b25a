//! TCP accept loop handing each connection to its own session task
//!
//! Session tasks report grid storage failures back over a channel; the
//! accept loop stops on the first one, since the grid can no longer be
//! served.

use crate::config::ServerConfig;
use crate::coordinator::SessionCoordinator;
use crate::error::GridError;
use crate::grid::GridStore;
use crate::session::handle_connection;
use crate::snapshot::SnapshotExporter;
use log::{error, info};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};

/// Grid server owning the listener, the grid store and the session coordinator
pub struct Server {
    listener: TcpListener,
    store: Arc<GridStore>,
    coordinator: Arc<SessionCoordinator>,
    next_session_id: AtomicU64,
    failure_tx: mpsc::UnboundedSender<GridError>,
    failure_rx: Mutex<mpsc::UnboundedReceiver<GridError>>,
}

impl Server {
    /// Opens the grid and binds the listener described by `config`
    pub async fn new(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;

        let store = Arc::new(GridStore::open(&config.grid_file, config.grid_size)?);
        let exporter = SnapshotExporter::new(&config.snapshot_file, config.export_workers);
        let coordinator = Arc::new(SessionCoordinator::new(
            Arc::clone(&store),
            exporter,
            config.session_threshold,
        ));

        let address = config.address();
        let listener = TcpListener::bind(&address).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (failure_tx, failure_rx) = mpsc::unbounded_channel();
        Ok(Server {
            listener,
            store,
            coordinator,
            next_session_id: AtomicU64::new(1),
            failure_tx,
            failure_rx: Mutex::new(failure_rx),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn store(&self) -> Arc<GridStore> {
        Arc::clone(&self.store)
    }

    pub fn coordinator(&self) -> Arc<SessionCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Accepts connections, spawning one task per session, until a session
    /// reports that the grid storage failed.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let mut failures = self.failure_rx.lock().await;
        info!("Server started successfully");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
                        info!("Connection accepted from {} (session {})", addr, id);

                        if let Err(e) = stream.set_nodelay(true) {
                            error!("Failed to set TCP_NODELAY for session {}: {}", id, e);
                        }

                        let store = Arc::clone(&self.store);
                        let coordinator = Arc::clone(&self.coordinator);
                        let failure_tx = self.failure_tx.clone();
                        tokio::spawn(async move {
                            let result = handle_connection(id, stream, store, coordinator).await;
                            if let Err(e) = result {
                                let _ = failure_tx.send(e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
                Some(e) = failures.recv() => {
                    error!("Grid storage failed, no longer accepting sessions: {}", e);
                    return Err(e.into());
                }
            }
        }
    }
}
