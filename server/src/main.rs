use clap::Parser;
use log::{error, info};
use server::config::{ServerConfig, DEFAULT_EXPORT_WORKERS, DEFAULT_SESSION_THRESHOLD};
use server::network::Server;
use shared::GRID_SIZE;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// File backing the grid
    #[arg(short, long, default_value = "matrix.dat")]
    grid_file: PathBuf,

    /// File the snapshot is written to at every flush
    #[arg(short, long, default_value = "snapshot.log")]
    snapshot_file: PathBuf,

    /// Completed sessions before the grid is snapshotted and renewed
    #[arg(short = 't', long, default_value_t = DEFAULT_SESSION_THRESHOLD)]
    session_threshold: usize,

    /// Row workers running at once during a snapshot export
    #[arg(short = 'w', long, default_value_t = DEFAULT_EXPORT_WORKERS)]
    export_workers: usize,

    /// Side length of the square grid (at most 4096)
    #[arg(long, default_value_t = GRID_SIZE)]
    grid_size: usize,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            host: args.host,
            port: args.port,
            grid_file: args.grid_file,
            snapshot_file: args.snapshot_file,
            grid_size: args.grid_size,
            session_threshold: args.session_threshold,
            export_workers: args.export_workers,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = ServerConfig::from(Args::parse());
    info!(
        "Starting grid server: {}x{} grid at {}, snapshot to {}, flush every {} sessions",
        config.grid_size,
        config.grid_size,
        config.grid_file.display(),
        config.snapshot_file.display(),
        config.session_threshold
    );

    let server = Server::new(config).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    if let Err(e) = server.store().flush() {
        error!("Failed to flush grid on shutdown: {}", e);
    }

    Ok(())
}
