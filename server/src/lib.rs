//! # Shared Word Grid Server
//!
//! This library implements a TCP server exposing one fixed-size square grid of
//! single-byte cells to any number of concurrently connected clients. Clients
//! place words on the grid and read them back with a line-oriented text
//! protocol (see the `shared` crate for the wire format).
//!
//! ## Core Responsibilities
//!
//! ### Grid Store
//! The grid lives in memory and is written through to a backing file of
//! exactly N x N bytes. Every `write`, `read` and `renew` runs under a single
//! grid-wide lock, so operations from different sessions are totally ordered
//! and a completed write is visible to every later read.
//!
//! ### Sessions
//! Each accepted connection runs as its own task. Incoming bytes are buffered
//! across reads until a full `END`-terminated command has arrived, so commands
//! split over several TCP segments are never lost. Invalid commands are
//! dropped silently; the protocol has no error reply.
//!
//! ### Threshold Flush
//! Once a configured number of sessions have disconnected, the session that
//! hits the threshold exports a text snapshot of the grid and then renews it
//! to all-empty. A failed export is logged and the renew still happens.
//!
//! ## Module Organization
//!
//! - `grid`: the file-backed grid store and immutable grid snapshots
//! - `dispatcher`: applies decoded commands to the store
//! - `session`: the per-connection read/decode/dispatch/reply loop
//! - `coordinator`: counts finished sessions and runs the threshold flush
//! - `snapshot`: parallel, row-per-worker snapshot export
//! - `network`: the TCP accept loop
//! - `config`: server settings
//! - `error`: error types
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         port: 9000,
//!         session_threshold: 5,
//!         ..ServerConfig::default()
//!     };
//!
//!     // Opens matrix.dat, binds 127.0.0.1:9000 and serves until killed
//!     let server = Server::new(config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod grid;
pub mod network;
pub mod session;
pub mod snapshot;
