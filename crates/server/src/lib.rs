//! FSX core server.
//!
//! Brokers authenticated one-shot file transfers between users over a
//! length-prefixed binary protocol on TCP. A single listener accepts all
//! client connections; each connection runs its own read-dispatch loop and
//! write pump, and the shared pieces (online registry, transfer broker,
//! database) sit behind their own locks.

pub mod auth;
pub mod broker;
pub mod config;
pub mod connection;
pub mod registry;
pub mod server;

pub use auth::AuthService;
pub use broker::{clamp_chunk_size, Transfer, TransferBroker, TransferState};
pub use config::Config;
pub use connection::{run_connection, ConnectionSender};
pub use registry::{OnlineEntry, OnlineRegistry};
pub use server::{Server, ServerState};

/// Outbound frame queue capacity per connection.
///
/// Outbound traffic is replies plus the occasional peer push; the bulky
/// direction (chunks) is inbound. 256 frames leaves comfortable headroom
/// before `try_send` starts dropping.
pub const SEND_BUFFER_SIZE: usize = 256;

/// Errors produced by the server's startup and accept path.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] fsx_store::StoreError),

    #[error("staging error: {0}")]
    Staging(#[from] fsx_staging::StagingError),
}
