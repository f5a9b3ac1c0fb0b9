//! FSX core server entry point.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use fsx_server::{Config, Server, ServerState};
use fsx_staging::FileStore;
use fsx_store::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.tcp_port,
        "starting fsx server"
    );

    let db = Arc::new(Database::open(&config.db_path)?);
    tracing::info!(path = %config.db_path.display(), "database ready");

    let staging = FileStore::new(&config.storage_path);
    staging.init().await?;
    tracing::info!(path = %config.storage_path.display(), "staging store ready");

    let state = Arc::new(ServerState::new(db, staging));
    let server = Server::new(config.tcp_port, state);

    let accept_loop = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.run().await })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    server.shutdown();
    accept_loop.await??;

    tracing::info!("server shut down cleanly");
    Ok(())
}
