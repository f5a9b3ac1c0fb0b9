//! TCP accept loop and the state shared by every connection.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use fsx_staging::FileStore;
use fsx_store::Database;

use crate::auth::AuthService;
use crate::broker::TransferBroker;
use crate::connection::run_connection;
use crate::registry::OnlineRegistry;
use crate::ServerError;

/// Everything a connection handler needs, shared behind one `Arc`.
///
/// Per-connection state needs no locks; these shared pieces each carry
/// their own synchronization.
pub struct ServerState {
    pub db: Arc<Database>,
    pub auth: AuthService,
    pub registry: OnlineRegistry,
    pub broker: TransferBroker,
    pub staging: FileStore,
}

impl ServerState {
    pub fn new(db: Arc<Database>, staging: FileStore) -> Self {
        Self {
            auth: AuthService::new(Arc::clone(&db)),
            registry: OnlineRegistry::new(),
            broker: TransferBroker::new(),
            staging,
            db,
        }
    }
}

/// The FSX TCP server.
///
/// Binds one listener and spawns a connection task per accepted socket.
pub struct Server {
    port: u16,
    state: Arc<ServerState>,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl Server {
    /// Creates a server on the given port (0 = OS-assigned).
    pub fn new(port: u16, state: Arc<ServerState>) -> Arc<Self> {
        Arc::new(Self {
            port,
            state,
            cancel: CancellationToken::new(),
            local_addr: Mutex::new(None),
        })
    }

    /// The bound address, available once [`run`](Self::run) has bound the
    /// listener.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Signals the accept loop and every connection to stop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Runs the accept loop until cancellation.
    pub async fn run(self: &Arc<Self>) -> Result<(), ServerError> {
        let addr: SocketAddr = ([0, 0, 0, 0], self.port).into();
        let listener = TcpListener::bind(addr).await?;

        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        tracing::info!(addr = %local_addr, "fsx server listening");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("server shutting down");
                    break Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let state = Arc::clone(&self.state);
                            let cancel = self.cancel.clone();
                            tokio::spawn(run_connection(stream, peer_addr, state, cancel));
                        }
                        Err(e) => {
                            tracing::error!("accept error: {e}");
                        }
                    }
                }
            }
        }
    }
}
