//! Protocol server startup helper.
//!
//! [`spawn_protocol_server`] binds eagerly, so address problems surface to
//! the caller, then serves on a background Tokio task. The returned
//! [`ProtocolServer`] reports the bound address and shuts the server down
//! gracefully.

use std::net::SocketAddr;
use std::sync::Arc;

use bold_core::config::ServerConfig;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::server::{ServerError, bind, serve};
use crate::state::AppState;

/// Errors that can occur when spawning the protocol server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// A protocol server running on a background task.
#[derive(Debug)]
pub struct ProtocolServer {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl ProtocolServer {
    /// The bound address (useful when binding port 0).
    pub const fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections, finish in-flight requests and wait for
    /// the server task to end.
    pub async fn shutdown(self) {
        // The task may already have ended on a serve error.
        self.shutdown.send(()).ok();
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Protocol server task failed");
        }
    }
}

/// Bind `config`'s address and serve the protocol on a background task.
///
/// # Errors
///
/// Returns [`StartupError::Server`] if the address cannot be bound.
pub async fn spawn_protocol_server(
    config: &ServerConfig,
    state: Arc<AppState>,
) -> Result<ProtocolServer, StartupError> {
    let listener = bind(config).await?;
    let addr = listener
        .local_addr()
        .map_err(|e| ServerError::Bind(format!("listener has no address: {e}")))?;

    let (shutdown, signal) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        let stopped = async move {
            signal.await.ok();
        };
        if let Err(e) = serve(listener, state, stopped).await {
            tracing::error!(error = %e, "Protocol server exited with error");
        }
    });

    tracing::info!(%addr, "Protocol server spawned on background task");

    Ok(ProtocolServer {
        addr,
        shutdown,
        handle,
    })
}
