//! Listener ownership and graceful shutdown.

use crate::error::ServerError;
use crate::registry::ConnectionRegistry;
use crate::{app, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A running server: the accept loop plus every connection it spawned.
///
/// The listening socket lives inside the serve task and is released when
/// that task finishes, which [`stop`](Self::stop) always waits for.
pub struct SessionServer {
    local_addr: SocketAddr,
    state: Arc<AppState>,
    serve_task: JoinHandle<std::io::Result<()>>,
}

impl SessionServer {
    /// Binds `addr` and starts accepting connections in the background.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if the address cannot be bound.
    pub async fn start(addr: SocketAddr, state: AppState) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let state = Arc::new(state);
        let router = app(state.clone());
        let shutdown = state.shutdown.clone();

        let serve_task = tokio::spawn(async move {
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
        });

        tracing::info!(%local_addr, "session server listening");
        Ok(Self {
            local_addr,
            state,
            serve_task,
        })
    }

    /// The bound address, with the real port when started on port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.state.registry
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Stops accepting, lets open connections finish their current request
    /// and close, then releases the listener.
    ///
    /// Connections still open after the drain timeout are left to finish on
    /// their own; the listener is released regardless.
    ///
    /// # Errors
    ///
    /// Returns the accept loop's error, if it failed.
    pub async fn stop(self) -> Result<(), ServerError> {
        tracing::info!(
            connections = self.state.registry.len().await,
            "stopping session server"
        );
        self.state.shutdown.cancel();

        let served = self.serve_task.await;

        self.state.tracker.close();
        let drain = self.state.transport.drain_timeout();
        if tokio::time::timeout(drain, self.state.tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = self.state.tracker.len(),
                "connections did not drain within {:?}",
                drain
            );
        }

        tracing::info!("session server stopped");
        served??;
        Ok(())
    }
}
