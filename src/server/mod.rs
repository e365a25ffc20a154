//! HTTP server for the reminder admin API and the progress persistence API.

pub mod http;

pub use http::{ApiError, AppState, router};

use crate::config::ServerConfig;
use crate::error::{BoardError, Result};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

/// Running HTTP server. Dropping it stops the listener task.
pub struct BoardServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl BoardServer {
    /// Bind to `{config.host}:{config.port}` (port `0` auto-assigns) and
    /// serve `state` in a background task.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Http`] if the listener cannot bind.
    pub async fn start(config: &ServerConfig, state: AppState) -> Result<Self> {
        let app = router(state);

        let bind_addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| BoardError::Http(format!("bind {bind_addr} failed: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| BoardError::Http(format!("failed to get local addr: {e}")))?;

        info!("sadhana-board listening on http://{addr}");

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("HTTP server error: {e}");
            }
        });

        Ok(Self { addr, handle })
    }

    /// Address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Abort the server task.
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for BoardServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
