use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::protocol::error::{HostRpcError, Result};
use crate::transport::tcp::{TcpConfig, TcpTransport};

/// Async TCP listener producing one [`TcpTransport`] per accepted stream.
pub struct TcpServer {
    listener: TcpListener,
    config: TcpConfig,
}

impl TcpServer {
    /// Creates a new TCP server bound to the specified address.
    ///
    /// # Arguments
    /// * `bind_addr` - The address to bind to (e.g., "0.0.0.0:7400")
    /// * `config` - Frame limits applied to every accepted transport
    pub async fn new(bind_addr: &str, config: TcpConfig) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| HostRpcError::Transport(format!("Failed to bind to {}: {}", bind_addr, e)))?;

        Ok(Self { listener, config })
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| HostRpcError::Transport(format!("Failed to get local addr: {}", e)))
    }

    /// Waits for the next connection.
    pub async fn accept(&self) -> Result<TcpTransport> {
        let (stream, peer_addr) = self
            .listener
            .accept()
            .await
            .map_err(|e| HostRpcError::Transport(format!("Failed to accept connection: {}", e)))?;

        tracing::info!("Connection established from {}", peer_addr);
        Ok(TcpTransport::from_stream(stream, self.config.clone()))
    }

    /// Accepts connections forever, spawning `handler` for each one.
    ///
    /// Each connection gets its own task, so one slow peer never blocks
    /// the others.
    pub async fn run_with_handler<F, Fut>(&self, handler: F) -> Result<()>
    where
        F: Fn(TcpTransport) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler = Arc::new(handler);

        loop {
            let transport = self.accept().await?;
            let handler = handler.clone();
            tokio::spawn(async move { handler(transport).await });
        }
    }
}
