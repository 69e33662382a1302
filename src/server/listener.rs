//! HTTP server listener
//!
//! Binds the listener, runs the health task next to it and serves the router
//! until shutdown.

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::coordinator::StreamCoordinator;
use crate::error::Result;
use crate::server::config::ServerConfig;
use crate::server::http;

/// HTTP control and streaming server
pub struct HttpServer {
    config: ServerConfig,
    coordinator: StreamCoordinator,
}

impl HttpServer {
    /// Create a new server for `coordinator`
    pub fn new(config: ServerConfig, coordinator: StreamCoordinator) -> Self {
        Self {
            config,
            coordinator,
        }
    }

    /// Get the coordinator the handlers drive
    pub fn coordinator(&self) -> &StreamCoordinator {
        &self.coordinator
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server
    ///
    /// This method blocks until the server fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Bind and run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_until(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// On shutdown the session is stopped first, which ends every open
    /// stream body, so in-flight responses drain instead of hanging.
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        let router = http::router(self.coordinator.clone(), &self.config)?;
        tracing::info!(addr = %addr, "HTTP server listening");

        let health_handle = self.coordinator.spawn_health_task();

        let coordinator = self.coordinator.clone();
        let signal = async move {
            shutdown.await;
            tracing::info!("Shutdown signal received");
            if let Err(e) = coordinator.stop().await {
                tracing::warn!(error = %e, "Failed to stop session on shutdown");
            }
        };

        let result = axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await;

        // Stop health checks on shutdown
        health_handle.abort();

        result?;
        Ok(())
    }
}
