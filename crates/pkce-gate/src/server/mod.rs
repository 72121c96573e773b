//! HTTP server with a bearer-JWT gate in front of protected routes.

pub mod auth;
pub mod transport;

use std::net::SocketAddr;

use crate::config::Config;
use auth::BearerGate;

/// Resource server protected by the bearer gate.
#[derive(Debug, Clone)]
pub struct GateServer {
    gate: BearerGate,
}

impl GateServer {
    /// Create a server for the configured issuer.
    ///
    /// # Errors
    ///
    /// Returns error if the key set HTTP client cannot be built.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Ok(Self { gate: BearerGate::from_config(config)? })
    }

    /// The gate guarding protected routes.
    #[must_use]
    pub const fn gate(&self) -> &BearerGate {
        &self.gate
    }

    /// Warm the key cache. Failure is logged, not fatal: keys are fetched
    /// again on the first request.
    pub async fn prefetch_keys(&self) {
        let keys = self.gate.validator().keys();
        match keys.prefetch().await {
            Ok(count) => tracing::info!(count, url = %keys.jwks_url(), "Signing keys cached"),
            Err(e) => tracing::warn!(error = %e, url = %keys.jwks_url(), "Could not prefetch signing keys"),
        }
    }

    /// Run the server in HTTP mode.
    ///
    /// # Errors
    ///
    /// Returns error on server failure.
    pub async fn run_http(self, port: u16) -> anyhow::Result<()> {
        tracing::info!("Starting gate server in HTTP mode on port {}", port);

        let router = transport::create_router(self.gate);
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        tracing::info!("HTTP server listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

        tracing::info!("HTTP server shut down");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal");
}
