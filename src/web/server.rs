//! Web server using Axum.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::router::create_app_router;
use crate::controller::Controller;
use crate::error::{Error, Result};
use crate::telemetry;

/// How long running local tasks may take to finish after shutdown is requested.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Web server configuration.
#[derive(Debug, Clone)]
pub struct WebServerConfig {
    pub port: u16,
    pub host: String,
    pub static_dir: Option<PathBuf>,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            host: "0.0.0.0".to_string(),
            static_dir: None,
        }
    }
}

impl WebServerConfig {
    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| Error::Config(format!("Invalid address {}:{}: {}", self.host, self.port, e)))
    }
}

/// Run the controller until ctrl-c.
pub async fn run_server(ctl: Arc<Controller>, config: WebServerConfig) -> Result<()> {
    let addr = config.addr()?;
    let app = create_app_router(ctl.clone(), config.static_dir.clone())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let sampler = tokio::spawn(telemetry::run_sampler(
        ctl.registry().clone(),
        ctl.fanout().clone(),
        ctl.sample_interval(),
    ));

    tracing::info!("Starting controller on {}", addr);
    if let Some(dir) = &config.static_dir {
        tracing::info!("Serving static files from {}", dir.display());
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let hub = ctl.hub().clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let closed = hub.close_all();
            tracing::info!("Closed {} live connection(s)", closed);
        })
        .await;

    sampler.abort();
    ctl.shutdown(SHUTDOWN_GRACE).await;
    served?;

    tracing::info!("Controller stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addr_parsing() {
        let config = WebServerConfig {
            host: "127.0.0.1".to_string(),
            port: 9001,
            static_dir: None,
        };
        assert_eq!(config.addr().unwrap().port(), 9001);

        let bad = WebServerConfig {
            host: "not a host".to_string(),
            ..Default::default()
        };
        assert!(bad.addr().is_err());
    }
}
