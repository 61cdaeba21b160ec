//! HTTP server implementation.
//

use anyhow::{Context, Result};
use axum::Router;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::{Config, ConfigTrait};
use crate::controller::controller::Controller;

pub const DEFAULT_NAME: &str = "svcbroker";
pub const DEFAULT_PORT: &str = "8092";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Server trait for HTTP server operations.
#[async_trait::async_trait]
pub trait Server: Send + Sync {
    /// Serves until the shutdown token is cancelled.
    async fn listen_and_serve(&self) -> Result<()>;

    /// Address actually bound, once listening.
    fn local_addr(&self) -> Option<SocketAddr>;
}

/// Operational HTTP server: routes come from controllers.
pub struct HttpServer {
    shutdown_token: CancellationToken,
    config: Config,
    router: Router,
    local_addr: OnceLock<SocketAddr>,
}

impl HttpServer {
    pub fn new(
        shutdown_token: CancellationToken,
        config: Config,
        controllers: Vec<Box<dyn Controller>>,
    ) -> Result<Arc<Self>> {
        let router = Self::build_router(controllers);

        Ok(Arc::new(Self {
            shutdown_token,
            config,
            router,
            local_addr: OnceLock::new(),
        }))
    }

    /// Router with every controller route and the common layers.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    fn addr(&self) -> Result<(String, SocketAddr)> {
        let api_cfg = self.config.api();
        let name = api_cfg
            .and_then(|a| a.name.clone())
            .unwrap_or_else(|| DEFAULT_NAME.to_string());
        let port = api_cfg
            .and_then(|a| a.port.clone())
            .unwrap_or_else(|| DEFAULT_PORT.to_string());
        let port = port.trim_start_matches(':');

        let addr: SocketAddr = format!("0.0.0.0:{port}")
            .parse()
            .context("failed to parse server address")?;
        Ok((name, addr))
    }

    pub async fn listen_and_serve(&self) -> Result<()> {
        let (name, addr) = self.addr()?;

        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind TCP listener on {addr}"))?;
        let bound = listener.local_addr().context("failed to read bound address")?;
        let _ = self.local_addr.set(bound);

        info!(
            component = "server",
            event = "started",
            name = %name,
            addr = %bound,
            "server started"
        );

        let shutdown_token = self.shutdown_token.clone();
        let serve_future =
            axum::serve(listener, self.router.clone()).with_graceful_shutdown(async move {
                shutdown_token.cancelled().await;
            });

        if let Err(e) = serve_future.await {
            error!(
                component = "server",
                event = "listen_and_serve_failed",
                name = %name,
                addr = %bound,
                error = %e,
                "server failed to listen and serve"
            );
            return Err(e.into());
        }

        info!(
            component = "server",
            event = "stopped",
            name = %name,
            addr = %bound,
            "server stopped"
        );

        Ok(())
    }

    fn build_router(controllers: Vec<Box<dyn Controller>>) -> Router {
        let mut router = Router::new();
        for controller in controllers {
            router = controller.add_route(router);
        }
        router
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
    }
}

#[async_trait::async_trait]
impl Server for HttpServer {
    async fn listen_and_serve(&self) -> Result<()> {
        HttpServer::listen_and_serve(self).await
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }
}
