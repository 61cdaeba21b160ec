// Operational HTTP server for the broker application.

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::broker::Broker;
use crate::config::Config;
use crate::http::{Controller, Server as HttpServerTrait};
use crate::liveness;

/// What the application needs from its HTTP server.
#[async_trait::async_trait]
pub trait Http: Send + Sync {
    async fn listen_and_serve(&self) -> Result<()>;

    fn is_alive(&self) -> bool;

    fn local_addr(&self) -> Option<SocketAddr>;
}

/// Wraps the generic server with the broker's controllers and tracks whether it is up.
pub struct HttpServer {
    server: Arc<crate::http::HttpServer>,
    is_server_alive: AtomicBool,
}

impl HttpServer {
    pub fn new(
        ctx: CancellationToken,
        cfg: Config,
        broker: Arc<Broker>,
        probe: Arc<liveness::Probe>,
    ) -> Result<Self> {
        let controllers = Self::controllers(&cfg, broker, probe);
        let server = crate::http::HttpServer::new(ctx, cfg, controllers)?;

        Ok(Self {
            server,
            is_server_alive: AtomicBool::new(false),
        })
    }

    pub fn router(&self) -> axum::Router {
        self.server.router()
    }

    fn controllers(
        cfg: &Config,
        broker: Arc<Broker>,
        probe: Arc<liveness::Probe>,
    ) -> Vec<Box<dyn Controller>> {
        use crate::controller;

        vec![
            // Healthcheck probe endpoint
            Box::new(controller::LivenessProbeController::new(probe)),
            // Metrics endpoint
            Box::new(controller::PrometheusMetricsController::new()),
            // Encodes and shows current config as json
            Box::new(controller::ShowConfigController::new(cfg.clone())),
            // Health monitor snapshots
            Box::new(controller::MonitorsController::new(broker)),
        ]
    }
}

#[async_trait::async_trait]
impl Http for HttpServer {
    async fn listen_and_serve(&self) -> Result<()> {
        self.is_server_alive.store(true, Ordering::Relaxed);
        let result = HttpServerTrait::listen_and_serve(self.server.as_ref()).await;
        self.is_server_alive.store(false, Ordering::Relaxed);
        result
    }

    fn is_alive(&self) -> bool {
        self.is_server_alive.load(Ordering::Relaxed)
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        HttpServerTrait::local_addr(self.server.as_ref())
    }
}
