// Main broker application implementation.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::auth::StaticAuth;
use crate::backend::TokioCommandRunner;
use crate::broker::Broker;
use crate::config::{Config, ConfigTrait};
use crate::dispatch::ResourceDispatcher;
use crate::http::client::create_client;
use crate::liveness;
use crate::monitor::{HealthMonitor, HttpHealthProbe};
use crate::runner::AsyncRunner;
use crate::store::{InMemoryStore, InstanceLocks, Store};
use crate::task::TaskContext;

use super::server::{Http, HttpServer};

const MONITOR_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns every long-lived component: store, dispatcher, monitor, runner, broker, ops server.
#[derive(Clone)]
pub struct App {
    cfg: Config,
    shutdown_token: CancellationToken,
    store: Arc<dyn Store>,
    monitor: Option<Arc<HealthMonitor>>,
    runner: Arc<AsyncRunner>,
    broker: Arc<Broker>,
    probe: Arc<liveness::Probe>,
    server: Arc<dyn Http>,
    closed: Arc<AtomicBool>,
}

impl App {
    pub async fn new(
        shutdown_token: CancellationToken,
        cfg: Config,
        probe: Arc<liveness::Probe>,
    ) -> Result<Self> {
        let store: Arc<dyn Store> = Arc::new(
            InMemoryStore::open(cfg.store().dump_file).context("failed to open store")?,
        );
        let client = create_client()?;
        let dispatcher = Arc::new(
            ResourceDispatcher::from_config(&cfg, Arc::new(TokioCommandRunner), client.clone())
                .context("failed to build backend dispatcher")?,
        );
        info!(
            component = "app",
            event = "drivers_registered",
            drivers = ?dispatcher.driver_names(),
            "backend drivers registered"
        );

        let settings = cfg.monitor();
        let monitor = settings.enabled.then(|| {
            let probe = Arc::new(HttpHealthProbe::new(client, settings.timeout));
            Arc::new(HealthMonitor::new(dispatcher.clone(), probe, settings.clone()))
        });

        let mut ctx = TaskContext::new(store.clone(), dispatcher)
            .with_auth(Arc::new(StaticAuth::new(cfg.username_prefix())))
            .with_locks(InstanceLocks::new());
        if let Some(monitor) = &monitor {
            ctx = ctx.with_monitor(monitor.clone());
        }

        let runner = Arc::new(AsyncRunner::new(cfg.runner_concurrency()));
        let broker = Arc::new(Broker::new(ctx, runner.clone()));
        let server: Arc<dyn Http> = Arc::new(HttpServer::new(
            shutdown_token.clone(),
            cfg.clone(),
            broker.clone(),
            probe.clone(),
        )?);

        Ok(Self {
            cfg,
            shutdown_token,
            store,
            monitor,
            runner,
            broker,
            probe,
            server,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Address of the ops listener once it is bound.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.local_addr()
    }

    /// Starts the ops server in the background. Resources are closed when it stops.
    pub async fn serve(&self, gsh: Arc<crate::shutdown::GracefulShutdown>) -> Result<()> {
        self.probe.watch(vec![
            self.broker.clone() as Arc<dyn liveness::Service>,
            Arc::new(self.clone()) as Arc<dyn liveness::Service>,
        ]);

        let server = self.server.clone();
        let app_for_close = self.clone();

        tokio::task::spawn(async move {
            if let Err(e) = server.listen_and_serve().await {
                error!(
                    component = "app",
                    scope = "server",
                    event = "serve_failed",
                    error = %e,
                    "server failed to serve"
                );
            }

            if let Err(e) = app_for_close.close().await {
                error!(
                    component = "app",
                    scope = "shutdown",
                    event = "close_failed",
                    error = %e,
                    "application close failed"
                );
            }

            gsh.done();
        });

        info!(component = "app", event = "started", "application lifecycle");

        Ok(())
    }

    pub fn is_alive(&self) -> bool {
        if !self.server.is_alive() {
            warn!(
                component = "app",
                scope = "http_server",
                event = "gone_away",
                "http server has gone away"
            );
            return false;
        }
        true
    }

    /// Stops monitors, drains background work, then closes the store. Runs once.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(monitor) = &self.monitor {
            monitor.stop_all(MONITOR_STOP_TIMEOUT).await;
        }

        if !self.runner.drain(self.cfg.runner_drain_timeout()).await {
            warn!(
                component = "app",
                scope = "runner",
                event = "drain_incomplete",
                in_flight = self.runner.in_flight(),
                "closing store with background work still running"
            );
        }

        let closed = self.store.close().await;
        if let Err(e) = &closed {
            error!(
                component = "app",
                scope = "store",
                event = "close_failed",
                error = %e,
                "error closing store"
            );
        }

        self.shutdown_token.cancel();
        info!(component = "app", event = "stopped", "application lifecycle");

        closed
    }
}

#[async_trait::async_trait]
impl liveness::Service for App {
    fn name(&self) -> &str {
        "ops-server"
    }

    async fn is_alive(&self) -> bool {
        App::is_alive(self)
    }
}
