// Entrypoint for the svcbroker service.

use svcbroker::app::App;
use svcbroker::config::{Config, ConfigTrait};
use svcbroker::shutdown::GracefulShutdown;
use svcbroker::{controller, dedlog, liveness};

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const CONFIG_PATH: &str = "cfg/svcbroker.cfg.yaml";
const CONFIG_PATH_LOCAL: &str = "cfg/svcbroker.cfg.local.yaml";
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
// Headroom on top of the runner drain for monitors and the store dump.
const SHUTDOWN_HEADROOM: Duration = Duration::from_secs(10);

/// svcbroker - provisions service instances onto pluggable container backends
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Custom config file path
    #[arg(short, long, value_name = "FILE")]
    cfg: Option<PathBuf>,
}

/// Logs the thread parallelism settings.
fn set_max_num_cpus(cfg: &Config) {
    let cores = cfg.runtime().num_cpus;
    if cores == 0 {
        info!(
            component = "main",
            event = "num_cpus_configured",
            num_cpus = num_cpus::get(),
            "Available cores value configured (using all available cores)"
        );
    } else {
        warn!(
            component = "main",
            event = "num_cpus_configured",
            num_cpus = cores,
            "Available cores value configured"
        );
    }
}

/// Loads the config: an explicit path, else the local override, else the default file.
fn load_cfg(path: Option<PathBuf>) -> Result<Config> {
    if let Some(custom_path) = path {
        let cfg = Config::load(&custom_path)
            .with_context(|| format!("failed to load custom config from {:?}", custom_path))?;
        info!(
            component = "config",
            event = "load_success",
            path = ?custom_path,
            "config loaded"
        );
        return Ok(cfg);
    }

    match Config::load(PathBuf::from(CONFIG_PATH_LOCAL)) {
        Ok(cfg) => {
            info!(
                component = "config",
                event = "load_success",
                path = CONFIG_PATH_LOCAL,
                "config loaded"
            );
            Ok(cfg)
        }
        Err(_) => {
            let cfg = Config::load(PathBuf::from(CONFIG_PATH))
                .with_context(|| format!("failed to load config from {}", CONFIG_PATH))?;
            info!(
                component = "config",
                event = "load_success",
                path = CONFIG_PATH,
                "config loaded"
            );
            Ok(cfg)
        }
    }
}

/// JSON logs in prod, pretty console output otherwise. `RUST_LOG` wins over the config.
fn configure_logger(cfg: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let log_level = cfg
        .logs()
        .and_then(|logs| logs.level.as_deref())
        .unwrap_or("debug");

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if cfg.is_prod() {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty())
            .init();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // The recorder must be installed before the runtime exists.
    match controller::metrics::init_prometheus_exporter() {
        Ok(_) => {
            eprintln!("Info: Prometheus metrics exporter initialized successfully");
        }
        Err(e) => {
            eprintln!("Warning: Failed to initialize Prometheus metrics exporter: {}", e);
            eprintln!("Metrics endpoint will not be available");
        }
    }

    tokio::runtime::Runtime::new()
        .context("Failed to create tokio runtime")?
        .block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    let shutdown_token = CancellationToken::new();

    let cfg = load_cfg(args.cfg)?;
    configure_logger(&cfg);
    set_max_num_cpus(&cfg);

    let dedup_logger_token = shutdown_token.clone();
    tokio::task::spawn(async move {
        dedlog::start_dedup_logger(dedup_logger_token).await;
    });

    let graceful_shutdown = GracefulShutdown::new(shutdown_token.clone());
    graceful_shutdown.set_graceful_timeout(cfg.runner_drain_timeout() + SHUTDOWN_HEADROOM);

    let probe_timeout = cfg
        .k8s()
        .and_then(|k8s| k8s.probe.timeout)
        .unwrap_or(DEFAULT_PROBE_TIMEOUT);
    let probe = Arc::new(liveness::Probe::new(probe_timeout));

    let app = App::new(shutdown_token.clone(), cfg, probe)
        .await
        .context("failed to build application")?;

    graceful_shutdown.add(1);
    let graceful_done = Arc::new(graceful_shutdown.clone());
    if let Err(e) = app.serve(graceful_done.clone()).await {
        error!(
            component = "main",
            scope = "app",
            event = "start_failed",
            error = %e,
            "failed to start app"
        );
        graceful_done.done();
    }

    if let Err(e) = graceful_shutdown.await_shutdown().await {
        error!(
            component = "main",
            scope = "service",
            event = "graceful_shutdown_failed",
            error = %e,
            "failed to gracefully shut down service"
        );
        return Err(e);
    }

    Ok(())
}
