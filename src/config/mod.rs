// Configuration loading and management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const PROD: &str = "prod";
#[allow(dead_code)]
pub const DEV: &str = "dev";
#[allow(dead_code)]
pub const DEBUG: &str = "debug";
#[allow(dead_code)]
pub const TEST: &str = "test";

pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MONITOR_MAX_RETRIES: u32 = 5;
pub const DEFAULT_MONITOR_RETRY_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_MONITOR_PORT: u16 = 56567;
pub const DEFAULT_MONITOR_PATH: &str = "/health";
pub const DEFAULT_MONITOR_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_RUNNER_CONCURRENCY: usize = 16;
pub const DEFAULT_RUNNER_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_COMPOSE_DELETE_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_KUBE_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_EPM_API: &str = "http://localhost:8180/v1";
pub const DEFAULT_EPM_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_WORK_DIR: &str = "/tmp/svcbroker";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Broker {
    #[serde(rename = "broker")]
    pub broker: BrokerBox,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrokerBox {
    pub env: String,
    pub logs: Option<Logs>,
    pub runtime: Option<Runtime>,
    pub api: Option<Api>,
    pub store: Option<Store>,
    pub dispatch: Option<Dispatch>,
    pub drivers: Option<Drivers>,
    pub monitor: Option<Monitor>,
    pub runner: Option<Runner>,
    pub auth: Option<Auth>,
    pub k8s: Option<K8S>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Logs {
    pub level: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Runtime {
    pub num_cpus: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Api {
    pub name: Option<String>,
    pub port: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Store {
    #[serde(default)]
    pub kind: StoreKind,
    /// JSON snapshot written on close and loaded on start.
    #[serde(rename = "dump_file")]
    pub dump_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Dispatch {
    /// Extra `alias -> canonical driver name` pairs.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Drivers {
    pub compose: Option<Compose>,
    pub kube: Option<Kube>,
    pub epm: Option<Epm>,
    pub noop: Option<Noop>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Compose {
    pub enabled: bool,
    #[serde(rename = "work_dir")]
    pub work_dir: Option<PathBuf>,
    pub binary: Option<String>,
    #[serde(rename = "update_images", default)]
    pub update_images: bool,
    #[serde(rename = "delete_timeout", with = "humantime_serde", default)]
    pub delete_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Kube {
    pub enabled: bool,
    #[serde(rename = "work_dir")]
    pub work_dir: Option<PathBuf>,
    pub binary: Option<String>,
    #[serde(rename = "request_timeout", with = "humantime_serde", default)]
    pub request_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Epm {
    pub enabled: bool,
    #[serde(rename = "work_dir")]
    pub work_dir: Option<PathBuf>,
    pub api: Option<String>,
    #[serde(with = "humantime_serde", default)]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Noop {
    /// Optional YAML/JSON file with the attribute bag returned by `info`.
    pub fixture: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Monitor {
    pub enabled: bool,
    #[serde(with = "humantime_serde", default)]
    pub interval: Option<Duration>,
    #[serde(rename = "max_retries")]
    pub max_retries: Option<u32>,
    #[serde(rename = "retry_delay", with = "humantime_serde", default)]
    pub retry_delay: Option<Duration>,
    pub port: Option<u16>,
    pub path: Option<String>,
    #[serde(with = "humantime_serde", default)]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Runner {
    pub concurrency: Option<usize>,
    #[serde(rename = "drain_timeout", with = "humantime_serde", default)]
    pub drain_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthKind {
    #[default]
    Static,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Auth {
    #[serde(default)]
    pub kind: AuthKind,
    #[serde(rename = "username_prefix")]
    pub username_prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Probe {
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct K8S {
    pub probe: Probe,
}

/// Fully resolved health monitor settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSettings {
    pub enabled: bool,
    pub interval: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub port: u16,
    pub path: String,
    pub timeout: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: DEFAULT_MONITOR_INTERVAL,
            max_retries: DEFAULT_MONITOR_MAX_RETRIES,
            retry_delay: DEFAULT_MONITOR_RETRY_DELAY,
            port: DEFAULT_MONITOR_PORT,
            path: DEFAULT_MONITOR_PATH.to_string(),
            timeout: DEFAULT_MONITOR_TIMEOUT,
        }
    }
}

// Config trait
pub trait ConfigTrait {
    fn logs(&self) -> Option<&Logs>;
    fn is_prod(&self) -> bool;
    #[allow(dead_code)]
    fn is_dev(&self) -> bool;
    #[allow(dead_code)]
    fn is_test(&self) -> bool;
    fn runtime(&self) -> &Runtime;
    fn api(&self) -> Option<&Api>;
    fn store(&self) -> Store;
    fn aliases(&self) -> BTreeMap<String, String>;
    fn drivers(&self) -> Drivers;
    fn monitor(&self) -> MonitorSettings;
    fn runner_concurrency(&self) -> usize;
    fn runner_drain_timeout(&self) -> Duration;
    fn username_prefix(&self) -> String;
    fn k8s(&self) -> Option<&K8S>;
}

// Config type alias for convenience
pub type Config = Broker;

impl ConfigTrait for Config {
    fn logs(&self) -> Option<&Logs> {
        self.broker.logs.as_ref()
    }

    fn is_prod(&self) -> bool {
        self.broker.env == PROD
    }

    fn is_dev(&self) -> bool {
        self.broker.env == DEV
    }

    fn is_test(&self) -> bool {
        self.broker.env == TEST
    }

    fn runtime(&self) -> &Runtime {
        const ALL_CORES: Runtime = Runtime { num_cpus: 0 };
        self.broker.runtime.as_ref().unwrap_or(&ALL_CORES)
    }

    fn api(&self) -> Option<&Api> {
        self.broker.api.as_ref()
    }

    fn store(&self) -> Store {
        self.broker.store.clone().unwrap_or_default()
    }

    fn aliases(&self) -> BTreeMap<String, String> {
        self.broker
            .dispatch
            .as_ref()
            .map(|d| d.aliases.clone())
            .unwrap_or_default()
    }

    fn drivers(&self) -> Drivers {
        self.broker.drivers.clone().unwrap_or_default()
    }

    fn monitor(&self) -> MonitorSettings {
        let defaults = MonitorSettings::default();
        match self.broker.monitor.as_ref() {
            None => defaults,
            Some(m) => MonitorSettings {
                enabled: m.enabled,
                interval: m.interval.unwrap_or(defaults.interval),
                max_retries: m.max_retries.unwrap_or(defaults.max_retries),
                retry_delay: m.retry_delay.unwrap_or(defaults.retry_delay),
                port: m.port.unwrap_or(defaults.port),
                path: m.path.clone().unwrap_or(defaults.path),
                timeout: m.timeout.unwrap_or(defaults.timeout),
            },
        }
    }

    fn runner_concurrency(&self) -> usize {
        self.broker
            .runner
            .as_ref()
            .and_then(|r| r.concurrency)
            .unwrap_or(DEFAULT_RUNNER_CONCURRENCY)
    }

    fn runner_drain_timeout(&self) -> Duration {
        self.broker
            .runner
            .as_ref()
            .and_then(|r| r.drain_timeout)
            .unwrap_or(DEFAULT_RUNNER_DRAIN_TIMEOUT)
    }

    fn username_prefix(&self) -> String {
        self.broker
            .auth
            .as_ref()
            .and_then(|a| a.username_prefix.clone())
            .unwrap_or_else(|| "svcbroker".to_string())
    }

    fn k8s(&self) -> Option<&K8S> {
        self.broker.k8s.as_ref()
    }
}

impl Config {
    /// Loads configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let abs_path = path
            .canonicalize()
            .with_context(|| format!("failed to resolve absolute config filepath: {:?}", path))?;

        let data = std::fs::read_to_string(&abs_path)
            .with_context(|| format!("read config yaml file {:?}", abs_path))?;

        Self::parse(&data).with_context(|| format!("load config from {:?}", abs_path))
    }

    /// Parses and validates configuration from YAML text.
    pub fn parse(data: &str) -> Result<Self> {
        let cfg: Broker = serde_yaml::from_str(data).context("unmarshal yaml")?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.broker.env.trim().is_empty() {
            anyhow::bail!("broker.env must not be empty");
        }

        let monitor = self.monitor();
        if monitor.enabled {
            if monitor.port == 0 {
                anyhow::bail!("monitor.port must be non-zero");
            }
            if monitor.interval.is_zero() {
                anyhow::bail!("monitor.interval must be positive");
            }
            if !monitor.path.starts_with('/') {
                anyhow::bail!("monitor.path must start with '/': {}", monitor.path);
            }
        }

        if self.runner_concurrency() == 0 {
            anyhow::bail!("runner.concurrency must be at least 1");
        }

        for (alias, target) in self.aliases() {
            if alias.trim().is_empty() || target.trim().is_empty() {
                anyhow::bail!("dispatch.aliases entries must not be empty");
            }
        }

        Ok(())
    }
}

/// Returns the configured work dir or `<DEFAULT_WORK_DIR>/<driver>`.
pub fn work_dir_or_default(dir: Option<&PathBuf>, driver: &str) -> PathBuf {
    dir.cloned()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_WORK_DIR).join(driver))
}

// Test config is always available for integration tests
mod test_config;
#[allow(dead_code)]
pub use test_config::new_test_config;
