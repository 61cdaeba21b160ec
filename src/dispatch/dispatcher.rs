//! Routes lifecycle calls to the driver registered for a manifest type.

use anyhow::Result;
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use super::reconcile::reconcile_attributes;
use crate::backend::{
    BackendDriver, CommandRunner, ComposeDriver, ComposeSettings, EpmDriver, EpmSettings,
    KubeDriver, KubeSettings, NoopDriver, DEFAULT_ALIASES, DRIVER_COMPOSE, DRIVER_EPM,
    DRIVER_KUBE, DRIVER_NOOP,
};
use crate::config::{self, Config, ConfigTrait};
use crate::error::BrokerError;
use crate::http::client::HyperClient;
use crate::metrics::meter;
use crate::model::{Attributes, LastOperation, Parameters};

/// Control keys some legacy fixtures embed in the raw bag.
const CONTROL_KEY_PREFIX: &str = "srv_inst.";

/// Upper bound on a single driver's platform check unless configured otherwise.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Reconciled view of an instance as reported by its driver.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceInfo {
    pub last_operation: LastOperation,
    pub attributes: Attributes,
}

pub struct ResourceDispatcher {
    drivers: HashMap<String, Arc<dyn BackendDriver>>,
    aliases: HashMap<String, String>,
    fallback: Arc<dyn BackendDriver>,
    check_timeout: Duration,
}

#[derive(Default)]
pub struct DispatcherBuilder {
    drivers: HashMap<String, Arc<dyn BackendDriver>>,
    aliases: BTreeMap<String, String>,
    fallback: Option<Arc<dyn BackendDriver>>,
    check_timeout: Option<Duration>,
}

impl DispatcherBuilder {
    pub fn driver(mut self, name: &str, driver: Arc<dyn BackendDriver>) -> Self {
        self.drivers.insert(name.to_ascii_lowercase(), driver);
        self
    }

    pub fn alias(mut self, alias: &str, target: &str) -> Self {
        self.aliases
            .insert(alias.to_ascii_lowercase(), target.to_ascii_lowercase());
        self
    }

    pub fn fallback(mut self, driver: Arc<dyn BackendDriver>) -> Self {
        self.fallback = Some(driver);
        self
    }

    /// Bounds each driver's `is_ok`; a driver that does not answer in time counts as down.
    pub fn check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> ResourceDispatcher {
        let fallback = self
            .fallback
            .unwrap_or_else(|| Arc::new(NoopDriver::new()));

        for (alias, target) in &self.aliases {
            if !self.drivers.contains_key(target) {
                warn!(
                    component = "dispatch",
                    event = "alias_unresolved",
                    alias = %alias,
                    target = %target,
                    "alias points at a driver that is not enabled, it will use the fallback"
                );
            }
        }

        ResourceDispatcher {
            drivers: self.drivers,
            aliases: self.aliases.into_iter().collect(),
            fallback,
            check_timeout: self.check_timeout.unwrap_or(DEFAULT_CHECK_TIMEOUT),
        }
    }
}

impl ResourceDispatcher {
    pub fn builder() -> DispatcherBuilder {
        let mut builder = DispatcherBuilder::default();
        for (alias, target) in DEFAULT_ALIASES {
            builder = builder.alias(alias, target);
        }
        builder
    }

    /// Wires the enabled drivers from configuration. The noop driver is always the fallback.
    pub fn from_config(
        cfg: &Config,
        runner: Arc<dyn CommandRunner>,
        client: HyperClient,
    ) -> Result<Self> {
        let drivers = cfg.drivers();

        let noop: Arc<dyn BackendDriver> = match drivers.noop.as_ref().and_then(|n| n.fixture.as_ref()) {
            Some(path) => Arc::new(NoopDriver::from_file(path)?),
            None => Arc::new(NoopDriver::new()),
        };
        let mut builder = Self::builder()
            .driver(DRIVER_NOOP, noop.clone())
            .fallback(noop);
        if let Some(timeout) = cfg.k8s().and_then(|k8s| k8s.probe.timeout) {
            builder = builder.check_timeout(timeout);
        }

        if let Some(c) = drivers.compose.as_ref().filter(|c| c.enabled) {
            let settings = ComposeSettings {
                work_dir: config::work_dir_or_default(c.work_dir.as_ref(), DRIVER_COMPOSE),
                binary: c.binary.clone().unwrap_or_else(|| "docker".to_string()),
                update_images: c.update_images,
                delete_timeout: c
                    .delete_timeout
                    .unwrap_or(config::DEFAULT_COMPOSE_DELETE_TIMEOUT),
            };
            builder = builder.driver(
                DRIVER_COMPOSE,
                Arc::new(ComposeDriver::new(settings, runner.clone())),
            );
        }

        if let Some(k) = drivers.kube.as_ref().filter(|k| k.enabled) {
            let settings = KubeSettings {
                work_dir: config::work_dir_or_default(k.work_dir.as_ref(), DRIVER_KUBE),
                binary: k.binary.clone().unwrap_or_else(|| "kubectl".to_string()),
                request_timeout: k
                    .request_timeout
                    .unwrap_or(config::DEFAULT_KUBE_REQUEST_TIMEOUT),
            };
            builder = builder.driver(DRIVER_KUBE, Arc::new(KubeDriver::new(settings, runner.clone())));
        }

        if let Some(e) = drivers.epm.as_ref().filter(|e| e.enabled) {
            let settings = EpmSettings {
                work_dir: config::work_dir_or_default(e.work_dir.as_ref(), DRIVER_EPM),
                api: e
                    .api
                    .clone()
                    .unwrap_or_else(|| config::DEFAULT_EPM_API.to_string()),
                timeout: e.timeout.unwrap_or(config::DEFAULT_EPM_TIMEOUT),
            };
            builder = builder.driver(DRIVER_EPM, Arc::new(EpmDriver::new(settings, client)));
        }

        for (alias, target) in cfg.aliases() {
            builder = builder.alias(&alias, &target);
        }

        Ok(builder.build())
    }

    /// Picks the driver for a manifest type, falling back for unknown types.
    pub fn resolve(&self, manifest_type: &str) -> Result<Arc<dyn BackendDriver>, BrokerError> {
        let key = manifest_type.trim().to_ascii_lowercase();
        if key.is_empty() {
            return Err(BrokerError::Configuration(
                "manifest has no manifest_type".to_string(),
            ));
        }
        let canonical = self.aliases.get(&key).unwrap_or(&key);
        match self.drivers.get(canonical) {
            Some(driver) => Ok(driver.clone()),
            None => {
                warn!(
                    component = "dispatch",
                    event = "fallback",
                    manifest_type = manifest_type,
                    fallback = self.fallback.name(),
                    "no driver registered for manifest type, using fallback"
                );
                meter::add_dispatch_fallback(&key);
                Ok(self.fallback.clone())
            }
        }
    }

    pub async fn create(
        &self,
        instance_id: &str,
        content: &str,
        manifest_type: &str,
        parameters: &Parameters,
    ) -> Result<(), BrokerError> {
        let driver = self.resolve(manifest_type)?;
        driver
            .create(instance_id, content, manifest_type, parameters)
            .await
            .map_err(|e| backend_error(driver.name(), "create", instance_id, &e))
    }

    /// Fetches the raw attributes and reconciles them into a lifecycle state.
    pub async fn info(
        &self,
        instance_id: &str,
        manifest_type: &str,
    ) -> Result<InstanceInfo, BrokerError> {
        let driver = self.resolve(manifest_type)?;
        let mut attributes = driver
            .info(instance_id, manifest_type)
            .await
            .map_err(|e| backend_error(driver.name(), "info", instance_id, &e))?;
        attributes.retain(|k, _| !k.starts_with(CONTROL_KEY_PREFIX));

        Ok(InstanceInfo {
            last_operation: reconcile_attributes(&attributes),
            attributes,
        })
    }

    pub async fn delete(&self, instance_id: &str, manifest_type: &str) -> Result<(), BrokerError> {
        let driver = self.resolve(manifest_type)?;
        driver
            .delete(instance_id, manifest_type)
            .await
            .map_err(|e| backend_error(driver.name(), "delete", instance_id, &e))
    }

    /// True when every registered driver reports its platform reachable.
    ///
    /// Drivers are checked concurrently, each bounded by the check timeout.
    pub async fn is_ok(&self) -> bool {
        let timeout = self.check_timeout;
        let checks = self.drivers.iter().map(|(name, driver)| async move {
            let ok = tokio::time::timeout(timeout, driver.is_ok()).await;
            (name, ok)
        });

        let mut healthy = true;
        for (name, ok) in join_all(checks).await {
            match ok {
                Ok(true) => {}
                Ok(false) => {
                    warn!(
                        component = "dispatch",
                        event = "driver_unhealthy",
                        driver = %name,
                        "driver reports its platform unreachable"
                    );
                    healthy = false;
                }
                Err(_) => {
                    warn!(
                        component = "dispatch",
                        event = "driver_check_timeout",
                        driver = %name,
                        timeout = ?timeout,
                        "driver did not answer its platform check in time"
                    );
                    healthy = false;
                }
            }
        }
        healthy
    }

    /// Registered canonical driver names, sorted.
    pub fn driver_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.drivers.keys().cloned().collect();
        names.sort();
        names
    }
}

fn backend_error(
    driver: &'static str,
    op: &'static str,
    instance_id: &str,
    err: &anyhow::Error,
) -> BrokerError {
    error!(
        component = "dispatch",
        event = "backend_failed",
        driver = driver,
        op = op,
        instance_id = instance_id,
        error = format!("{err:#}"),
        "backend call failed"
    );
    meter::add_backend_error(driver, op);
    BrokerError::backend(&format!("{driver} {op} failed"), err)
}
