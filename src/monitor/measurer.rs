//! One polling loop per monitored instance.

use arc_swap::ArcSwap;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::probe::HealthProbe;
use super::{HealthStatus, MonitorSnapshot};
use crate::backend::driver::SUFFIX_IP;
use crate::config::MonitorSettings;
use crate::dedlog;
use crate::dispatch::ResourceDispatcher;
use crate::metrics::meter;
use crate::model::Attributes;

/// First non-empty `<resource>_Ip` value, else any non-empty key mentioning `Ip`.
pub fn find_ip(attributes: &Attributes) -> Option<&str> {
    let non_empty = |(_, v): &(&String, &String)| !v.trim().is_empty();
    attributes
        .iter()
        .filter(|(k, _)| k.ends_with(SUFFIX_IP))
        .find(non_empty)
        .or_else(|| attributes.iter().filter(|(k, _)| k.contains("Ip")).find(non_empty))
        .map(|(_, v)| v.trim())
}

pub fn endpoint_url(ip: &str, port: u16, path: &str) -> String {
    format!("http://{ip}:{port}{path}")
}

pub struct Measurer {
    instance_id: String,
    manifest_type: String,
    dispatcher: Arc<ResourceDispatcher>,
    probe: Arc<dyn HealthProbe>,
    settings: MonitorSettings,
    snapshot: Arc<ArcSwap<MonitorSnapshot>>,
}

impl Measurer {
    pub fn new(
        instance_id: &str,
        manifest_type: &str,
        dispatcher: Arc<ResourceDispatcher>,
        probe: Arc<dyn HealthProbe>,
        settings: MonitorSettings,
        snapshot: Arc<ArcSwap<MonitorSnapshot>>,
    ) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            manifest_type: manifest_type.to_string(),
            dispatcher,
            probe,
            settings,
            snapshot,
        }
    }

    /// Asks the backend for an IP-bearing attribute up to `max_retries` times.
    ///
    /// Returns `None` when the budget runs out or the monitor is stopped.
    pub async fn discover(&self, token: &CancellationToken) -> Option<String> {
        let attempts = self.settings.max_retries.max(1);
        for attempt in 1..=attempts {
            if token.is_cancelled() {
                return None;
            }
            match self.dispatcher.info(&self.instance_id, &self.manifest_type).await {
                Ok(info) => {
                    if let Some(ip) = find_ip(&info.attributes) {
                        return Some(endpoint_url(ip, self.settings.port, &self.settings.path));
                    }
                    warn!(
                        component = "monitor",
                        event = "endpoint_missing",
                        instance_id = %self.instance_id,
                        attempt = attempt,
                        attempts = attempts,
                        "no IP reported for instance yet"
                    );
                }
                Err(e) => {
                    dedlog::err(
                        Some(&e.to_string()),
                        Some(&self.instance_id),
                        "health monitor could not query instance info",
                    );
                }
            }
            if attempt < attempts {
                tokio::select! {
                    _ = token.cancelled() => return None,
                    _ = tokio::time::sleep(self.settings.retry_delay) => {}
                }
            }
        }
        None
    }

    /// Probes once. Never panics and never returns an error.
    pub async fn measure(&self, endpoint: Option<&str>) -> HealthStatus {
        let Some(url) = endpoint else {
            return HealthStatus::Unreachable;
        };
        let checked = AssertUnwindSafe(self.probe.check(url)).catch_unwind().await;
        match checked {
            Ok(Ok(true)) => HealthStatus::Healthy,
            Ok(Ok(false)) => {
                warn!(
                    component = "monitor",
                    event = "unhealthy",
                    instance_id = %self.instance_id,
                    endpoint = url,
                    "instance endpoint is not alive"
                );
                HealthStatus::Unhealthy
            }
            Ok(Err(e)) => {
                dedlog::err(
                    Some(&format!("{e:#}")),
                    Some(url),
                    "instance endpoint is not contactable",
                );
                HealthStatus::Unhealthy
            }
            Err(_) => {
                dedlog::err(None, Some(url), "health probe panicked");
                HealthStatus::Unhealthy
            }
        }
    }

    fn record(&self, endpoint: Option<&str>, status: HealthStatus) {
        let prev = self.snapshot.load();
        self.snapshot.store(Arc::new(MonitorSnapshot {
            instance_id: self.instance_id.clone(),
            endpoint: endpoint.map(str::to_string),
            status,
            checks: prev.checks + u64::from(status != HealthStatus::Discovering),
            last_checked: Some(chrono::Utc::now()),
        }));
    }

    pub async fn run(self, token: CancellationToken) {
        info!(
            component = "monitor",
            event = "started",
            instance_id = %self.instance_id,
            manifest_type = %self.manifest_type,
            "health monitor started"
        );

        let endpoint = self.discover(&token).await;
        match &endpoint {
            Some(url) => info!(
                component = "monitor",
                event = "endpoint_discovered",
                instance_id = %self.instance_id,
                endpoint = %url,
                "health endpoint discovered"
            ),
            None if !token.is_cancelled() => warn!(
                component = "monitor",
                event = "endpoint_never_found",
                instance_id = %self.instance_id,
                "no endpoint within retry budget, probes will report unreachable"
            ),
            None => {}
        }
        self.snapshot.store(Arc::new(MonitorSnapshot {
            endpoint: endpoint.clone(),
            ..MonitorSnapshot::discovering(&self.instance_id)
        }));

        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let status = self.measure(endpoint.as_deref()).await;
                    meter::add_probe(status.as_str());
                    debug!(
                        component = "monitor",
                        event = "probe",
                        instance_id = %self.instance_id,
                        status = status.as_str(),
                        "probe finished"
                    );
                    self.record(endpoint.as_deref(), status);
                }
            }
        }

        info!(
            component = "monitor",
            event = "stopped",
            instance_id = %self.instance_id,
            "health monitor stopped"
        );
    }
}
