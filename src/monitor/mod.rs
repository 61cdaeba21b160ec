// Package monitor tracks the health of provisioned instances, one poller per instance.

pub mod measurer;
pub mod probe;


use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::MonitorSettings;
use crate::dispatch::ResourceDispatcher;
use crate::metrics::meter;

pub use measurer::{endpoint_url, find_ip, Measurer};
pub use probe::{HealthProbe, HttpHealthProbe};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Discovering,
    Healthy,
    Unhealthy,
    Unreachable,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Discovering => "discovering",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unreachable => "unreachable",
        }
    }
}

/// Last known view of one monitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorSnapshot {
    pub instance_id: String,
    pub endpoint: Option<String>,
    pub status: HealthStatus,
    pub checks: u64,
    pub last_checked: Option<DateTime<Utc>>,
}

impl MonitorSnapshot {
    pub fn discovering(instance_id: &str) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            endpoint: None,
            status: HealthStatus::Discovering,
            checks: 0,
            last_checked: None,
        }
    }
}

struct MonitorHandle {
    token: CancellationToken,
    snapshot: Arc<ArcSwap<MonitorSnapshot>>,
    join: JoinHandle<()>,
}

/// Owns every running measurer, keyed by instance id.
pub struct HealthMonitor {
    dispatcher: Arc<ResourceDispatcher>,
    probe: Arc<dyn HealthProbe>,
    settings: MonitorSettings,
    monitors: DashMap<String, MonitorHandle>,
    shutdown: CancellationToken,
}

impl HealthMonitor {
    pub fn new(
        dispatcher: Arc<ResourceDispatcher>,
        probe: Arc<dyn HealthProbe>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            dispatcher,
            probe,
            settings,
            monitors: DashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Spawns a measurer for the instance. Returns false if one is already running.
    pub fn start(&self, instance_id: &str, manifest_type: &str) -> bool {
        if self.shutdown.is_cancelled() {
            warn!(
                component = "monitor",
                event = "start_after_shutdown",
                instance_id = instance_id,
                "monitor is shut down, not starting"
            );
            return false;
        }

        let started = match self.monitors.entry(instance_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if !occupied.get().join.is_finished() {
                    return false;
                }
                occupied.insert(self.spawn(instance_id, manifest_type));
                true
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(self.spawn(instance_id, manifest_type));
                true
            }
        };
        meter::set_monitors_active(self.monitors.len());
        started
    }

    fn spawn(&self, instance_id: &str, manifest_type: &str) -> MonitorHandle {
        let token = self.shutdown.child_token();
        let snapshot = Arc::new(ArcSwap::from_pointee(MonitorSnapshot::discovering(instance_id)));
        let measurer = Measurer::new(
            instance_id,
            manifest_type,
            self.dispatcher.clone(),
            self.probe.clone(),
            self.settings.clone(),
            snapshot.clone(),
        );
        let join = tokio::spawn(measurer.run(token.clone()));
        MonitorHandle {
            token,
            snapshot,
            join,
        }
    }

    /// Signals the instance's measurer to stop at its next loop boundary.
    pub fn stop(&self, instance_id: &str) -> bool {
        let removed = self.monitors.remove(instance_id);
        meter::set_monitors_active(self.monitors.len());
        match removed {
            Some((_, handle)) => {
                handle.token.cancel();
                info!(
                    component = "monitor",
                    event = "stop_requested",
                    instance_id = instance_id,
                    "health monitor stop requested"
                );
                true
            }
            None => false,
        }
    }

    /// Stops every measurer and waits up to `timeout` for them to exit.
    pub async fn stop_all(&self, timeout: Duration) {
        self.shutdown.cancel();
        let ids: Vec<String> = self.monitors.iter().map(|e| e.key().clone()).collect();
        let mut joins = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some((_, handle)) = self.monitors.remove(&id) {
                joins.push(handle.join);
            }
        }
        meter::set_monitors_active(0);

        let count = joins.len();
        let all = futures::future::join_all(joins);
        if tokio::time::timeout(timeout, all).await.is_err() {
            warn!(
                component = "monitor",
                event = "stop_timeout",
                monitors = count,
                "not every health monitor exited within timeout"
            );
        }
    }

    pub fn is_monitoring(&self, instance_id: &str) -> bool {
        self.monitors
            .get(instance_id)
            .map(|h| !h.join.is_finished())
            .unwrap_or(false)
    }

    pub fn active(&self) -> usize {
        self.monitors.len()
    }

    pub fn snapshot(&self, instance_id: &str) -> Option<MonitorSnapshot> {
        self.monitors
            .get(instance_id)
            .map(|h| h.snapshot.load().as_ref().clone())
    }

    /// All snapshots, sorted by instance id.
    pub fn snapshots(&self) -> Vec<MonitorSnapshot> {
        let mut all: Vec<MonitorSnapshot> = self
            .monitors
            .iter()
            .map(|h| h.snapshot.load().as_ref().clone())
            .collect();
        all.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        all
    }
}
