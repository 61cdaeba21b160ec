// Catalog fixtures and a wired-up task context over a scripted driver.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::drivers::{running_attrs, ScriptedDriver};
use super::health::StubProbe;
use crate::auth::StaticAuth;
use crate::backend::DRIVER_COMPOSE;
use crate::config::MonitorSettings;
use crate::dispatch::{ResourceDispatcher, CREATED_DESCRIPTION};
use crate::model::{LastOperation, Manifest, Plan, ServiceInstance, ServiceType};
use crate::monitor::HealthMonitor;
use crate::store::{InMemoryStore, InstanceLocks, Store};
use crate::task::TaskContext;

pub const SERVICE_ID: &str = "svc-nginx";
pub const PLAN_ID: &str = "plan-small";
pub const MANIFEST_ID: &str = "mf-nginx";
pub const INSTANCE_IP: &str = "10.0.0.5";

pub fn plan(id: &str) -> Plan {
    Plan {
        id: id.to_string(),
        name: format!("{id}-name"),
        description: "a small plan".to_string(),
        free: true,
        bindable: true,
    }
}

pub fn service_type(bindable: bool) -> ServiceType {
    ServiceType {
        id: SERVICE_ID.to_string(),
        name: "nginx".to_string(),
        description: "nginx web server".to_string(),
        bindable,
        plans: vec![plan(PLAN_ID)],
        metadata: BTreeMap::new(),
    }
}

pub fn manifest(manifest_type: &str) -> Manifest {
    Manifest {
        id: MANIFEST_ID.to_string(),
        service_id: SERVICE_ID.to_string(),
        plan_id: PLAN_ID.to_string(),
        manifest_type: manifest_type.to_string(),
        manifest_content: "services:\n  web:\n    image: nginx:latest\n".to_string(),
        endpoints: None,
        config: None,
    }
}

pub fn fast_monitor_settings() -> MonitorSettings {
    MonitorSettings {
        enabled: true,
        interval: Duration::from_millis(20),
        max_retries: 3,
        retry_delay: Duration::from_millis(10),
        port: 56567,
        path: "/health".to_string(),
        timeout: Duration::from_secs(1),
    }
}

/// Store, dispatcher and collaborators sharing one scripted "docker" driver.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub driver: ScriptedDriver,
    pub dispatcher: Arc<ResourceDispatcher>,
    pub auth: Arc<StaticAuth>,
    pub probe: StubProbe,
    pub monitor: Arc<HealthMonitor>,
    pub locks: InstanceLocks,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        let driver = ScriptedDriver::new(DRIVER_COMPOSE).with_steady(running_attrs(INSTANCE_IP));
        let dispatcher = Arc::new(
            ResourceDispatcher::builder()
                .driver(DRIVER_COMPOSE, Arc::new(driver.clone()))
                .build(),
        );
        let probe = StubProbe::new();
        let monitor = Arc::new(HealthMonitor::new(
            dispatcher.clone(),
            Arc::new(probe.clone()),
            fast_monitor_settings(),
        ));
        Self {
            store: Arc::new(InMemoryStore::new()),
            driver,
            dispatcher,
            auth: Arc::new(StaticAuth::new("svc")),
            probe,
            monitor,
            locks: InstanceLocks::new(),
        }
    }

    /// Context without a monitor.
    pub fn ctx(&self) -> TaskContext {
        TaskContext::new(self.store.clone(), self.dispatcher.clone())
            .with_auth(self.auth.clone())
            .with_locks(self.locks.clone())
    }

    pub fn ctx_with_monitor(&self) -> TaskContext {
        self.ctx().with_monitor(self.monitor.clone())
    }

    /// Registers the service type and its "docker" manifest.
    pub async fn seed_catalog(&self, bindable: bool) {
        self.store.add_service(service_type(bindable)).await.unwrap();
        self.store.add_manifest(manifest("docker")).await.unwrap();
    }

    /// Stores an instance directly, bypassing the create task.
    pub async fn seed_instance(&self, id: &str, bindable: bool) -> ServiceInstance {
        let instance = ServiceInstance::new(
            id,
            MANIFEST_ID,
            service_type(bindable),
            LastOperation::succeeded(CREATED_DESCRIPTION),
        );
        self.store.add_service_instance(instance.clone()).await.unwrap();
        instance
    }

    pub async fn stored(&self, id: &str) -> Option<ServiceInstance> {
        self.store.get_service_instance(id).await.unwrap()
    }
}
