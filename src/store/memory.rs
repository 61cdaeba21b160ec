//! DashMap-backed store with an optional JSON dump on close.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use super::dump::Snapshot;
use super::{Store, StoreResult};
use crate::error::BrokerError;
use crate::model::{LastOperation, Manifest, ManifestQuery, ServiceInstance, ServiceType};

pub struct InMemoryStore {
    services: DashMap<String, ServiceType>,
    manifests: DashMap<String, Manifest>,
    instances: DashMap<String, ServiceInstance>,
    // Manifest inserts check two keys (id and plan), so they go one at a time.
    manifest_writes: Mutex<()>,
    closed: AtomicBool,
    dump_file: Option<PathBuf>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
            manifests: DashMap::new(),
            instances: DashMap::new(),
            manifest_writes: Mutex::new(()),
            closed: AtomicBool::new(false),
            dump_file: None,
        }
    }

    /// Creates a store that restores from and dumps to `dump_file` when given.
    pub fn open(dump_file: Option<PathBuf>) -> Result<Self> {
        let mut store = Self::new();
        if let Some(path) = dump_file {
            if let Some(snapshot) = Snapshot::read(&path)? {
                info!(
                    component = "store",
                    event = "dump_loaded",
                    path = ?path,
                    services = snapshot.services.len(),
                    manifests = snapshot.manifests.len(),
                    instances = snapshot.instances.len(),
                    "store restored from dump"
                );
                store.restore(snapshot);
            }
            store.dump_file = Some(path);
        }
        Ok(store)
    }

    fn restore(&self, snapshot: Snapshot) {
        for s in snapshot.services {
            self.services.insert(s.id.clone(), s);
        }
        for m in snapshot.manifests {
            self.manifests.insert(m.id.clone(), m);
        }
        for i in snapshot.instances {
            self.instances.insert(i.id().to_string(), i);
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            services: self.services.iter().map(|e| e.value().clone()).collect(),
            manifests: self.manifests.iter().map(|e| e.value().clone()).collect(),
            instances: self.instances.iter().map(|e| e.value().clone()).collect(),
        }
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Store("store is closed".to_string()));
        }
        Ok(())
    }
}

fn sorted<T, F: Fn(&T) -> &str>(mut items: Vec<T>, key: F) -> Vec<T> {
    items.sort_by(|a, b| key(a).cmp(key(b)));
    items
}

#[async_trait]
impl Store for InMemoryStore {
    async fn add_service(&self, service: ServiceType) -> StoreResult<()> {
        self.ensure_open()?;
        self.services.insert(service.id.clone(), service);
        Ok(())
    }

    async fn get_service(&self, id: &str) -> StoreResult<Option<ServiceType>> {
        Ok(self.services.get(id).map(|s| s.value().clone()))
    }

    async fn list_services(&self) -> StoreResult<Vec<ServiceType>> {
        let items = self.services.iter().map(|e| e.value().clone()).collect();
        Ok(sorted(items, |s: &ServiceType| s.id.as_str()))
    }

    async fn delete_service(&self, id: &str) -> StoreResult<bool> {
        self.ensure_open()?;
        Ok(self.services.remove(id).is_some())
    }

    async fn add_manifest(&self, manifest: Manifest) -> StoreResult<()> {
        self.ensure_open()?;
        let _serial = self.manifest_writes.lock();

        if self
            .manifests
            .iter()
            .any(|m| m.value().plan_id == manifest.plan_id && m.key() != &manifest.id)
        {
            return Err(BrokerError::Conflict(format!(
                "plan {} already has a manifest",
                manifest.plan_id
            )));
        }

        match self.manifests.entry(manifest.id.clone()) {
            Entry::Occupied(_) => Err(BrokerError::Conflict(format!(
                "manifest with id {} already exists",
                manifest.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(manifest);
                Ok(())
            }
        }
    }

    async fn get_manifest(&self, query: ManifestQuery<'_>) -> StoreResult<Option<Manifest>> {
        let found = match query {
            ManifestQuery::ById(id) => self.manifests.get(id).map(|m| m.value().clone()),
            ManifestQuery::ByPlan(_) => self
                .manifests
                .iter()
                .find(|m| query.matches(m.value()))
                .map(|m| m.value().clone()),
        };
        Ok(found)
    }

    async fn list_manifests(&self) -> StoreResult<Vec<Manifest>> {
        let items = self.manifests.iter().map(|e| e.value().clone()).collect();
        Ok(sorted(items, |m: &Manifest| m.id.as_str()))
    }

    async fn delete_manifest(&self, id: &str) -> StoreResult<bool> {
        self.ensure_open()?;
        Ok(self.manifests.remove(id).is_some())
    }

    async fn add_service_instance(&self, instance: ServiceInstance) -> StoreResult<()> {
        self.ensure_open()?;
        if instance.id().is_empty() {
            return Err(BrokerError::BadRequest(
                "service instance has no id".to_string(),
            ));
        }
        self.instances.insert(instance.id().to_string(), instance);
        Ok(())
    }

    async fn get_service_instance(&self, id: &str) -> StoreResult<Option<ServiceInstance>> {
        Ok(self.instances.get(id).map(|i| i.value().clone()))
    }

    async fn list_service_instances(&self) -> StoreResult<Vec<ServiceInstance>> {
        let items = self.instances.iter().map(|e| e.value().clone()).collect();
        Ok(sorted(items, |i: &ServiceInstance| i.id()))
    }

    async fn delete_service_instance(&self, id: &str) -> StoreResult<bool> {
        self.ensure_open()?;
        Ok(self.instances.remove(id).is_some())
    }

    async fn add_last_operation(&self, instance_id: &str, op: LastOperation) -> StoreResult<()> {
        self.ensure_open()?;
        match self.instances.get_mut(instance_id) {
            Some(mut inst) => {
                inst.state = op;
                Ok(())
            }
            None => Err(BrokerError::NotFound(format!(
                "service instance {instance_id} not found"
            ))),
        }
    }

    async fn get_last_operation(&self, instance_id: &str) -> StoreResult<Option<LastOperation>> {
        Ok(self.instances.get(instance_id).map(|i| i.state.clone()))
    }

    async fn delete_last_operation(&self, instance_id: &str) -> StoreResult<bool> {
        self.ensure_open()?;
        match self.instances.get_mut(instance_id) {
            Some(mut inst) => {
                inst.state = LastOperation::default();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn is_ok(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let Some(path) = self.dump_file.as_ref() else {
            return Ok(());
        };
        let snapshot = self.snapshot();
        match snapshot.write(path).await {
            Ok(()) => {
                info!(
                    component = "store",
                    event = "dump_written",
                    path = ?path,
                    instances = snapshot.instances.len(),
                    "store dumped"
                );
                Ok(())
            }
            Err(e) => {
                warn!(
                    component = "store",
                    event = "dump_failed",
                    path = ?path,
                    error = %e,
                    "store dump failed"
                );
                Err(e)
            }
        }
    }
}
