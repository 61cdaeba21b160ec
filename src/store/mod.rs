// Package store owns all durable broker state: catalog, manifests and instances.

pub mod dump;
pub mod lock;
pub mod memory;


use async_trait::async_trait;

use crate::error::BrokerError;
use crate::model::{LastOperation, Manifest, ManifestQuery, ServiceInstance, ServiceType};

pub use lock::{InstanceGuard, InstanceLocks};
pub use memory::InMemoryStore;

pub type StoreResult<T> = std::result::Result<T, BrokerError>;

/// Persistence contract shared by every task.
///
/// Catalog and instance writes are upserts; manifests are insert-only.
#[async_trait]
pub trait Store: Send + Sync {
    async fn add_service(&self, service: ServiceType) -> StoreResult<()>;
    async fn get_service(&self, id: &str) -> StoreResult<Option<ServiceType>>;
    async fn list_services(&self) -> StoreResult<Vec<ServiceType>>;
    async fn delete_service(&self, id: &str) -> StoreResult<bool>;

    /// Fails with `Conflict` on a duplicate id or when the plan already has a manifest.
    async fn add_manifest(&self, manifest: Manifest) -> StoreResult<()>;
    async fn get_manifest(&self, query: ManifestQuery<'_>) -> StoreResult<Option<Manifest>>;
    async fn list_manifests(&self) -> StoreResult<Vec<Manifest>>;
    async fn delete_manifest(&self, id: &str) -> StoreResult<bool>;

    async fn add_service_instance(&self, instance: ServiceInstance) -> StoreResult<()>;
    async fn get_service_instance(&self, id: &str) -> StoreResult<Option<ServiceInstance>>;
    async fn list_service_instances(&self) -> StoreResult<Vec<ServiceInstance>>;
    async fn delete_service_instance(&self, id: &str) -> StoreResult<bool>;

    /// Overwrites the embedded last operation of an existing instance.
    async fn add_last_operation(&self, instance_id: &str, op: LastOperation) -> StoreResult<()>;
    async fn get_last_operation(&self, instance_id: &str) -> StoreResult<Option<LastOperation>>;
    /// Resets the embedded last operation to its default (in progress, no description).
    async fn delete_last_operation(&self, instance_id: &str) -> StoreResult<bool>;

    async fn is_ok(&self) -> bool;

    /// Flushes and releases resources. Further writes fail with `Store`.
    async fn close(&self) -> anyhow::Result<()>;
}
