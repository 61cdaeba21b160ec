// Package broker is the caller-facing facade: catalog management plus the
// instance lifecycle, run inline or handed to the async runner.


use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{BrokerError, STATUS_ACCEPTED};
use crate::model::{
    BindingRequest, Manifest, ManifestQuery, ServiceRequest, ServiceType, UnbindRequest,
    UpdateRequest,
};
use crate::monitor::{HealthMonitor, MonitorSnapshot};
use crate::runner::AsyncRunner;
use crate::task::{
    measure, retrieve, run_sequential, BindInstance, CreateInstance, DeleteInstance, Entity,
    MeasureInstance, Outcome, RetrieveAllInstances, RetrieveInstance, RetrieveLastOperation,
    Task, TaskContext, TaskResponse, UnbindInstance, UpdateInstance,
};

pub const ACCEPTED_MESSAGE: &str = "accepted";
pub const STOPPED_MEASURING_MESSAGE: &str = "stopped measuring.";
pub const NOT_MEASURING_MESSAGE: &str = "not measuring.";
pub const UNKNOWN_SERVICE_MESSAGE: &str = "no service found.";

/// Outcome of a lifecycle call plus whatever the task produced.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerReply {
    pub outcome: Outcome,
    pub response: TaskResponse,
}

impl BrokerReply {
    fn accepted() -> Self {
        Self {
            outcome: Outcome::new(ACCEPTED_MESSAGE, STATUS_ACCEPTED),
            response: TaskResponse::Empty,
        }
    }

    fn from_error(err: BrokerError) -> Self {
        Self {
            outcome: Outcome::from(err),
            response: TaskResponse::Empty,
        }
    }

    fn finished(entity: Entity, ctx: TaskContext) -> Self {
        Self {
            outcome: ctx.outcome,
            response: entity.response,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

pub struct Broker {
    ctx: TaskContext,
    runner: Arc<AsyncRunner>,
}

impl Broker {
    /// `ctx` is the template every task context is cloned from.
    pub fn new(ctx: TaskContext, runner: Arc<AsyncRunner>) -> Self {
        Self { ctx, runner }
    }

    pub fn runner(&self) -> &Arc<AsyncRunner> {
        &self.runner
    }

    pub fn monitor(&self) -> Option<&Arc<HealthMonitor>> {
        self.ctx.monitor.as_ref()
    }

    fn context(&self) -> TaskContext {
        let mut ctx = self.ctx.clone();
        ctx.outcome = Outcome::default();
        ctx
    }

    fn measures_after_create(&self) -> bool {
        self.ctx
            .monitor
            .as_ref()
            .map(|m| m.settings().enabled)
            .unwrap_or(false)
    }

    async fn run(&self, task: Box<dyn Task>) -> BrokerReply {
        let (entity, ctx) = task.run().await;
        BrokerReply::finished(entity, ctx)
    }

    fn submit(&self, tasks: Vec<Box<dyn Task>>) -> BrokerReply {
        match self.runner.submit(tasks) {
            Ok(()) => BrokerReply::accepted(),
            Err(err) => BrokerReply::from_error(err),
        }
    }

    // Catalog

    pub async fn catalog(&self) -> Result<Vec<ServiceType>, BrokerError> {
        self.ctx.store.list_services().await
    }

    /// Inserts the service type, replacing an existing one with the same id.
    pub async fn register_service(&self, service: ServiceType) -> Result<(), BrokerError> {
        if service.id.trim().is_empty() {
            return Err(BrokerError::BadRequest("service id must not be empty".to_string()));
        }
        let id = service.id.clone();
        self.ctx.store.add_service(service).await?;
        info!(component = "broker", event = "service_registered", service_id = %id, "service registered");
        Ok(())
    }

    pub async fn delete_service(&self, id: &str) -> Result<(), BrokerError> {
        if !self.ctx.store.delete_service(id).await? {
            return Err(BrokerError::NotFound(UNKNOWN_SERVICE_MESSAGE.to_string()));
        }
        info!(component = "broker", event = "service_deleted", service_id = %id, "service deleted");
        Ok(())
    }

    /// Stores a manifest under `id`. The referenced service and plan must exist.
    pub async fn store_manifest(&self, id: &str, mut manifest: Manifest) -> Result<(), BrokerError> {
        if id.trim().is_empty() {
            return Err(BrokerError::BadRequest("manifest id must not be empty".to_string()));
        }
        manifest.id = id.to_string();

        let service = self
            .ctx
            .store
            .get_service(&manifest.service_id)
            .await?
            .ok_or_else(|| BrokerError::NotFound(UNKNOWN_SERVICE_MESSAGE.to_string()))?;
        if service.plan(&manifest.plan_id).is_none() {
            return Err(BrokerError::NotFound(format!(
                "Plan {} not found.",
                manifest.plan_id
            )));
        }
        // Unknown types are logged here already, at registration time.
        self.ctx
            .dispatcher
            .resolve(&manifest.manifest_type)
            .map_err(|e| BrokerError::BadRequest(e.to_string()))?;

        self.ctx.store.add_manifest(manifest).await?;
        info!(component = "broker", event = "manifest_stored", manifest_id = %id, "manifest stored");
        Ok(())
    }

    pub async fn get_manifest(&self, id: &str) -> Result<Manifest, BrokerError> {
        self.ctx
            .store
            .get_manifest(ManifestQuery::ById(id))
            .await?
            .ok_or_else(|| BrokerError::NotFound(retrieve::NO_MANIFEST_MESSAGE.to_string()))
    }

    pub async fn list_manifests(&self) -> Result<Vec<Manifest>, BrokerError> {
        self.ctx.store.list_manifests().await
    }

    // Instances

    /// Creates an instance. With `accept_incomplete` the work is queued and
    /// 202 is returned at once; progress shows up in `last_operation`.
    pub async fn provision(
        &self,
        instance_id: &str,
        request: ServiceRequest,
        accept_incomplete: bool,
    ) -> BrokerReply {
        let create: Box<dyn Task> =
            Box::new(CreateInstance::new(instance_id, request, self.context()));

        if accept_incomplete {
            let mut chain = vec![create];
            if self.measures_after_create() {
                chain.push(Box::new(MeasureInstance::new(instance_id, self.context())));
            }
            return self.submit(chain);
        }

        let reply = self.run(create).await;
        if reply.is_success() && self.measures_after_create() {
            let measured = self.measure(instance_id).await;
            if !measured.is_success() {
                warn!(
                    component = "broker",
                    event = "measure_after_create_failed",
                    instance_id = instance_id,
                    status = measured.outcome.status,
                    message = %measured.outcome.message,
                    "instance created but monitoring did not start"
                );
            }
        }
        reply
    }

    pub async fn deprovision(&self, instance_id: &str, accept_incomplete: bool) -> BrokerReply {
        let delete: Box<dyn Task> = Box::new(DeleteInstance::new(instance_id, self.context()));
        if accept_incomplete {
            return self.submit(vec![delete]);
        }
        self.run(delete).await
    }

    pub async fn instance(&self, instance_id: &str) -> BrokerReply {
        self.run(Box::new(RetrieveInstance::new(instance_id, self.context())))
            .await
    }

    pub async fn instances(&self) -> BrokerReply {
        self.run(Box::new(RetrieveAllInstances::new(self.context())))
            .await
    }

    pub async fn last_operation(&self, instance_id: &str) -> BrokerReply {
        self.run(Box::new(RetrieveLastOperation::new(instance_id, self.context())))
            .await
    }

    pub async fn bind(&self, instance_id: &str, request: BindingRequest) -> BrokerReply {
        self.run(Box::new(BindInstance::new(instance_id, request, self.context())))
            .await
    }

    pub async fn unbind(&self, instance_id: &str, request: UnbindRequest) -> BrokerReply {
        self.run(Box::new(UnbindInstance::new(instance_id, request, self.context())))
            .await
    }

    pub async fn update(&self, instance_id: &str, request: UpdateRequest) -> BrokerReply {
        self.run(Box::new(UpdateInstance::new(instance_id, request, self.context())))
            .await
    }

    pub async fn measure(&self, instance_id: &str) -> BrokerReply {
        self.run(Box::new(MeasureInstance::new(instance_id, self.context())))
            .await
    }

    pub fn stop_measuring(&self, instance_id: &str) -> BrokerReply {
        let Some(monitor) = &self.ctx.monitor else {
            return BrokerReply::from_error(BrokerError::Unavailable(
                measure::MONITOR_DISABLED_MESSAGE.to_string(),
            ));
        };
        if monitor.stop(instance_id) {
            BrokerReply {
                outcome: Outcome::ok(STOPPED_MEASURING_MESSAGE),
                response: TaskResponse::Empty,
            }
        } else {
            BrokerReply::from_error(BrokerError::NotFound(NOT_MEASURING_MESSAGE.to_string()))
        }
    }

    /// Health snapshots of every running monitor; empty when monitoring is off.
    pub fn monitors(&self) -> Vec<MonitorSnapshot> {
        self.ctx
            .monitor
            .as_ref()
            .map(|m| m.snapshots())
            .unwrap_or_default()
    }

    /// Store open and every registered driver reachable.
    pub async fn is_ok(&self) -> bool {
        self.ctx.store.is_ok().await && self.ctx.dispatcher.is_ok().await
    }

    /// Runs an arbitrary chain inline.
    pub async fn run_chain(&self, tasks: Vec<Box<dyn Task>>) -> Option<BrokerReply> {
        run_sequential(tasks)
            .await
            .map(|(entity, ctx)| BrokerReply::finished(entity, ctx))
    }

    pub fn task_context(&self) -> TaskContext {
        self.context()
    }
}

#[async_trait::async_trait]
impl crate::liveness::Service for Broker {
    fn name(&self) -> &str {
        "broker"
    }

    async fn is_alive(&self) -> bool {
        self.is_ok().await
    }
}
