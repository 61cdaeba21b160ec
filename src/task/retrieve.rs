use async_trait::async_trait;
use std::time::Instant;

use super::{
    manifest_type_of, require_instance, Entity, Outcome, Task, TaskContext, TaskKind,
    TaskRequest, TaskResponse,
};
use crate::dedlog;
use crate::error::BrokerError;
use crate::model::ServiceInstance;

pub const NO_INSTANCE_MESSAGE: &str = "no service instance found.";
pub const FOUND_MESSAGE: &str = "service instance found.";
pub const ALL_FOUND_MESSAGE: &str = "service instances found.";
pub const NO_MANIFEST_MESSAGE: &str = "no manifest found.";
pub const CREATION_FAILED_MESSAGE: &str =
    "There has been a failure in creating the service instance.";

enum Refreshed {
    Current(ServiceInstance),
    Failed(ServiceInstance),
}

/// Pulls fresh backend state into the instance and persists it.
///
/// The caller must hold the instance lock.
async fn refresh(ctx: &TaskContext, mut instance: ServiceInstance) -> Result<Refreshed, BrokerError> {
    let id = instance.id().to_string();
    let manifest_type = manifest_type_of(ctx.store.as_ref(), &instance, NO_MANIFEST_MESSAGE).await?;
    let info = ctx.dispatcher.info(&id, &manifest_type).await?;

    instance.state = info.last_operation;
    instance.merge_attributes(info.attributes);
    ctx.store.add_service_instance(instance.clone()).await?;

    if instance.state.is_failed() {
        Ok(Refreshed::Failed(instance))
    } else {
        Ok(Refreshed::Current(instance))
    }
}

async fn retrieve(entity: &mut Entity, ctx: &TaskContext) -> Result<Outcome, BrokerError> {
    let _guard = ctx.locks.lock(&entity.id).await;
    let instance = require_instance(ctx.store.as_ref(), &entity.id).await?;
    match refresh(ctx, instance).await? {
        Refreshed::Current(instance) => {
            entity.response = TaskResponse::Instance(instance);
            Ok(Outcome::ok(FOUND_MESSAGE))
        }
        Refreshed::Failed(instance) => {
            entity.response = TaskResponse::Instance(instance);
            Err(BrokerError::BackendFailure(CREATION_FAILED_MESSAGE.to_string()))
        }
    }
}

/// Reads one instance and reconciles it against its backend.
pub struct RetrieveInstance {
    entity: Entity,
    ctx: TaskContext,
}

impl RetrieveInstance {
    pub fn new(instance_id: impl Into<String>, ctx: TaskContext) -> Self {
        Self {
            entity: Entity::new(instance_id, TaskRequest::None),
            ctx,
        }
    }
}

#[async_trait]
impl Task for RetrieveInstance {
    fn kind(&self) -> TaskKind {
        TaskKind::Retrieve
    }

    fn entity_id(&self) -> &str {
        &self.entity.id
    }

    async fn run(self: Box<Self>) -> (Entity, TaskContext) {
        let Self { mut entity, mut ctx } = *self;
        let started = Instant::now();
        let result = retrieve(&mut entity, &ctx).await;
        ctx.finish(TaskKind::Retrieve, &entity.id, result, started);
        (entity, ctx)
    }
}

/// Reconciles every stored instance. One bad instance never fails the batch;
/// it is returned as last stored.
pub struct RetrieveAllInstances {
    entity: Entity,
    ctx: TaskContext,
}

impl RetrieveAllInstances {
    pub fn new(ctx: TaskContext) -> Self {
        Self {
            entity: Entity::default(),
            ctx,
        }
    }
}

async fn retrieve_all(entity: &mut Entity, ctx: &TaskContext) -> Result<Outcome, BrokerError> {
    let listed = ctx.store.list_service_instances().await?;
    let mut instances = Vec::with_capacity(listed.len());

    for listed_instance in listed {
        let id = listed_instance.id().to_string();
        let _guard = ctx.locks.lock(&id).await;
        // It may have been deleted since the listing.
        let stored = match ctx.store.get_service_instance(&id).await {
            Ok(Some(stored)) => stored,
            Ok(None) => continue,
            Err(e) => {
                dedlog::err(Some(&e.to_string()), Some(&id), "could not re-read service instance");
                instances.push(listed_instance);
                continue;
            }
        };
        match refresh(ctx, stored.clone()).await {
            Ok(Refreshed::Current(instance)) | Ok(Refreshed::Failed(instance)) => {
                instances.push(instance)
            }
            Err(e) => {
                dedlog::err(Some(&e.to_string()), Some(&id), "could not refresh service instance");
                instances.push(stored);
            }
        }
    }

    entity.response = TaskResponse::Instances(instances);
    Ok(Outcome::ok(ALL_FOUND_MESSAGE))
}

#[async_trait]
impl Task for RetrieveAllInstances {
    fn kind(&self) -> TaskKind {
        TaskKind::RetrieveAll
    }

    fn entity_id(&self) -> &str {
        &self.entity.id
    }

    async fn run(self: Box<Self>) -> (Entity, TaskContext) {
        let Self { mut entity, mut ctx } = *self;
        let started = Instant::now();
        let result = retrieve_all(&mut entity, &ctx).await;
        ctx.finish(TaskKind::RetrieveAll, &entity.id, result, started);
        (entity, ctx)
    }
}

/// Same as [`RetrieveInstance`] but answers with the last operation only.
pub struct RetrieveLastOperation {
    entity: Entity,
    ctx: TaskContext,
}

impl RetrieveLastOperation {
    pub fn new(instance_id: impl Into<String>, ctx: TaskContext) -> Self {
        Self {
            entity: Entity::new(instance_id, TaskRequest::None),
            ctx,
        }
    }
}

#[async_trait]
impl Task for RetrieveLastOperation {
    fn kind(&self) -> TaskKind {
        TaskKind::RetrieveLastOperation
    }

    fn entity_id(&self) -> &str {
        &self.entity.id
    }

    async fn run(self: Box<Self>) -> (Entity, TaskContext) {
        let Self { mut entity, mut ctx } = *self;
        let started = Instant::now();
        let result = retrieve(&mut entity, &ctx).await;
        if let TaskResponse::Instance(instance) = std::mem::take(&mut entity.response) {
            entity.response = TaskResponse::LastOperation(instance.state);
        }
        ctx.finish(TaskKind::RetrieveLastOperation, &entity.id, result, started);
        (entity, ctx)
    }
}
