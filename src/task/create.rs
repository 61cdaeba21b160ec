use async_trait::async_trait;
use std::time::Instant;
use tracing::warn;

use super::{Entity, Outcome, Task, TaskContext, TaskKind, TaskRequest, TaskResponse};
use crate::dispatch::{CREATED_DESCRIPTION, CREATING_DESCRIPTION};
use crate::error::BrokerError;
use crate::model::{LastOperation, ManifestQuery, ServiceInstance, ServiceRequest};

pub const CREATED_MESSAGE: &str = "created";
pub const UNKNOWN_SERVICE_MESSAGE: &str = "Unrecognised service requested to be instantiated";

pub fn conflict_message(id: &str) -> String {
    format!("Service instance with id {id} already exists")
}

/// Provisions a new instance: records it as in progress, deploys, marks it succeeded.
///
/// The record is written before the backend is called so concurrent readers
/// see a coherent instance. A failed deployment leaves it in progress.
pub struct CreateInstance {
    entity: Entity,
    ctx: TaskContext,
}

impl CreateInstance {
    pub fn new(instance_id: impl Into<String>, request: ServiceRequest, ctx: TaskContext) -> Self {
        Self {
            entity: Entity::new(instance_id, TaskRequest::Provision(request)),
            ctx,
        }
    }
}

async fn create(entity: &mut Entity, ctx: &TaskContext) -> Result<Outcome, BrokerError> {
    let TaskRequest::Provision(request) = &entity.request else {
        return Err(BrokerError::BadRequest(
            "create requires a provisioning request".to_string(),
        ));
    };
    let id = entity.id.clone();
    if id.trim().is_empty() {
        return Err(BrokerError::BadRequest("instance id must not be empty".to_string()));
    }
    let store = ctx.store.as_ref();

    let (instance, manifest) = {
        let _guard = ctx.locks.lock(&id).await;
        if store.get_service_instance(&id).await?.is_some() {
            return Err(BrokerError::Conflict(conflict_message(&id)));
        }
        let service = store
            .get_service(&request.service_id)
            .await?
            .ok_or_else(|| BrokerError::NotFound(UNKNOWN_SERVICE_MESSAGE.to_string()))?;
        if service.plan(&request.plan_id).is_none() {
            return Err(BrokerError::NotFound(format!(
                "Plan {} not found.",
                request.plan_id
            )));
        }
        let manifest = store
            .get_manifest(ManifestQuery::ByPlan(&request.plan_id))
            .await?
            .ok_or_else(|| {
                BrokerError::NotFound(format!(
                    "no manifest for service {} found.",
                    request.plan_id
                ))
            })?;

        let instance = ServiceInstance::new(
            id.as_str(),
            manifest.id.as_str(),
            service,
            LastOperation::in_progress(CREATING_DESCRIPTION),
        );
        store.add_service_instance(instance.clone()).await?;
        (instance, manifest)
    };

    entity.response = TaskResponse::Instance(instance);
    ctx.dispatcher
        .create(
            &id,
            &manifest.manifest_content,
            &manifest.manifest_type,
            &request.parameters,
        )
        .await?;

    let _guard = ctx.locks.lock(&id).await;
    let Some(mut current) = store.get_service_instance(&id).await? else {
        warn!(
            component = "task",
            event = "deleted_during_create",
            instance_id = %id,
            "instance was deleted while its deployment was running"
        );
        return Err(BrokerError::Conflict(format!(
            "Service instance with id {id} was deleted while being created"
        )));
    };
    let op = LastOperation::succeeded(CREATED_DESCRIPTION);
    store.add_last_operation(&id, op.clone()).await?;
    current.state = op;
    entity.response = TaskResponse::Instance(current);

    Ok(Outcome::ok(CREATED_MESSAGE))
}

#[async_trait]
impl Task for CreateInstance {
    fn kind(&self) -> TaskKind {
        TaskKind::Create
    }

    fn entity_id(&self) -> &str {
        &self.entity.id
    }

    async fn run(self: Box<Self>) -> (Entity, TaskContext) {
        let Self { mut entity, mut ctx } = *self;
        let started = Instant::now();
        let result = create(&mut entity, &ctx).await;
        ctx.finish(TaskKind::Create, &entity.id, result, started);
        (entity, ctx)
    }
}
