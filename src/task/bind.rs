use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use super::{require_instance, Entity, Outcome, Task, TaskContext, TaskKind, TaskRequest, TaskResponse};
use crate::auth::Auth;
use crate::error::BrokerError;
use crate::model::{BindingRequest, BindingResponse, UnbindRequest};

pub const BOUND_MESSAGE: &str = "bound.";
pub const UNBOUND_MESSAGE: &str = "unbound.";
pub const NOT_BINDABLE_MESSAGE: &str =
    "The service instance does not support (un)service binding";

fn auth_of(ctx: &TaskContext) -> Result<&Arc<dyn Auth>, BrokerError> {
    ctx.auth
        .as_ref()
        .ok_or_else(|| BrokerError::Configuration("no credential issuer configured".to_string()))
}

/// Issues credentials for a bindable instance and stores them on it.
pub struct BindInstance {
    entity: Entity,
    ctx: TaskContext,
}

impl BindInstance {
    pub fn new(instance_id: impl Into<String>, request: BindingRequest, ctx: TaskContext) -> Self {
        Self {
            entity: Entity::new(instance_id, TaskRequest::Bind(request)),
            ctx,
        }
    }
}

async fn bind(entity: &mut Entity, ctx: &TaskContext) -> Result<Outcome, BrokerError> {
    let TaskRequest::Bind(request) = &entity.request else {
        return Err(BrokerError::BadRequest("bind requires a binding request".to_string()));
    };
    if request.binding_id.trim().is_empty() {
        return Err(BrokerError::BadRequest("binding id must not be empty".to_string()));
    }
    let auth = auth_of(ctx)?;
    let id = entity.id.as_str();

    let _guard = ctx.locks.lock(id).await;
    let mut instance = require_instance(ctx.store.as_ref(), id).await?;
    if !instance.service_type.bindable {
        entity.response = TaskResponse::Instance(instance);
        return Err(BrokerError::BadRequest(NOT_BINDABLE_MESSAGE.to_string()));
    }
    if let Some(existing) = instance.binding() {
        return Err(BrokerError::Conflict(format!(
            "Service instance {id} is already bound by binding {}",
            existing.binding_id
        )));
    }

    let credentials = auth
        .create_credentials(&request.binding_id, id)
        .await
        .map_err(|e| BrokerError::backend("credential issuance failed", &e))?;
    let binding = BindingResponse {
        binding_id: request.binding_id.clone(),
        credentials,
    };
    instance
        .set_binding(&binding)
        .map_err(|e| BrokerError::Store(format!("encode binding: {e}")))?;

    if let Err(err) = ctx.store.add_service_instance(instance).await {
        // Do not leave live credentials behind for a binding nobody recorded.
        if let Err(revoke) = auth.delete_credentials(&binding.credentials).await {
            warn!(
                component = "task",
                event = "revoke_failed",
                instance_id = id,
                error = %revoke,
                "could not revoke credentials of an unrecorded binding"
            );
        }
        return Err(err);
    }

    entity.response = TaskResponse::Binding(binding);
    Ok(Outcome::ok(BOUND_MESSAGE))
}

#[async_trait]
impl Task for BindInstance {
    fn kind(&self) -> TaskKind {
        TaskKind::Bind
    }

    fn entity_id(&self) -> &str {
        &self.entity.id
    }

    async fn run(self: Box<Self>) -> (Entity, TaskContext) {
        let Self { mut entity, mut ctx } = *self;
        let started = Instant::now();
        let result = bind(&mut entity, &ctx).await;
        ctx.finish(TaskKind::Bind, &entity.id, result, started);
        (entity, ctx)
    }
}

/// Revokes the instance's credentials and drops the binding from it.
pub struct UnbindInstance {
    entity: Entity,
    ctx: TaskContext,
}

impl UnbindInstance {
    pub fn new(instance_id: impl Into<String>, request: UnbindRequest, ctx: TaskContext) -> Self {
        Self {
            entity: Entity::new(instance_id, TaskRequest::Unbind(request)),
            ctx,
        }
    }
}

async fn unbind(entity: &mut Entity, ctx: &TaskContext) -> Result<Outcome, BrokerError> {
    let TaskRequest::Unbind(request) = &entity.request else {
        return Err(BrokerError::BadRequest("unbind requires an unbind request".to_string()));
    };
    let auth = auth_of(ctx)?;
    let id = entity.id.as_str();

    let _guard = ctx.locks.lock(id).await;
    let mut instance = require_instance(ctx.store.as_ref(), id).await?;
    if !instance.service_type.bindable {
        entity.response = TaskResponse::Instance(instance);
        return Err(BrokerError::BadRequest(NOT_BINDABLE_MESSAGE.to_string()));
    }
    let binding = match instance.binding() {
        Some(binding) if binding.binding_id == request.binding_id => binding,
        _ => {
            return Err(BrokerError::NotFound(format!(
                "binding {} not found for service instance {id}",
                request.binding_id
            )))
        }
    };

    auth.delete_credentials(&binding.credentials)
        .await
        .map_err(|e| BrokerError::backend("credential revocation failed", &e))?;
    instance.clear_binding();
    ctx.store.add_service_instance(instance).await?;

    entity.response = TaskResponse::Empty;
    Ok(Outcome::ok(UNBOUND_MESSAGE))
}

#[async_trait]
impl Task for UnbindInstance {
    fn kind(&self) -> TaskKind {
        TaskKind::Unbind
    }

    fn entity_id(&self) -> &str {
        &self.entity.id
    }

    async fn run(self: Box<Self>) -> (Entity, TaskContext) {
        let Self { mut entity, mut ctx } = *self;
        let started = Instant::now();
        let result = unbind(&mut entity, &ctx).await;
        ctx.finish(TaskKind::Unbind, &entity.id, result, started);
        (entity, ctx)
    }
}
