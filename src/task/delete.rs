use async_trait::async_trait;
use std::time::Instant;

use super::{manifest_type_of, Entity, Outcome, Task, TaskContext, TaskKind, TaskRequest};
use crate::error::BrokerError;

pub const DELETED_MESSAGE: &str = "deleted";
pub const NOT_FOUND_MESSAGE: &str = "not found";
pub const NO_MANIFEST_MESSAGE: &str = "no service manifest found.";

/// Tears down the backend resources, then forgets the instance.
pub struct DeleteInstance {
    entity: Entity,
    ctx: TaskContext,
}

impl DeleteInstance {
    pub fn new(instance_id: impl Into<String>, ctx: TaskContext) -> Self {
        Self {
            entity: Entity::new(instance_id, TaskRequest::None),
            ctx,
        }
    }
}

async fn delete(entity: &Entity, ctx: &TaskContext) -> Result<Outcome, BrokerError> {
    let id = entity.id.as_str();
    let store = ctx.store.as_ref();

    let _guard = ctx.locks.lock(id).await;
    let Some(instance) = store.get_service_instance(id).await? else {
        return Err(BrokerError::NotFound(NOT_FOUND_MESSAGE.to_string()));
    };
    let manifest_type = manifest_type_of(store, &instance, NO_MANIFEST_MESSAGE).await?;

    ctx.dispatcher.delete(id, &manifest_type).await?;
    store.delete_service_instance(id).await?;
    if let Some(monitor) = &ctx.monitor {
        monitor.stop(id);
    }

    Ok(Outcome::ok(DELETED_MESSAGE))
}

#[async_trait]
impl Task for DeleteInstance {
    fn kind(&self) -> TaskKind {
        TaskKind::Delete
    }

    fn entity_id(&self) -> &str {
        &self.entity.id
    }

    async fn run(self: Box<Self>) -> (Entity, TaskContext) {
        let Self { entity, mut ctx } = *self;
        let started = Instant::now();
        let result = delete(&entity, &ctx).await;
        ctx.finish(TaskKind::Delete, &entity.id, result, started);
        (entity, ctx)
    }
}
