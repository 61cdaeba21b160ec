use async_trait::async_trait;
use std::time::Instant;

use super::{Entity, Task, TaskContext, TaskKind, TaskRequest};
use crate::error::BrokerError;
use crate::model::UpdateRequest;

pub const NOT_IMPLEMENTED_MESSAGE: &str = "Not implemented";

/// Plan or parameter changes on a live instance. Not supported by any backend.
pub struct UpdateInstance {
    entity: Entity,
    ctx: TaskContext,
}

impl UpdateInstance {
    pub fn new(instance_id: impl Into<String>, request: UpdateRequest, ctx: TaskContext) -> Self {
        Self {
            entity: Entity::new(instance_id, TaskRequest::Update(request)),
            ctx,
        }
    }
}

#[async_trait]
impl Task for UpdateInstance {
    fn kind(&self) -> TaskKind {
        TaskKind::Update
    }

    fn entity_id(&self) -> &str {
        &self.entity.id
    }

    async fn run(self: Box<Self>) -> (Entity, TaskContext) {
        let Self { entity, mut ctx } = *self;
        let started = Instant::now();
        ctx.finish(
            TaskKind::Update,
            &entity.id,
            Err(BrokerError::NotImplemented(NOT_IMPLEMENTED_MESSAGE.to_string())),
            started,
        );
        (entity, ctx)
    }
}
