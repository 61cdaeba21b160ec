use async_trait::async_trait;
use std::time::Instant;

use super::{
    manifest_type_of, require_instance, retrieve, Entity, Outcome, Task, TaskContext, TaskKind,
    TaskRequest,
};
use crate::error::BrokerError;

pub const MEASURING_MESSAGE: &str = "measuring.";
pub const ALREADY_MEASURING_MESSAGE: &str = "already measuring.";
pub const MONITOR_DISABLED_MESSAGE: &str = "health monitoring is disabled";

/// Starts health monitoring of an instance. Never changes its state.
pub struct MeasureInstance {
    entity: Entity,
    ctx: TaskContext,
}

impl MeasureInstance {
    pub fn new(instance_id: impl Into<String>, ctx: TaskContext) -> Self {
        Self {
            entity: Entity::new(instance_id, TaskRequest::None),
            ctx,
        }
    }
}

async fn measure(entity: &Entity, ctx: &TaskContext) -> Result<Outcome, BrokerError> {
    let monitor = ctx
        .monitor
        .as_ref()
        .ok_or_else(|| BrokerError::Unavailable(MONITOR_DISABLED_MESSAGE.to_string()))?;

    let manifest_type = {
        let _guard = ctx.locks.lock(&entity.id).await;
        let instance = require_instance(ctx.store.as_ref(), &entity.id).await?;
        manifest_type_of(ctx.store.as_ref(), &instance, retrieve::NO_MANIFEST_MESSAGE).await?
    };

    if monitor.start(&entity.id, &manifest_type) {
        Ok(Outcome::ok(MEASURING_MESSAGE))
    } else if monitor.is_monitoring(&entity.id) {
        Ok(Outcome::ok(ALREADY_MEASURING_MESSAGE))
    } else {
        Err(BrokerError::Unavailable(MONITOR_DISABLED_MESSAGE.to_string()))
    }
}

#[async_trait]
impl Task for MeasureInstance {
    fn kind(&self) -> TaskKind {
        TaskKind::Measure
    }

    fn entity_id(&self) -> &str {
        &self.entity.id
    }

    async fn run(self: Box<Self>) -> (Entity, TaskContext) {
        let Self { entity, mut ctx } = *self;
        let started = Instant::now();
        let result = measure(&entity, &ctx).await;
        ctx.finish(TaskKind::Measure, &entity.id, result, started);
        (entity, ctx)
    }
}
