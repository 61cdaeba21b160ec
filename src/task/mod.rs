// Package task implements the lifecycle operations as self-contained units of work.
//
// A task owns an entity envelope (id, request, response) and a context holding
// the collaborators plus the outcome. Running it never fails: every error is
// folded into `TaskContext::outcome`.

pub mod bind;
pub mod create;
pub mod delete;
pub mod measure;
pub mod retrieve;
pub mod update;


use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::auth::Auth;
use crate::dispatch::ResourceDispatcher;
use crate::error::{BrokerError, STATUS_OK};
use crate::metrics::meter;
use crate::model::{
    BindingRequest, BindingResponse, LastOperation, ServiceInstance, ServiceRequest,
    UnbindRequest, UpdateRequest,
};
use crate::monitor::HealthMonitor;
use crate::store::{InstanceLocks, Store};

pub use bind::{BindInstance, UnbindInstance};
pub use create::CreateInstance;
pub use delete::DeleteInstance;
pub use measure::MeasureInstance;
pub use retrieve::{RetrieveAllInstances, RetrieveInstance, RetrieveLastOperation};
pub use update::UpdateInstance;

/// Caller-facing result of a task: a message and an HTTP-like status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub message: String,
    pub status: u16,
}

impl Outcome {
    pub fn new(message: impl Into<String>, status: u16) -> Self {
        Self {
            message: message.into(),
            status,
        }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(message, STATUS_OK)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl Default for Outcome {
    fn default() -> Self {
        Self::new("", 0)
    }
}

impl From<BrokerError> for Outcome {
    fn from(err: BrokerError) -> Self {
        Self::new(err.to_string(), err.status())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum TaskRequest {
    #[default]
    None,
    Provision(ServiceRequest),
    Bind(BindingRequest),
    Unbind(UnbindRequest),
    Update(UpdateRequest),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum TaskResponse {
    #[default]
    Empty,
    Instance(ServiceInstance),
    Instances(Vec<ServiceInstance>),
    LastOperation(LastOperation),
    Binding(BindingResponse),
}

/// The envelope a task reads its input from and writes its result into.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entity {
    pub id: String,
    pub request: TaskRequest,
    pub response: TaskResponse,
}

impl Entity {
    pub fn new(id: impl Into<String>, request: TaskRequest) -> Self {
        Self {
            id: id.into(),
            request,
            response: TaskResponse::Empty,
        }
    }
}

/// Collaborators shared by every task, plus the outcome of the last run.
#[derive(Clone)]
pub struct TaskContext {
    pub store: Arc<dyn Store>,
    pub dispatcher: Arc<ResourceDispatcher>,
    pub auth: Option<Arc<dyn Auth>>,
    pub monitor: Option<Arc<HealthMonitor>>,
    pub locks: InstanceLocks,
    pub outcome: Outcome,
}

impl TaskContext {
    pub fn new(store: Arc<dyn Store>, dispatcher: Arc<ResourceDispatcher>) -> Self {
        Self {
            store,
            dispatcher,
            auth: None,
            monitor: None,
            locks: InstanceLocks::new(),
            outcome: Outcome::default(),
        }
    }

    pub fn with_auth(mut self, auth: Arc<dyn Auth>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<HealthMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn with_locks(mut self, locks: InstanceLocks) -> Self {
        self.locks = locks;
        self
    }

    /// Records the outcome of a run, with logs and metrics.
    pub(crate) fn finish(
        &mut self,
        kind: TaskKind,
        entity_id: &str,
        result: Result<Outcome, BrokerError>,
        started: Instant,
    ) {
        let elapsed = started.elapsed();
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(
                    component = "task",
                    event = "failed",
                    task = kind.as_str(),
                    entity_id = entity_id,
                    kind = err.kind(),
                    status = err.status(),
                    error = %err,
                    "task failed"
                );
                Outcome::from(err)
            }
        };
        if outcome.is_success() {
            info!(
                component = "task",
                event = "finished",
                task = kind.as_str(),
                entity_id = entity_id,
                status = outcome.status,
                elapsed_ms = elapsed.as_millis() as u64,
                "{}",
                outcome.message
            );
        }
        meter::add_task(kind.as_str(), outcome.status);
        meter::observe_task_duration(kind.as_str(), elapsed.as_secs_f64());
        self.outcome = outcome;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Create,
    Delete,
    Retrieve,
    RetrieveAll,
    RetrieveLastOperation,
    Bind,
    Unbind,
    Update,
    Measure,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Create => "create",
            TaskKind::Delete => "delete",
            TaskKind::Retrieve => "retrieve",
            TaskKind::RetrieveAll => "retrieve_all",
            TaskKind::RetrieveLastOperation => "retrieve_last_operation",
            TaskKind::Bind => "bind",
            TaskKind::Unbind => "unbind",
            TaskKind::Update => "update",
            TaskKind::Measure => "measure",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of lifecycle work. Consumes itself and hands back the envelope and context.
#[async_trait]
pub trait Task: Send {
    fn kind(&self) -> TaskKind;

    fn entity_id(&self) -> &str;

    async fn run(self: Box<Self>) -> (Entity, TaskContext);
}

/// Runs tasks inline, in order, stopping after the first unsuccessful one.
///
/// Returns the envelope and context of the last task that ran, or `None` for
/// an empty list.
pub async fn run_sequential(tasks: Vec<Box<dyn Task>>) -> Option<(Entity, TaskContext)> {
    let mut last = None;
    for task in tasks {
        let kind = task.kind();
        let (entity, ctx) = task.run().await;
        let ok = ctx.outcome.is_success();
        if !ok {
            warn!(
                component = "task",
                event = "chain_stopped",
                task = kind.as_str(),
                entity_id = %entity.id,
                status = ctx.outcome.status,
                "task chain stopped after unsuccessful task"
            );
        }
        last = Some((entity, ctx));
        if !ok {
            break;
        }
    }
    last
}

/// Lookup helper shared by the instance tasks.
pub(crate) async fn require_instance(
    store: &dyn Store,
    id: &str,
) -> Result<ServiceInstance, BrokerError> {
    store
        .get_service_instance(id)
        .await?
        .ok_or_else(|| BrokerError::NotFound(retrieve::NO_INSTANCE_MESSAGE.to_string()))
}

/// Manifest type of the manifest the instance was created from.
pub(crate) async fn manifest_type_of(
    store: &dyn Store,
    instance: &ServiceInstance,
    missing_message: &str,
) -> Result<String, BrokerError> {
    let manifest_id = instance
        .manifest_id()
        .ok_or_else(|| BrokerError::NotFound(missing_message.to_string()))?;
    let manifest = store
        .get_manifest(crate::model::ManifestQuery::ById(manifest_id))
        .await?
        .ok_or_else(|| BrokerError::NotFound(missing_message.to_string()))?;
    Ok(manifest.manifest_type)
}
