//! Folds per-resource states reported by a driver into one lifecycle state.

use crate::backend::driver::{SUFFIX_ENVIRONMENT, SUFFIX_STATE};
use crate::model::{Attributes, LastOperation};

pub const CREATING_DESCRIPTION: &str = "The service instance is being created.";
pub const CREATED_DESCRIPTION: &str = "The service instance has been created successfully";

/// Observed state of one resource (container, pod, VDU).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceState {
    Running,
    Pending(String),
    Exited(String),
    Failed(String),
}

impl ResourceState {
    /// Interprets the raw state strings drivers emit.
    ///
    /// `Up`/`Running`/`Ready` are running, and so is `Completed` (a pod that
    /// ran to success). Anything starting with `Exit` has exited. `Failed` and
    /// `Error` prefixes are failures. The rest is pending.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let lower = trimmed.to_ascii_lowercase();
        match lower.as_str() {
            "up" | "running" | "ready" | "active" | "completed" => ResourceState::Running,
            s if s.starts_with("exit") => ResourceState::Exited(trimmed.to_string()),
            s if s.starts_with("failed") || s.starts_with("error") || s == "crashed" => {
                ResourceState::Failed(trimmed.to_string())
            }
            _ => ResourceState::Pending(trimmed.to_string()),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ResourceState::Running)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ResourceState::Exited(_) | ResourceState::Failed(_))
    }

    pub fn raw(&self) -> &str {
        match self {
            ResourceState::Running => "Up",
            ResourceState::Pending(raw) | ResourceState::Exited(raw) | ResourceState::Failed(raw) => {
                raw.as_str()
            }
        }
    }
}

pub fn failed_description(raw: &str) -> String {
    format!("There was an error in creating the instance: {raw}")
}

/// State values of every `<resource>_state` key, in key order.
pub fn collect_states(attributes: &Attributes) -> Vec<ResourceState> {
    attributes
        .iter()
        .filter(|(k, _)| k.ends_with(SUFFIX_STATE) && !k.contains(SUFFIX_ENVIRONMENT))
        .map(|(_, v)| ResourceState::parse(v))
        .collect()
}

/// Any failure wins; otherwise all-running is success; anything else is in progress.
pub fn reconcile(states: &[ResourceState]) -> LastOperation {
    if let Some(bad) = states.iter().find(|s| s.is_failure()) {
        return LastOperation::failed(failed_description(bad.raw()));
    }
    if !states.is_empty() && states.iter().all(ResourceState::is_running) {
        return LastOperation::succeeded(CREATED_DESCRIPTION);
    }
    LastOperation::in_progress(CREATING_DESCRIPTION)
}

pub fn reconcile_attributes(attributes: &Attributes) -> LastOperation {
    reconcile(&collect_states(attributes))
}
