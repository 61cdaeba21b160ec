//! Service instances and their lifecycle state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::catalog::ServiceType;

/// Flat attribute bag describing a running instance.
///
/// Ordered so that "first matching key" lookups are deterministic.
pub type Attributes = BTreeMap<String, String>;

pub const ID_KEY: &str = "id";
pub const MANIFEST_ID_KEY: &str = "manifest_id";
pub const BINDING_KEY: &str = "binding";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LifecycleState {
    #[default]
    #[serde(rename = "in progress")]
    InProgress,
    #[serde(rename = "succeeded")]
    Succeeded,
    #[serde(rename = "failed")]
    Failed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::InProgress => "in progress",
            LifecycleState::Succeeded => "succeeded",
            LifecycleState::Failed => "failed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of the most recent lifecycle action on an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LastOperation {
    pub state: LifecycleState,
    pub description: String,
}

impl LastOperation {
    pub fn new(state: LifecycleState, description: impl Into<String>) -> Self {
        Self {
            state,
            description: description.into(),
        }
    }

    pub fn in_progress(description: impl Into<String>) -> Self {
        Self::new(LifecycleState::InProgress, description)
    }

    pub fn succeeded(description: impl Into<String>) -> Self {
        Self::new(LifecycleState::Succeeded, description)
    }

    pub fn failed(description: impl Into<String>) -> Self {
        Self::new(LifecycleState::Failed, description)
    }

    pub fn is_failed(&self) -> bool {
        self.state == LifecycleState::Failed
    }
}

/// Credentials handed out by a successful bind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingResponse {
    pub binding_id: String,
    pub credentials: BTreeMap<String, String>,
}

/// A provisioned deployment of a service type.
///
/// `context` always carries `id` and `manifest_id`; everything else in it is
/// backend-reported runtime detail merged in on each refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub context: Attributes,
    pub service_type: ServiceType,
    pub state: LastOperation,
}

impl ServiceInstance {
    pub fn new(
        id: impl Into<String>,
        manifest_id: impl Into<String>,
        service_type: ServiceType,
        state: LastOperation,
    ) -> Self {
        let mut context = Attributes::new();
        context.insert(ID_KEY.to_string(), id.into());
        context.insert(MANIFEST_ID_KEY.to_string(), manifest_id.into());
        Self {
            context,
            service_type,
            state,
        }
    }

    pub fn id(&self) -> &str {
        self.context.get(ID_KEY).map(String::as_str).unwrap_or_default()
    }

    pub fn manifest_id(&self) -> Option<&str> {
        self.context.get(MANIFEST_ID_KEY).map(String::as_str)
    }

    /// Merges backend attributes into the context. Reserved keys are never overwritten.
    pub fn merge_attributes(&mut self, attributes: Attributes) {
        for (key, value) in attributes {
            if key == ID_KEY || key == MANIFEST_ID_KEY || key == BINDING_KEY {
                continue;
            }
            self.context.insert(key, value);
        }
    }

    pub fn binding(&self) -> Option<BindingResponse> {
        self.context
            .get(BINDING_KEY)
            .and_then(|raw| serde_json::from_str(raw).ok())
    }

    pub fn set_binding(&mut self, binding: &BindingResponse) -> serde_json::Result<()> {
        let raw = serde_json::to_string(binding)?;
        self.context.insert(BINDING_KEY.to_string(), raw);
        Ok(())
    }

    pub fn clear_binding(&mut self) -> Option<BindingResponse> {
        self.context
            .remove(BINDING_KEY)
            .and_then(|raw| serde_json::from_str(&raw).ok())
    }
}
