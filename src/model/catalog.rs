//! Catalog entities: service types, their plans and the manifests bound to plans.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A purchasable variant of a service type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub free: bool,
    #[serde(default)]
    pub bindable: bool,
}

/// A catalog entry offered by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceType {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub bindable: bool,
    #[serde(default)]
    pub plans: Vec<Plan>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ServiceType {
    pub fn plan(&self, plan_id: &str) -> Option<&Plan> {
        self.plans.iter().find(|p| p.id == plan_id)
    }
}

/// A deployable template bound to exactly one plan.
///
/// `manifest_type` selects the backend driver and `manifest_content` is opaque
/// to everything except that driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub id: String,
    pub service_id: String,
    pub plan_id: String,
    pub manifest_type: String,
    pub manifest_content: String,
    #[serde(default)]
    pub endpoints: Option<serde_json::Value>,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

/// Lookup key for manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestQuery<'a> {
    ById(&'a str),
    ByPlan(&'a str),
}

impl ManifestQuery<'_> {
    pub fn matches(&self, manifest: &Manifest) -> bool {
        match self {
            ManifestQuery::ById(id) => manifest.id == *id,
            ManifestQuery::ByPlan(plan_id) => manifest.plan_id == *plan_id,
        }
    }
}
