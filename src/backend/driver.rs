use anyhow::Result;
use async_trait::async_trait;

use crate::model::{Attributes, Parameters};

/// Attribute key suffixes shared by every driver. Keys are `<resource><suffix>`.
pub const SUFFIX_IMAGE_NAME: &str = "_image_name";
pub const SUFFIX_IMAGE_ID: &str = "_image_id";
pub const SUFFIX_STATE: &str = "_state";
pub const SUFFIX_CMD: &str = "_cmd";
pub const SUFFIX_IP: &str = "_Ip";
pub const SUFFIX_ENVIRONMENT: &str = "_environment_";

/// A deployment technology the broker can drive.
///
/// `info` reports raw per-resource attributes; interpreting them into a
/// lifecycle state is the dispatcher's job.
#[async_trait]
pub trait BackendDriver: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create(
        &self,
        instance_id: &str,
        content: &str,
        manifest_type: &str,
        parameters: &Parameters,
    ) -> Result<()>;

    async fn info(&self, instance_id: &str, manifest_type: &str) -> Result<Attributes>;

    async fn delete(&self, instance_id: &str, manifest_type: &str) -> Result<()>;

    /// Cheap reachability check of the underlying platform.
    async fn is_ok(&self) -> bool;
}

/// Builds `<resource><suffix>`.
pub fn attr_key(resource: &str, suffix: &str) -> String {
    format!("{resource}{suffix}")
}
