//! Driver that deploys nothing and reports a fixed attribute bag.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tracing::info;

use super::driver::BackendDriver;
use super::DRIVER_NOOP;
use crate::model::{Attributes, Parameters};

pub struct NoopDriver {
    fixture: Attributes,
}

impl Default for NoopDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl NoopDriver {
    /// Two running resources, one of them exposing a mapped port.
    pub fn new() -> Self {
        let image = "elastest/ebs-spark-base:0.5.0";
        let image_id = "sha256:138a91572bd6bdce7d7b49a44b91a4caf4abdf1a75f105991e18be971353d5cb";
        let fixture = Attributes::from([
            ("spark-worker_image_name".to_string(), image.to_string()),
            ("spark-worker_image_id".to_string(), image_id.to_string()),
            ("spark-worker_8081/tcp/HostIp".to_string(), "0.0.0.0".to_string()),
            ("spark-worker_8081/tcp/HostPort".to_string(), "32784".to_string()),
            (
                "spark-worker_cmd".to_string(),
                "/usr/bin/supervisord --configuration=/opt/conf/slave.conf".to_string(),
            ),
            ("spark-worker_state".to_string(), "Up".to_string()),
            ("spark-master_image_name".to_string(), image.to_string()),
            ("spark-master_image_id".to_string(), image_id.to_string()),
            ("spark-master_8080/tcp/HostIp".to_string(), "0.0.0.0".to_string()),
            ("spark-master_8080/tcp/HostPort".to_string(), "8080".to_string()),
            (
                "spark-master_cmd".to_string(),
                "/usr/bin/supervisord --configuration=/opt/conf/master.conf".to_string(),
            ),
            ("spark-master_state".to_string(), "Up".to_string()),
        ]);
        Self { fixture }
    }

    pub fn with_fixture(fixture: Attributes) -> Self {
        Self { fixture }
    }

    /// Loads the fixture from a YAML (or JSON) map of strings.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read noop fixture {:?}", path))?;
        let fixture: Attributes = serde_yaml::from_str(&raw)
            .with_context(|| format!("decode noop fixture {:?}", path))?;
        Ok(Self { fixture })
    }
}

#[async_trait]
impl BackendDriver for NoopDriver {
    fn name(&self) -> &'static str {
        DRIVER_NOOP
    }

    async fn create(
        &self,
        instance_id: &str,
        _content: &str,
        manifest_type: &str,
        parameters: &Parameters,
    ) -> Result<()> {
        info!(
            component = "backend",
            driver = DRIVER_NOOP,
            event = "create",
            instance_id = instance_id,
            manifest_type = manifest_type,
            parameters = parameters.len(),
            "noop create"
        );
        Ok(())
    }

    async fn info(&self, instance_id: &str, _manifest_type: &str) -> Result<Attributes> {
        info!(
            component = "backend",
            driver = DRIVER_NOOP,
            event = "info",
            instance_id = instance_id,
            "noop info"
        );
        Ok(self.fixture.clone())
    }

    async fn delete(&self, instance_id: &str, _manifest_type: &str) -> Result<()> {
        info!(
            component = "backend",
            driver = DRIVER_NOOP,
            event = "delete",
            instance_id = instance_id,
            "noop delete"
        );
        Ok(())
    }

    async fn is_ok(&self) -> bool {
        true
    }
}
