//! JSON snapshot of the in-memory store.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

use crate::model::{Manifest, ServiceInstance, ServiceType};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub services: Vec<ServiceType>,
    #[serde(default)]
    pub manifests: Vec<Manifest>,
    #[serde(default)]
    pub instances: Vec<ServiceInstance>,
}

impl Snapshot {
    /// Reads a snapshot. A missing file yields `None`.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read(path)
            .with_context(|| format!("read store dump {:?}", path))?;
        let snapshot = serde_json::from_slice(&data)
            .with_context(|| format!("decode store dump {:?}", path))?;
        Ok(Some(snapshot))
    }

    /// Writes via a temp file and rename so a crash never leaves a torn dump.
    pub async fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("create dump dir {:?}", parent))?;
            }
        }
        let data = serde_json::to_vec_pretty(self).context("encode store dump")?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, data)
            .await
            .with_context(|| format!("write store dump {:?}", tmp))?;
        fs::rename(&tmp, path)
            .await
            .with_context(|| format!("rename store dump into {:?}", path))?;
        Ok(())
    }
}
