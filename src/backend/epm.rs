//! Remote package manager driver: ships the manifest as a tar.gz package over HTTP.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use hyper::Method;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

use super::driver::{
    attr_key, BackendDriver, SUFFIX_IMAGE_ID, SUFFIX_IMAGE_NAME, SUFFIX_IP, SUFFIX_STATE,
};
use super::manifest::{
    instance_dir, normalize_newlines, prepare_instance_dir, remove_instance_dir,
};
use super::DRIVER_EPM;
use crate::http::client::{self, HyperClient};
use crate::model::{Attributes, Parameters};

pub const METADATA_FILE: &str = "metadata.yaml";
pub const RESOURCE_GROUP_FILE: &str = "resource_group";

#[derive(Debug, Clone)]
pub struct EpmSettings {
    pub work_dir: PathBuf,
    pub api: String,
    pub timeout: Duration,
}

pub struct EpmDriver {
    settings: EpmSettings,
    client: HyperClient,
}

#[derive(Debug, Serialize)]
struct PackageMetadata<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    manifest_type: &'a str,
    parameters: &'a Parameters,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroup {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub vdus: Vec<Vdu>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Vdu {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub image_name: String,
    #[serde(default)]
    pub compute_id: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub status: String,
}

fn manifest_file_name(manifest_type: &str) -> &'static str {
    if manifest_type.contains("compose") || manifest_type == "epm" {
        "docker-compose.yml"
    } else {
        "manifest.yml"
    }
}

fn append_file<W: std::io::Write>(
    builder: &mut tar::Builder<W>,
    name: &str,
    data: &[u8],
) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, name, data)
        .with_context(|| format!("add {name} to package"))
}

/// Builds the gzip'd tarball holding the package metadata and the manifest.
pub fn build_package(
    instance_id: &str,
    content: &str,
    manifest_type: &str,
    parameters: &Parameters,
) -> Result<Vec<u8>> {
    let metadata = serde_yaml::to_string(&PackageMetadata {
        name: instance_id,
        manifest_type,
        parameters,
    })
    .context("render package metadata")?;

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    append_file(&mut builder, METADATA_FILE, metadata.as_bytes())?;
    append_file(&mut builder, manifest_file_name(manifest_type), content.as_bytes())?;
    let encoder = builder.into_inner().context("finish package archive")?;
    encoder.finish().context("finish package compression")
}

fn multipart_body(boundary: &str, filename: &str, payload: &[u8]) -> Bytes {
    let mut body = Vec::with_capacity(payload.len() + 256);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/gzip\r\n\r\n");
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    Bytes::from(body)
}

pub fn attributes_from_resource_group(group: &ResourceGroup) -> Attributes {
    let mut attrs = Attributes::new();
    for vdu in &group.vdus {
        let name = vdu.name.as_str();
        attrs.insert(attr_key(name, SUFFIX_IMAGE_NAME), vdu.image_name.clone());
        attrs.insert(attr_key(name, SUFFIX_IMAGE_ID), vdu.compute_id.clone());
        if !vdu.ip.is_empty() {
            attrs.insert(attr_key(name, SUFFIX_IP), vdu.ip.clone());
        }
        attrs.insert(attr_key(name, SUFFIX_STATE), vdu.status.clone());
    }
    attrs
}

impl EpmDriver {
    pub fn new(settings: EpmSettings, client: HyperClient) -> Self {
        Self { settings, client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.api.trim_end_matches('/'), path)
    }

    async fn read_resource_group(dir: &Path) -> Result<Option<String>> {
        let file = dir.join(RESOURCE_GROUP_FILE);
        if !fs::try_exists(&file).await.unwrap_or(false) {
            return Ok(None);
        }
        let id = fs::read_to_string(&file)
            .await
            .with_context(|| format!("read {:?}", file))?;
        let id = id.trim().to_string();
        Ok((!id.is_empty()).then_some(id))
    }
}

#[async_trait]
impl BackendDriver for EpmDriver {
    fn name(&self) -> &'static str {
        DRIVER_EPM
    }

    async fn create(
        &self,
        instance_id: &str,
        content: &str,
        manifest_type: &str,
        parameters: &Parameters,
    ) -> Result<()> {
        let dir = instance_dir(&self.settings.work_dir, instance_id)?;
        prepare_instance_dir(DRIVER_EPM, &dir).await?;

        let package = build_package(
            instance_id,
            &normalize_newlines(content),
            manifest_type,
            parameters,
        )?;

        let mut nonce = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut nonce);
        let boundary = format!("svcbroker-{}", hex::encode(nonce));
        let content_type = format!("multipart/form-data; boundary={boundary}");
        let body = multipart_body(&boundary, &format!("{instance_id}.tar.gz"), &package);

        let uri = self.url("/packages");
        let reply = client::send(
            &self.client,
            Method::POST,
            &uri,
            &[("content-type", content_type.as_str()), ("accept", "application/json")],
            Some(body),
            self.settings.timeout,
        )
        .await
        .context("upload package")?;
        if !reply.is_success() {
            bail!(
                "package upload to {uri} returned {}: {}",
                reply.status,
                String::from_utf8_lossy(&reply.body)
            );
        }

        let group: ResourceGroup =
            serde_json::from_slice(&reply.body).context("decode resource group")?;
        let rg_file = dir.join(RESOURCE_GROUP_FILE);
        fs::write(&rg_file, &group.id)
            .await
            .with_context(|| format!("write {:?}", rg_file))?;

        info!(
            component = "backend",
            driver = DRIVER_EPM,
            event = "created",
            instance_id = instance_id,
            resource_group = %group.id,
            "package deployed"
        );
        Ok(())
    }

    async fn info(&self, instance_id: &str, _manifest_type: &str) -> Result<Attributes> {
        let dir = instance_dir(&self.settings.work_dir, instance_id)?;
        let Some(rg) = Self::read_resource_group(&dir).await? else {
            warn!(
                component = "backend",
                driver = DRIVER_EPM,
                event = "resource_group_missing",
                instance_id = instance_id,
                "no resource group recorded for instance"
            );
            return Ok(Attributes::new());
        };

        let uri = self.url(&format!("/resourceGroups/{rg}"));
        let reply = client::get(&self.client, &uri, self.settings.timeout)
            .await
            .context("fetch resource group")?;
        if !reply.is_success() {
            bail!("resource group lookup at {uri} returned {}", reply.status);
        }
        let group: ResourceGroup =
            serde_json::from_slice(&reply.body).context("decode resource group")?;
        Ok(attributes_from_resource_group(&group))
    }

    async fn delete(&self, instance_id: &str, _manifest_type: &str) -> Result<()> {
        let dir = instance_dir(&self.settings.work_dir, instance_id)?;
        let Some(rg) = Self::read_resource_group(&dir).await? else {
            warn!(
                component = "backend",
                driver = DRIVER_EPM,
                event = "resource_group_missing",
                instance_id = instance_id,
                "nothing to delete, no resource group recorded"
            );
            return Ok(());
        };

        let uri = self.url(&format!("/packages/{rg}"));
        let reply = client::send(
            &self.client,
            Method::DELETE,
            &uri,
            &[],
            None,
            self.settings.timeout,
        )
        .await
        .context("delete package")?;
        // 404 means the manager already forgot it.
        if !reply.is_success() && reply.status != 404 {
            bail!("package delete at {uri} returned {}", reply.status);
        }

        remove_instance_dir(DRIVER_EPM, &dir).await;

        info!(
            component = "backend",
            driver = DRIVER_EPM,
            event = "deleted",
            instance_id = instance_id,
            resource_group = %rg,
            "package removed"
        );
        Ok(())
    }

    async fn is_ok(&self) -> bool {
        let uri = self.url("/packages");
        matches!(
            client::get(&self.client, &uri, self.settings.timeout).await,
            Ok(reply) if reply.status < 500
        )
    }
}
