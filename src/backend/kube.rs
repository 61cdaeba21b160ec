//! Kubernetes driver: one namespace per instance, driven through `kubectl`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

use super::command::{CommandRunner, CommandSpec};
use super::driver::{
    attr_key, BackendDriver, SUFFIX_CMD, SUFFIX_ENVIRONMENT, SUFFIX_IMAGE_ID, SUFFIX_IMAGE_NAME,
    SUFFIX_IP, SUFFIX_STATE,
};
use super::manifest::{
    dns_label, instance_dir, normalize_newlines, prepare_instance_dir, remove_instance_dir,
};
use super::DRIVER_KUBE;
use crate::model::{Attributes, Parameters};

pub const MANIFEST_FILE: &str = "manifest.yml";
const NAMESPACE_MAX_LEN: usize = 63;
const FAILURE_REASONS: [&str; 5] = [
    "CrashLoopBackOff",
    "ErrImagePull",
    "ImagePullBackOff",
    "CreateContainerConfigError",
    "InvalidImageName",
];

#[derive(Debug, Clone)]
pub struct KubeSettings {
    pub work_dir: PathBuf,
    pub binary: String,
    pub request_timeout: Duration,
}

pub struct KubeDriver {
    settings: KubeSettings,
    runner: Arc<dyn CommandRunner>,
}

impl KubeDriver {
    pub fn new(settings: KubeSettings, runner: Arc<dyn CommandRunner>) -> Self {
        Self { settings, runner }
    }

    fn spec<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::new(&self.settings.binary, args, self.settings.request_timeout)
    }

    async fn run_checked(&self, spec: CommandSpec) -> Result<String> {
        let out = self.runner.run(&spec).await?.check(&spec)?;
        Ok(out.stdout)
    }
}

pub fn namespace_for(instance_id: &str) -> Result<String> {
    let ns = dns_label(instance_id, NAMESPACE_MAX_LEN);
    if ns.is_empty() {
        bail!("instance id {instance_id:?} yields an empty namespace name");
    }
    Ok(ns)
}

/// Splits a multi-document manifest and checks every document's kind.
pub fn parse_manifest(content: &str) -> Result<Vec<Value>> {
    let mut docs = Vec::new();
    for doc in serde_yaml::Deserializer::from_str(content) {
        let value = Value::deserialize(doc).context("parse kubernetes manifest")?;
        if value.is_null() {
            continue;
        }
        validate_kind(&value)?;
        docs.push(value);
    }
    if docs.is_empty() {
        bail!("kubernetes manifest contains no documents");
    }
    Ok(docs)
}

fn kind_of(doc: &Value) -> Option<&str> {
    doc.get("kind").and_then(Value::as_str)
}

fn validate_kind(doc: &Value) -> Result<()> {
    match kind_of(doc) {
        Some("Service") | Some("Deployment") => Ok(()),
        Some("List") => {
            for item in doc
                .get("items")
                .and_then(Value::as_sequence)
                .map(Vec::as_slice)
                .unwrap_or_default()
            {
                validate_kind(item)?;
            }
            Ok(())
        }
        Some(other) => bail!(
            "unsupported kubernetes kind {other:?}; only Service, Deployment and List are accepted"
        ),
        None => bail!("kubernetes document has no kind"),
    }
}

/// Merges `parameters` into every Deployment container's `env`, overriding by name.
pub fn inject_environment(doc: &mut Value, parameters: &Parameters) {
    if parameters.is_empty() {
        return;
    }
    match kind_of(doc) {
        Some("Deployment") => {
            let containers = doc
                .get_mut("spec")
                .and_then(|s| s.get_mut("template"))
                .and_then(|t| t.get_mut("spec"))
                .and_then(|s| s.get_mut("containers"))
                .and_then(Value::as_sequence_mut);
            if let Some(containers) = containers {
                for container in containers.iter_mut().filter_map(Value::as_mapping_mut) {
                    merge_container_env(container, parameters);
                }
            }
        }
        Some("List") => {
            if let Some(items) = doc.get_mut("items").and_then(Value::as_sequence_mut) {
                for item in items.iter_mut() {
                    inject_environment(item, parameters);
                }
            }
        }
        _ => {}
    }
}

fn merge_container_env(container: &mut Mapping, parameters: &Parameters) {
    let mut env: Vec<Value> = container
        .get("env")
        .and_then(Value::as_sequence)
        .map(|items| {
            items
                .iter()
                .filter(|item| {
                    item.get("name")
                        .and_then(Value::as_str)
                        .map_or(true, |name| !parameters.contains_key(name))
                })
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    for (name, value) in parameters {
        let mut entry = Mapping::new();
        entry.insert(Value::String("name".to_string()), Value::String(name.clone()));
        entry.insert(Value::String("value".to_string()), Value::String(value.clone()));
        env.push(Value::Mapping(entry));
    }
    container.insert(Value::String("env".to_string()), Value::Sequence(env));
}

pub fn render_manifest(docs: &[Value]) -> Result<String> {
    let rendered = docs
        .iter()
        .map(serde_yaml::to_string)
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("render kubernetes manifest")?;
    Ok(rendered.join("---\n"))
}

#[derive(Debug, Default, Deserialize)]
pub struct PodList {
    #[serde(default)]
    pub items: Vec<Pod>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Pod {
    #[serde(default)]
    pub metadata: PodMeta,
    #[serde(default)]
    pub spec: PodSpec,
    #[serde(default)]
    pub status: PodStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct PodMeta {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PodSpec {
    #[serde(default)]
    pub containers: Vec<Container>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Container {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<EnvVar>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    #[serde(default)]
    pub phase: String,
    #[serde(rename = "podIP", default)]
    pub pod_ip: Option<String>,
    #[serde(default)]
    pub container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatus {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ready: bool,
    #[serde(rename = "imageID", default)]
    pub image_id: String,
    #[serde(default)]
    pub state: Option<ContainerRuntimeState>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ContainerRuntimeState {
    #[serde(default)]
    pub waiting: Option<StateReason>,
    #[serde(default)]
    pub terminated: Option<StateReason>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StateReason {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Condenses pod phase and container statuses into one state word.
pub fn pod_state(pod: &Pod) -> String {
    for cs in &pod.status.container_statuses {
        let waiting = cs
            .state
            .as_ref()
            .and_then(|s| s.waiting.as_ref())
            .and_then(|w| w.reason.as_deref());
        if let Some(reason) = waiting {
            if FAILURE_REASONS.contains(&reason) {
                return format!("Failed: {reason}");
            }
        }
    }

    let statuses = &pod.status.container_statuses;
    match pod.status.phase.as_str() {
        "Failed" => "Failed".to_string(),
        "Running" if !statuses.is_empty() && statuses.iter().all(|cs| cs.ready) => {
            "Running".to_string()
        }
        "Running" => "NotReady".to_string(),
        "Succeeded" => "Completed".to_string(),
        "" => "Pending".to_string(),
        other => other.to_string(),
    }
}

pub fn attributes_from_pods(pods: &PodList) -> Attributes {
    let mut attrs = Attributes::new();
    for pod in &pods.items {
        let name = pod.metadata.name.as_str();
        if name.is_empty() {
            continue;
        }

        let images: Vec<&str> = pod.spec.containers.iter().map(|c| c.image.as_str()).collect();
        attrs.insert(attr_key(name, SUFFIX_IMAGE_NAME), images.join(","));

        let image_ids: Vec<&str> = pod
            .status
            .container_statuses
            .iter()
            .map(|cs| cs.image_id.as_str())
            .collect();
        attrs.insert(attr_key(name, SUFFIX_IMAGE_ID), image_ids.join(","));

        if let Some(main) = pod.spec.containers.first() {
            let cmd: Vec<&str> = main
                .command
                .iter()
                .chain(main.args.iter())
                .map(String::as_str)
                .collect();
            attrs.insert(attr_key(name, SUFFIX_CMD), cmd.join(" "));
            for var in &main.env {
                attrs.insert(
                    format!("{name}{SUFFIX_ENVIRONMENT}{}", var.name),
                    var.value.clone().unwrap_or_default(),
                );
            }
        }

        if let Some(ip) = pod.status.pod_ip.as_deref().filter(|ip| !ip.is_empty()) {
            attrs.insert(attr_key(name, SUFFIX_IP), ip.to_string());
        }

        attrs.insert(attr_key(name, SUFFIX_STATE), pod_state(pod));
    }
    attrs
}

#[async_trait]
impl BackendDriver for KubeDriver {
    fn name(&self) -> &'static str {
        DRIVER_KUBE
    }

    async fn create(
        &self,
        instance_id: &str,
        content: &str,
        _manifest_type: &str,
        parameters: &Parameters,
    ) -> Result<()> {
        let mut docs = parse_manifest(&normalize_newlines(content))?;
        for doc in docs.iter_mut() {
            inject_environment(doc, parameters);
        }
        let namespace = namespace_for(instance_id)?;

        let dir = instance_dir(&self.settings.work_dir, instance_id)?;
        prepare_instance_dir(DRIVER_KUBE, &dir).await?;
        let file = dir.join(MANIFEST_FILE);
        fs::write(&file, render_manifest(&docs)?)
            .await
            .with_context(|| format!("write kubernetes manifest {:?}", file))?;

        let spec = self.spec(["create", "namespace", namespace.as_str()]);
        let out = self.runner.run(&spec).await?;
        if !out.success() {
            if out.stderr.contains("AlreadyExists") {
                warn!(
                    component = "backend",
                    driver = DRIVER_KUBE,
                    event = "namespace_exists",
                    namespace = %namespace,
                    "namespace already exists, applying into it"
                );
            } else {
                out.check(&spec).context("create namespace")?;
            }
        }

        let file = file.to_string_lossy().into_owned();
        let spec = self.spec(["apply", "-n", namespace.as_str(), "-f", file.as_str()]);
        self.run_checked(spec).await.context("apply manifest")?;

        info!(
            component = "backend",
            driver = DRIVER_KUBE,
            event = "created",
            instance_id = instance_id,
            namespace = %namespace,
            "kubernetes resources applied"
        );
        Ok(())
    }

    async fn info(&self, instance_id: &str, _manifest_type: &str) -> Result<Attributes> {
        let dir = instance_dir(&self.settings.work_dir, instance_id)?;
        if !fs::try_exists(&dir).await.unwrap_or(false) {
            warn!(
                component = "backend",
                driver = DRIVER_KUBE,
                event = "dir_missing",
                instance_id = instance_id,
                "requested instance directory does not exist"
            );
            return Ok(Attributes::new());
        }

        let namespace = namespace_for(instance_id)?;
        let spec = self.spec(["get", "pods", "-n", namespace.as_str(), "-o", "json"]);
        let raw = self.run_checked(spec).await.context("list pods")?;
        let pods: PodList = serde_json::from_str(&raw).context("decode pod list")?;
        Ok(attributes_from_pods(&pods))
    }

    async fn delete(&self, instance_id: &str, _manifest_type: &str) -> Result<()> {
        let dir = instance_dir(&self.settings.work_dir, instance_id)?;
        if !fs::try_exists(&dir).await.unwrap_or(false) {
            warn!(
                component = "backend",
                driver = DRIVER_KUBE,
                event = "dir_missing",
                instance_id = instance_id,
                "nothing to delete, instance directory does not exist"
            );
            return Ok(());
        }

        let namespace = namespace_for(instance_id)?;
        let spec = self.spec([
            "delete",
            "namespace",
            namespace.as_str(),
            "--ignore-not-found=true",
            "--wait=false",
        ]);
        self.run_checked(spec).await.context("delete namespace")?;

        remove_instance_dir(DRIVER_KUBE, &dir).await;

        info!(
            component = "backend",
            driver = DRIVER_KUBE,
            event = "deleted",
            instance_id = instance_id,
            namespace = %namespace,
            "kubernetes namespace removed"
        );
        Ok(())
    }

    async fn is_ok(&self) -> bool {
        let spec = self.spec(["version", "--client"]);
        matches!(self.runner.run(&spec).await, Ok(out) if out.success())
    }
}
