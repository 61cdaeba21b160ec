//! Docker Compose driver: one compose project per instance.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, HashMap};
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
    instance_dir, normalize_newlines, prepare_instance_dir, remove_instance_dir, with_id_hash,
};
use super::DRIVER_COMPOSE;
use crate::model::{Attributes, Parameters};

pub const MANIFEST_FILE: &str = "docker-compose.yml";
// Pulls and `up -d` on a cold host can take minutes.
const CREATE_TIMEOUT: Duration = Duration::from_secs(600);
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ComposeSettings {
    pub work_dir: PathBuf,
    pub binary: String,
    pub update_images: bool,
    pub delete_timeout: Duration,
}

pub struct ComposeDriver {
    settings: ComposeSettings,
    runner: Arc<dyn CommandRunner>,
}

impl ComposeDriver {
    pub fn new(settings: ComposeSettings, runner: Arc<dyn CommandRunner>) -> Self {
        Self { settings, runner }
    }

    fn compose_args(&self, project: &str, file: &str, rest: &[&str]) -> Vec<String> {
        let mut args = vec![
            "compose".to_string(),
            "-p".to_string(),
            project.to_string(),
            "-f".to_string(),
            file.to_string(),
        ];
        args.extend(rest.iter().map(|s| s.to_string()));
        args
    }

    async fn run_checked(&self, spec: CommandSpec) -> Result<String> {
        let out = self.runner.run(&spec).await?.check(&spec)?;
        Ok(out.stdout)
    }
}

/// Compose project names allow `[a-z0-9_-]` only. Ids that need rewriting get a hash suffix.
pub fn project_name(instance_id: &str) -> String {
    let name: String = instance_id
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    with_id_hash(instance_id, name.trim_start_matches(['-', '_']), usize::MAX)
}

/// Merges `parameters` into the `environment` of every compose service.
///
/// Map and `KEY=VALUE` list forms are both accepted; caller values win on
/// key collision. Without parameters the manifest is returned untouched.
pub fn inject_environment(content: &str, parameters: &Parameters) -> Result<String> {
    if parameters.is_empty() {
        return Ok(content.to_string());
    }

    let mut doc: Value = serde_yaml::from_str(content).context("parse compose manifest")?;
    let services = doc
        .get_mut("services")
        .and_then(Value::as_mapping_mut)
        .context("compose manifest has no services section")?;

    let env_key = Value::String("environment".to_string());
    for (_, service) in services.iter_mut() {
        let Some(service) = service.as_mapping_mut() else {
            continue;
        };
        let merged = merge_environment(service.get("environment"), parameters);
        service.insert(env_key.clone(), Value::Mapping(merged));
    }

    serde_yaml::to_string(&doc).context("render compose manifest")
}

fn merge_environment(existing: Option<&Value>, parameters: &Parameters) -> Mapping {
    let mut env = Mapping::new();
    match existing {
        Some(Value::Mapping(map)) => {
            for (k, v) in map {
                env.insert(k.clone(), v.clone());
            }
        }
        Some(Value::Sequence(items)) => {
            for item in items.iter().filter_map(Value::as_str) {
                let (k, v) = item.split_once('=').unwrap_or((item, ""));
                env.insert(Value::String(k.to_string()), Value::String(v.to_string()));
            }
        }
        _ => {}
    }
    for (k, v) in parameters {
        env.insert(Value::String(k.clone()), Value::String(v.clone()));
    }
    env
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerInspect {
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub config: ContainerConfig,
    #[serde(default)]
    pub state: ContainerState,
    #[serde(default)]
    pub network_settings: NetworkSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerConfig {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub cmd: Option<Vec<String>>,
    #[serde(default)]
    pub env: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerState {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub restarting: bool,
    #[serde(default)]
    pub exit_code: i64,
}

impl ContainerState {
    /// Compose-style human readable state: `Up`, `Paused`, `Restarting`, `Created` or `Exit N`.
    pub fn human_readable(&self) -> String {
        if self.paused {
            "Paused".to_string()
        } else if self.restarting {
            "Restarting".to_string()
        } else if self.running {
            "Up".to_string()
        } else if self.status == "created" {
            "Created".to_string()
        } else {
            format!("Exit {}", self.exit_code)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkSettings {
    #[serde(default)]
    pub ports: Option<HashMap<String, Option<Vec<PortBinding>>>>,
    #[serde(default)]
    pub networks: Option<BTreeMap<String, EndpointSettings>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortBinding {
    #[serde(default)]
    pub host_ip: String,
    #[serde(default)]
    pub host_port: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct EndpointSettings {
    #[serde(rename = "IPAddress", default)]
    pub ip_address: String,
}

/// Flattens `docker inspect` output into the driver attribute bag.
pub fn attributes_from_inspect(containers: &[ContainerInspect]) -> Attributes {
    let mut attrs = Attributes::new();
    for c in containers {
        let name = c.name.trim_start_matches('/');

        attrs.insert(attr_key(name, SUFFIX_IMAGE_NAME), c.config.image.clone());
        attrs.insert(attr_key(name, SUFFIX_IMAGE_ID), c.image.clone());
        attrs.insert(
            attr_key(name, SUFFIX_CMD),
            c.config.cmd.as_deref().unwrap_or_default().join(" "),
        );
        attrs.insert(attr_key(name, SUFFIX_STATE), c.state.human_readable());

        if let Some(ports) = &c.network_settings.ports {
            for (port, bindings) in ports {
                match bindings {
                    Some(list) => {
                        for b in list {
                            attrs.insert(format!("{name}_{port}/HostIp"), b.host_ip.clone());
                            attrs.insert(format!("{name}_{port}/HostPort"), b.host_port.clone());
                        }
                    }
                    None => {
                        attrs.insert(format!("{name}_{port}"), String::new());
                    }
                }
            }
        }

        if let Some(ip) = c
            .network_settings
            .networks
            .as_ref()
            .and_then(|nets| nets.values().map(|n| n.ip_address.as_str()).find(|ip| !ip.is_empty()))
        {
            attrs.insert(attr_key(name, SUFFIX_IP), ip.to_string());
        }

        for pair in c.config.env.as_deref().unwrap_or_default() {
            let (k, v) = pair.split_once('=').unwrap_or((pair.as_str(), ""));
            attrs.insert(format!("{name}{SUFFIX_ENVIRONMENT}{k}"), v.to_string());
        }
    }
    attrs
}

#[async_trait]
impl BackendDriver for ComposeDriver {
    fn name(&self) -> &'static str {
        DRIVER_COMPOSE
    }

    async fn create(
        &self,
        instance_id: &str,
        content: &str,
        _manifest_type: &str,
        parameters: &Parameters,
    ) -> Result<()> {
        let dir = instance_dir(&self.settings.work_dir, instance_id)?;
        prepare_instance_dir(DRIVER_COMPOSE, &dir).await?;

        let rendered = inject_environment(&normalize_newlines(content), parameters)?;
        let file = dir.join(MANIFEST_FILE);
        fs::write(&file, rendered)
            .await
            .with_context(|| format!("write compose manifest {:?}", file))?;

        let project = project_name(instance_id);
        let file = file.to_string_lossy().into_owned();

        if self.settings.update_images {
            let spec = CommandSpec::new(
                &self.settings.binary,
                self.compose_args(&project, &file, &["pull"]),
                CREATE_TIMEOUT,
            )
            .current_dir(&dir);
            self.run_checked(spec).await.context("pull images")?;
        }

        let spec = CommandSpec::new(
            &self.settings.binary,
            self.compose_args(&project, &file, &["up", "-d"]),
            CREATE_TIMEOUT,
        )
        .current_dir(&dir);
        self.run_checked(spec).await.context("compose up")?;

        info!(
            component = "backend",
            driver = DRIVER_COMPOSE,
            event = "created",
            instance_id = instance_id,
            project = %project,
            "compose project started"
        );
        Ok(())
    }

    async fn info(&self, instance_id: &str, _manifest_type: &str) -> Result<Attributes> {
        let dir = instance_dir(&self.settings.work_dir, instance_id)?;
        if !fs::try_exists(&dir).await.unwrap_or(false) {
            warn!(
                component = "backend",
                driver = DRIVER_COMPOSE,
                event = "dir_missing",
                instance_id = instance_id,
                dir = ?dir,
                "requested instance directory does not exist"
            );
            return Ok(Attributes::new());
        }

        let project = project_name(instance_id);
        let file = dir.join(MANIFEST_FILE).to_string_lossy().into_owned();

        let spec = CommandSpec::new(
            &self.settings.binary,
            self.compose_args(&project, &file, &["ps", "-a", "-q"]),
            QUERY_TIMEOUT,
        )
        .current_dir(&dir);
        let ids: Vec<String> = self
            .run_checked(spec)
            .await
            .context("list containers")?
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        if ids.is_empty() {
            return Ok(Attributes::new());
        }

        let mut args = vec!["inspect".to_string()];
        args.extend(ids);
        let spec = CommandSpec::new(&self.settings.binary, args, QUERY_TIMEOUT);
        let raw = self.run_checked(spec).await.context("inspect containers")?;
        let containers: Vec<ContainerInspect> =
            serde_json::from_str(&raw).context("decode docker inspect output")?;

        Ok(attributes_from_inspect(&containers))
    }

    async fn delete(&self, instance_id: &str, _manifest_type: &str) -> Result<()> {
        let dir = instance_dir(&self.settings.work_dir, instance_id)?;
        if !fs::try_exists(&dir).await.unwrap_or(false) {
            warn!(
                component = "backend",
                driver = DRIVER_COMPOSE,
                event = "dir_missing",
                instance_id = instance_id,
                "nothing to delete, instance directory does not exist"
            );
            return Ok(());
        }

        let project = project_name(instance_id);
        let file = dir.join(MANIFEST_FILE).to_string_lossy().into_owned();
        let timeout_secs = self.settings.delete_timeout.as_secs().to_string();
        let spec = CommandSpec::new(
            &self.settings.binary,
            self.compose_args(&project, &file, &["down", "-v", "--timeout", timeout_secs.as_str()]),
            self.settings.delete_timeout + QUERY_TIMEOUT,
        )
        .current_dir(&dir);
        self.run_checked(spec).await.context("compose down")?;

        remove_instance_dir(DRIVER_COMPOSE, &dir).await;

        info!(
            component = "backend",
            driver = DRIVER_COMPOSE,
            event = "deleted",
            instance_id = instance_id,
            "compose project removed"
        );
        Ok(())
    }

    async fn is_ok(&self) -> bool {
        let spec = CommandSpec::new(&self.settings.binary, ["version"], QUERY_TIMEOUT);
        matches!(self.runner.run(&spec).await, Ok(out) if out.success())
    }
}
