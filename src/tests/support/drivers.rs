// In-memory backend driver with scripted behaviour.

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::BackendDriver;
use crate::model::{Attributes, Parameters};

pub fn attrs(pairs: &[(&str, &str)]) -> Attributes {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// A healthy single-container deployment reachable at `ip`.
pub fn running_attrs(ip: &str) -> Attributes {
    attrs(&[
        ("web_image_name", "nginx:latest"),
        ("web_state", "Up"),
        ("web_Ip", ip),
    ])
}

#[derive(Default)]
struct Script {
    info_queue: VecDeque<std::result::Result<Attributes, String>>,
    steady: Attributes,
    fail_create: Option<String>,
    fail_delete: Option<String>,
    create_delay: Duration,
    check_delay: Duration,
    calls: Vec<String>,
    last_parameters: Option<Parameters>,
}

/// Answers `info` from a queue of scripted results, then from a steady bag.
#[derive(Clone)]
pub struct ScriptedDriver {
    name: &'static str,
    script: Arc<Mutex<Script>>,
    panic_on_create: Arc<AtomicBool>,
    healthy: Arc<AtomicBool>,
}

impl ScriptedDriver {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            script: Arc::new(Mutex::new(Script::default())),
            panic_on_create: Arc::new(AtomicBool::new(false)),
            healthy: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn with_steady(self, attributes: Attributes) -> Self {
        self.script.lock().steady = attributes;
        self
    }

    pub fn set_steady(&self, attributes: Attributes) {
        self.script.lock().steady = attributes;
    }

    pub fn push_info(&self, attributes: Attributes) {
        self.script.lock().info_queue.push_back(Ok(attributes));
    }

    pub fn push_info_error(&self, message: &str) {
        self.script
            .lock()
            .info_queue
            .push_back(Err(message.to_string()));
    }

    pub fn fail_create(&self, message: &str) {
        self.script.lock().fail_create = Some(message.to_string());
    }

    pub fn fail_delete(&self, message: &str) {
        self.script.lock().fail_delete = Some(message.to_string());
    }

    pub fn create_delay(&self, delay: Duration) {
        self.script.lock().create_delay = delay;
    }

    /// Delays every `is_ok` answer by `delay`.
    pub fn check_delay(&self, delay: Duration) {
        self.script.lock().check_delay = delay;
    }

    pub fn panic_on_create(&self) {
        self.panic_on_create.store(true, Ordering::SeqCst);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// `op:instance_id` entries in call order.
    pub fn calls(&self) -> Vec<String> {
        self.script.lock().calls.clone()
    }

    pub fn count(&self, op: &str) -> usize {
        let prefix = format!("{op}:");
        self.script
            .lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .count()
    }

    pub fn last_parameters(&self) -> Option<Parameters> {
        self.script.lock().last_parameters.clone()
    }
}

#[async_trait]
impl BackendDriver for ScriptedDriver {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn create(
        &self,
        instance_id: &str,
        _content: &str,
        _manifest_type: &str,
        parameters: &Parameters,
    ) -> Result<()> {
        let (delay, failure) = {
            let mut script = self.script.lock();
            script.calls.push(format!("create:{instance_id}"));
            script.last_parameters = Some(parameters.clone());
            (script.create_delay, script.fail_create.clone())
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.panic_on_create.load(Ordering::SeqCst) {
            panic!("scripted driver panicked creating {instance_id}");
        }
        if let Some(msg) = failure {
            bail!("{msg}");
        }
        Ok(())
    }

    async fn info(&self, instance_id: &str, _manifest_type: &str) -> Result<Attributes> {
        let mut script = self.script.lock();
        script.calls.push(format!("info:{instance_id}"));
        match script.info_queue.pop_front() {
            Some(Ok(attributes)) => Ok(attributes),
            Some(Err(msg)) => bail!("{msg}"),
            None => Ok(script.steady.clone()),
        }
    }

    async fn delete(&self, instance_id: &str, _manifest_type: &str) -> Result<()> {
        let failure = {
            let mut script = self.script.lock();
            script.calls.push(format!("delete:{instance_id}"));
            script.fail_delete.clone()
        };
        if let Some(msg) = failure {
            bail!("{msg}");
        }
        Ok(())
    }

    async fn is_ok(&self) -> bool {
        let delay = self.script.lock().check_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.healthy.load(Ordering::SeqCst)
    }
}
