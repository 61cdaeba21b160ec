use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::http::client::{self, HyperClient};

/// Asks an instance endpoint whether it is up.
///
/// `Ok(false)` is a definite "not healthy" answer; `Err` means the endpoint
/// could not be asked at all.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self, url: &str) -> Result<bool>;
}

#[derive(Debug, Deserialize)]
struct HealthBody {
    #[serde(default)]
    status: String,
}

/// GETs the endpoint and expects `{"status": "up"}`.
pub struct HttpHealthProbe {
    client: HyperClient,
    timeout: Duration,
}

impl HttpHealthProbe {
    pub fn new(client: HyperClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn check(&self, url: &str) -> Result<bool> {
        let reply = client::get(&self.client, url, self.timeout)
            .await
            .with_context(|| format!("probe {url}"))?;
        if !reply.is_success() {
            return Ok(false);
        }
        Ok(serde_json::from_slice::<HealthBody>(&reply.body)
            .map(|body| body.status == "up")
            .unwrap_or(false))
    }
}
