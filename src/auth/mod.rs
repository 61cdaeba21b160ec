// Credential issuance for service bindings.

use anyhow::{bail, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use rand::RngCore;
use std::collections::BTreeMap;
use tracing::{info, warn};

pub type Credentials = BTreeMap<String, String>;

pub const USERNAME_KEY: &str = "username";
pub const PASSWORD_KEY: &str = "password";

#[async_trait]
pub trait Auth: Send + Sync {
    async fn create_credentials(&self, binding_id: &str, instance_id: &str) -> Result<Credentials>;
    async fn delete_credentials(&self, credentials: &Credentials) -> Result<()>;
}

/// Issues random username/password pairs and remembers which are live.
pub struct StaticAuth {
    username_prefix: String,
    issued: DashMap<String, String>,
}

impl StaticAuth {
    pub fn new(username_prefix: impl Into<String>) -> Self {
        Self {
            username_prefix: username_prefix.into(),
            issued: DashMap::new(),
        }
    }

    pub fn is_issued(&self, username: &str) -> bool {
        self.issued.contains_key(username)
    }
}

fn random_secret() -> String {
    let mut buf = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

#[async_trait]
impl Auth for StaticAuth {
    async fn create_credentials(&self, binding_id: &str, instance_id: &str) -> Result<Credentials> {
        if binding_id.is_empty() {
            bail!("binding id must not be empty");
        }
        let username = format!("{}-{}", self.username_prefix, binding_id);
        if self.issued.contains_key(&username) {
            bail!("credentials for binding {binding_id} already issued");
        }
        let password = random_secret();
        self.issued.insert(username.clone(), password.clone());

        info!(
            component = "auth",
            event = "credentials_issued",
            instance_id = instance_id,
            binding_id = binding_id,
            "credentials issued"
        );

        Ok(Credentials::from([
            (USERNAME_KEY.to_string(), username),
            (PASSWORD_KEY.to_string(), password),
        ]))
    }

    async fn delete_credentials(&self, credentials: &Credentials) -> Result<()> {
        let Some(username) = credentials.get(USERNAME_KEY) else {
            bail!("credentials carry no username");
        };
        if self.issued.remove(username).is_none() {
            // Already revoked, e.g. issued before a restart.
            warn!(
                component = "auth",
                event = "credentials_unknown",
                username = %username,
                "revoking credentials that were not issued by this process"
            );
        }
        Ok(())
    }
}
