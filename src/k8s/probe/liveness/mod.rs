// Package liveness provides Kubernetes liveness probe functionality.

use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

pub mod error;
pub mod service;

pub use error::TimeoutIsTooShortError;
pub use service::Service;

const MIN_TIMEOUT: Duration = Duration::from_millis(1);
const FALLBACK_TIMEOUT: Duration = Duration::from_millis(10);

/// Asks every watched service concurrently; alive only if all answer yes in time.
pub struct Probe {
    services: ArcSwap<Vec<Arc<dyn Service>>>,
    timeout: Duration,
}

impl Probe {
    pub fn new(timeout_duration: Duration) -> Self {
        let timeout = if timeout_duration < MIN_TIMEOUT {
            warn!(
                component = "liveness",
                error = %TimeoutIsTooShortError,
                "min timeout duration is 1ms (timeout set up as 10ms as a more reasonable value)"
            );
            FALLBACK_TIMEOUT
        } else {
            timeout_duration
        };

        Self {
            services: ArcSwap::from_pointee(Vec::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Replaces the watched services.
    pub fn watch(&self, services: Vec<Arc<dyn Service>>) {
        self.services.store(Arc::new(services));
    }

    pub async fn is_alive_async(&self) -> bool {
        let services = self.services.load_full();
        let checks = services.iter().map(|service| async move {
            match timeout(self.timeout, service.is_alive()).await {
                Ok(alive) => {
                    if !alive {
                        warn!(
                            component = "liveness",
                            event = "not_alive",
                            service = service.name(),
                            "service reported not alive"
                        );
                    }
                    alive
                }
                Err(_) => {
                    warn!(
                        component = "liveness",
                        event = "deadline_exceeded",
                        service = service.name(),
                        timeout_ms = self.timeout.as_millis() as u64,
                        "liveness probe deadline exceeded while checking service"
                    );
                    false
                }
            }
        });
        futures::future::join_all(checks).await.into_iter().all(|alive| alive)
    }
}
