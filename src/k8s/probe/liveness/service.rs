// Service trait for liveness checking

use async_trait::async_trait;

/// A dependency whose health decides the process liveness.
#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &str;

    async fn is_alive(&self) -> bool;
}
