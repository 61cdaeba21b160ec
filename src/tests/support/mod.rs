// Shared test support: scripted collaborators, fixtures and local servers.

pub mod drivers;
pub mod epm;
pub mod fixtures;
pub mod health;
pub mod runner;

use std::time::Duration;

/// Polls `condition` every 10ms until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
