// Package runner executes task chains in the background with bounded concurrency.


use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error, info, warn};

use crate::error::BrokerError;
use crate::metrics::meter;
use crate::task::{run_sequential, Task};

pub const DRAINING_MESSAGE: &str = "broker is shutting down, not accepting asynchronous work";

/// Fire-and-forget executor for task chains.
///
/// A chain runs in order and stops at its first unsuccessful task. At most
/// `concurrency` chains run at once; the rest wait for a slot.
pub struct AsyncRunner {
    slots: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
    draining: AtomicBool,
}

impl AsyncRunner {
    pub fn new(concurrency: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(concurrency.max(1))),
            in_flight: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
            draining: AtomicBool::new(false),
        }
    }

    /// Number of accepted chains that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Accepts a chain for background execution.
    pub fn submit(&self, tasks: Vec<Box<dyn Task>>) -> Result<(), BrokerError> {
        let Some(first) = tasks.first() else {
            return Ok(());
        };
        let kind = first.kind();
        let entity_id = first.entity_id().to_string();

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if self.is_draining() {
            self.finish_one();
            meter::add_async_rejected();
            warn!(
                component = "runner",
                event = "rejected",
                task = kind.as_str(),
                entity_id = %entity_id,
                "runner is draining, chain rejected"
            );
            return Err(BrokerError::Unavailable(DRAINING_MESSAGE.to_string()));
        }
        meter::add_async_accepted();
        meter::set_async_in_flight(self.in_flight());

        let slots = self.slots.clone();
        let in_flight = self.in_flight.clone();
        let idle = self.idle.clone();
        tokio::spawn(async move {
            // The semaphore is never closed.
            let _permit = slots.acquire_owned().await.ok();
            debug!(
                component = "runner",
                event = "started",
                task = kind.as_str(),
                entity_id = %entity_id,
                "chain started"
            );

            match tokio::spawn(run_sequential(tasks)).await {
                Ok(Some((_, ctx))) if !ctx.outcome.is_success() => {
                    meter::add_async_failed();
                    warn!(
                        component = "runner",
                        event = "chain_failed",
                        task = kind.as_str(),
                        entity_id = %entity_id,
                        status = ctx.outcome.status,
                        message = %ctx.outcome.message,
                        "background chain finished unsuccessfully"
                    );
                }
                Ok(_) => {}
                Err(join_err) if join_err.is_panic() => {
                    meter::add_async_panicked();
                    error!(
                        component = "runner",
                        event = "chain_panicked",
                        task = kind.as_str(),
                        entity_id = %entity_id,
                        "background chain panicked"
                    );
                }
                Err(join_err) => {
                    meter::add_async_failed();
                    error!(
                        component = "runner",
                        event = "chain_aborted",
                        task = kind.as_str(),
                        entity_id = %entity_id,
                        error = %join_err,
                        "background chain aborted"
                    );
                }
            }

            if in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                idle.notify_waiters();
            }
            meter::set_async_in_flight(in_flight.load(Ordering::SeqCst));
        });
        Ok(())
    }

    fn finish_one(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    /// Stops accepting chains and waits up to `timeout` for running ones.
    /// Returns false on timeout.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.draining.store(true, Ordering::SeqCst);
        info!(
            component = "runner",
            event = "draining",
            in_flight = self.in_flight(),
            "waiting for background chains"
        );

        if self.wait_idle(timeout).await {
            info!(component = "runner", event = "drained", "background chains finished");
            true
        } else {
            warn!(
                component = "runner",
                event = "drain_timeout",
                in_flight = self.in_flight(),
                timeout_secs = timeout.as_secs_f64(),
                "background chains still running after drain timeout"
            );
            false
        }
    }

    /// Waits up to `timeout` until no chain is in flight, still accepting new ones.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.idle.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.in_flight() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}
