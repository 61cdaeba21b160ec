use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::error;

use super::sanitizer::Sanitizer;

pub const COMPONENT: &str = "dedlog";
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const CHANNEL_CAPACITY: usize = 1024;

struct LogEntry {
    err: Option<String>,
    extra: Option<String>,
    reason: String,
    count: usize,
}

impl LogEntry {
    fn key(&self, sanitizer: &Sanitizer) -> String {
        match &self.err {
            Some(err) => format!("{}|{}", self.reason, sanitizer.sanitize(err)),
            None => self.reason.clone(),
        }
    }

    fn emit(&self, sanitizer: &Sanitizer) {
        let err = self.err.as_deref().map(|e| sanitizer.sanitize(e)).unwrap_or_default();
        let extra = self.extra.as_deref().unwrap_or_default();
        error!(
            component = COMPONENT,
            count = self.count,
            err = %err,
            extra = %extra,
            "{}",
            self.reason
        );
    }
}

static ERR_CH: Lazy<Mutex<Option<mpsc::Sender<LogEntry>>>> = Lazy::new(|| Mutex::new(None));

/// Queues an error for aggregated logging. Never blocks.
///
/// Before the logger is started, and when its queue is full, the entry is
/// logged directly.
pub fn err(err: Option<&str>, extra: Option<&str>, reason: &str) {
    let entry = LogEntry {
        err: err.map(str::to_string),
        extra: extra.map(str::to_string),
        reason: reason.to_string(),
        count: 1,
    };
    let tx = ERR_CH.lock().clone();
    match tx {
        Some(tx) => {
            if let Err(rejected) = tx.try_send(entry) {
                let entry = match rejected {
                    mpsc::error::TrySendError::Full(e) | mpsc::error::TrySendError::Closed(e) => e,
                };
                entry.emit(&Sanitizer::new());
            }
        }
        None => entry.emit(&Sanitizer::new()),
    }
}

/// Runs the aggregation loop until `ctx` is cancelled, flushing every
/// [`FLUSH_INTERVAL`] and once more on exit.
pub async fn start_dedup_logger(ctx: CancellationToken) {
    let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);
    *ERR_CH.lock() = Some(tx);

    let sanitizer = Sanitizer::new();
    let mut pending: HashMap<String, LogEntry> = HashMap::new();
    let mut interval = tokio::time::interval(FLUSH_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ctx.cancelled() => break,
            entry = rx.recv() => {
                let Some(entry) = entry else { break };
                let key = entry.key(&sanitizer);
                pending
                    .entry(key)
                    .and_modify(|e| e.count += 1)
                    .or_insert(entry);
            }
            _ = interval.tick() => {
                for (_, entry) in pending.drain() {
                    entry.emit(&sanitizer);
                }
            }
        }
    }

    *ERR_CH.lock() = None;
    while let Ok(entry) = rx.try_recv() {
        let key = entry.key(&sanitizer);
        pending.entry(key).and_modify(|e| e.count += 1).or_insert(entry);
    }
    for (_, entry) in pending.drain() {
        entry.emit(&sanitizer);
    }
}
