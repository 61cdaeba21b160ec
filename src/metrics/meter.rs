// Metric name constants
pub const TASKS_TOTAL: &str = "broker_tasks_total";
pub const TASK_DURATION: &str = "broker_task_duration_seconds";
pub const DISPATCH_FALLBACKS: &str = "broker_dispatch_fallbacks_total";
pub const BACKEND_ERRORS: &str = "broker_backend_errors_total";
pub const ASYNC_ACCEPTED: &str = "broker_async_accepted_total";
pub const ASYNC_REJECTED: &str = "broker_async_rejected_total";
pub const ASYNC_FAILED: &str = "broker_async_failed_total";
pub const ASYNC_PANICKED: &str = "broker_async_panicked_total";
pub const ASYNC_IN_FLIGHT: &str = "broker_async_in_flight";
pub const PROBES_TOTAL: &str = "broker_health_probes_total";
pub const MONITORS_ACTIVE: &str = "broker_monitors_active";

/// Counts a finished task by kind and outcome status.
pub fn add_task(kind: &'static str, status: u16) {
    metrics::counter!(TASKS_TOTAL, "task" => kind, "status" => status.to_string()).increment(1);
}

pub fn observe_task_duration(kind: &'static str, seconds: f64) {
    metrics::histogram!(TASK_DURATION, "task" => kind).record(seconds);
}

/// Counts a manifest type that had no registered driver.
pub fn add_dispatch_fallback(manifest_type: &str) {
    metrics::counter!(DISPATCH_FALLBACKS, "manifest_type" => manifest_type.to_string())
        .increment(1);
}

pub fn add_backend_error(driver: &'static str, op: &'static str) {
    metrics::counter!(BACKEND_ERRORS, "driver" => driver, "op" => op).increment(1);
}

pub fn add_async_accepted() {
    metrics::counter!(ASYNC_ACCEPTED).increment(1);
}

pub fn add_async_rejected() {
    metrics::counter!(ASYNC_REJECTED).increment(1);
}

pub fn add_async_failed() {
    metrics::counter!(ASYNC_FAILED).increment(1);
}

pub fn add_async_panicked() {
    metrics::counter!(ASYNC_PANICKED).increment(1);
}

pub fn set_async_in_flight(count: usize) {
    metrics::gauge!(ASYNC_IN_FLIGHT).set(count as f64);
}

/// Counts a health probe by result: `healthy`, `unhealthy` or `unreachable`.
pub fn add_probe(result: &'static str) {
    metrics::counter!(PROBES_TOTAL, "result" => result).increment(1);
}

pub fn set_monitors_active(count: usize) {
    metrics::gauge!(MONITORS_ACTIVE).set(count as f64);
}
