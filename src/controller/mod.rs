// HTTP controllers for the operational endpoints.

pub mod config;
pub mod controller;
pub mod metrics;
pub mod monitors;
pub mod probe;

pub use config::ShowConfigController;
pub use metrics::PrometheusMetricsController;
pub use monitors::MonitorsController;
pub use probe::LivenessProbeController;
