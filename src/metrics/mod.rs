//! Prometheus metrics functionality.
//
//! Broker metrics are recorded through the `metrics` facade and rendered by
//! the exporter installed in `controller::metrics`.

pub mod meter;

// Re-export commonly used items
pub use meter::*;
