#[path = "shared/dedlog/mod.rs"]
pub mod dedlog;
#[path = "k8s/probe/liveness/mod.rs"]
pub mod liveness;
#[cfg(test)]
mod tests;

#[cfg(test)]
pub use tests::support;

pub mod app;
pub mod auth;
pub mod backend;
pub mod broker;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod metrics;
pub mod model;
pub mod monitor;
pub mod runner;
pub mod shutdown;
pub mod store;
pub mod task;
