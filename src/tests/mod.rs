//! End-to-end tests for the broker.
//!
//! These drive the public facade and the ops plane the way a caller would:
//! whole lifecycles, concurrent callers, live health endpoints.

mod cases_app_test;
mod cases_concurrent_test;
mod cases_monitor_test;

pub mod support;
