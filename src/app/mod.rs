// Package app wires configuration into a running broker with its ops plane.

#[allow(clippy::module_inception)]
pub mod app;
pub mod server;

pub use app::App;
pub use server::{Http, HttpServer};
