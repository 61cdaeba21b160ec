// HTTP module: outbound client and the operational server.

pub mod client;
pub mod server;

pub use server::{HttpServer, Server};

// Common controller interface
pub use crate::controller::controller::Controller;
