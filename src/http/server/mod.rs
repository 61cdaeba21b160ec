pub mod server;

pub use server::{HttpServer, Server, DEFAULT_NAME, DEFAULT_PORT, REQUEST_TIMEOUT};
