pub mod hyper_client;

pub use hyper_client::{create_client, get, send, HyperClient, Reply};
