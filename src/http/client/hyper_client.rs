//! Hyper HTTP client shared by the package manager driver and health probes.
//!
//! Pool settings favour many short requests to a moderate number of hosts:
//! - Max idle connections per host: 64
//! - Max idle connection duration: 30s
//! - Connection timeout: 3s
//! - TCP keep-alive: 30s

use anyhow::{Context, Result};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Bytes;
use hyper::{Method, Request, Uri};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::dns::GaiResolver;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tokio::time::timeout;

pub const CONNS_PER_HOST: usize = 64;
pub const MAX_IDLE_CONN_DURATION: Duration = Duration::from_secs(30);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

pub type HyperClient = Client<HttpsConnector<HttpConnector<GaiResolver>>, BoxBody<Bytes, hyper::Error>>;

/// Creates a pooled client that speaks both http and https.
pub fn create_client() -> Result<HyperClient> {
    let mut http_connector = HttpConnector::new_with_resolver(GaiResolver::new());
    http_connector.set_nodelay(true);
    http_connector.set_keepalive(Some(Duration::from_secs(30)));
    http_connector.set_connect_timeout(Some(CONNECT_TIMEOUT));
    http_connector.enforce_http(false);

    let tls = hyper_rustls::HttpsConnectorBuilder::new()
        .with_native_roots()
        .context("failed to load native root certificates")?
        .https_or_http()
        .enable_http1()
        .wrap_connector(http_connector);

    Ok(Client::builder(TokioExecutor::new())
        .pool_idle_timeout(MAX_IDLE_CONN_DURATION)
        .pool_max_idle_per_host(CONNS_PER_HOST)
        .retry_canceled_requests(true)
        .build(tls))
}

/// Status code and fully buffered body of a response.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: Bytes,
}

impl Reply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends a request and buffers the response body, bounded by `timeout_duration`.
pub async fn send(
    client: &HyperClient,
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Bytes>,
    timeout_duration: Duration,
) -> Result<Reply> {
    let parsed: Uri = uri
        .parse()
        .with_context(|| format!("invalid uri {uri}"))?;

    let mut builder = Request::builder().method(method).uri(parsed);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }

    let req_body: BoxBody<Bytes, hyper::Error> = match body {
        Some(bytes) => Full::new(bytes)
            .map_err(|never: std::convert::Infallible| match never {})
            .boxed(),
        None => Empty::<Bytes>::new()
            .map_err(|never: std::convert::Infallible| match never {})
            .boxed(),
    };
    let req = builder.body(req_body).context("build request")?;

    let exchange = async {
        let response = client.request(req).await.context("request failed")?;
        let status = response.status().as_u16();
        let body = response
            .into_body()
            .collect()
            .await
            .context("failed to read response body")?
            .to_bytes();
        Ok::<_, anyhow::Error>(Reply { status, body })
    };

    match timeout(timeout_duration, exchange).await {
        Ok(reply) => reply.with_context(|| uri.to_string()),
        Err(_) => Err(anyhow::anyhow!(
            "request timed out after {:?} (URI: {})",
            timeout_duration,
            uri
        )),
    }
}

pub async fn get(client: &HyperClient, uri: &str, timeout_duration: Duration) -> Result<Reply> {
    send(client, Method::GET, uri, &[], None, timeout_duration).await
}
