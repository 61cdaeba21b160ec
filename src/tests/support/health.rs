// Health probe stubs and a local health endpoint.

use anyhow::{bail, Result};
use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use parking_lot::Mutex;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::monitor::HealthProbe;

const ANSWER_UP: u8 = 0;
const ANSWER_DOWN: u8 = 1;
const ANSWER_ERROR: u8 = 2;
const ANSWER_PANIC: u8 = 3;

/// Records probed URLs and answers as told.
#[derive(Clone)]
pub struct StubProbe {
    answer: Arc<AtomicU8>,
    urls: Arc<Mutex<Vec<String>>>,
}

impl Default for StubProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl StubProbe {
    pub fn new() -> Self {
        Self {
            answer: Arc::new(AtomicU8::new(ANSWER_UP)),
            urls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn up(&self) {
        self.answer.store(ANSWER_UP, Ordering::SeqCst);
    }

    pub fn down(&self) {
        self.answer.store(ANSWER_DOWN, Ordering::SeqCst);
    }

    pub fn error(&self) {
        self.answer.store(ANSWER_ERROR, Ordering::SeqCst);
    }

    pub fn panic(&self) {
        self.answer.store(ANSWER_PANIC, Ordering::SeqCst);
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

#[async_trait]
impl HealthProbe for StubProbe {
    async fn check(&self, url: &str) -> Result<bool> {
        self.urls.lock().push(url.to_string());
        match self.answer.load(Ordering::SeqCst) {
            ANSWER_UP => Ok(true),
            ANSWER_DOWN => Ok(false),
            ANSWER_ERROR => bail!("connection refused"),
            _ => panic!("probe blew up"),
        }
    }
}

/// Serves `GET /health` with `{"status": "up"|"down"}`; `/broken` returns 500.
pub struct HealthServer {
    addr: SocketAddr,
    up: Arc<AtomicBool>,
    handle: JoinHandle<()>,
    shutdown: tokio::sync::oneshot::Sender<()>,
}

async fn health(State(up): State<Arc<AtomicBool>>) -> impl IntoResponse {
    let status = if up.load(Ordering::SeqCst) { "up" } else { "down" };
    Json(json!({ "status": status }))
}

impl HealthServer {
    pub async fn start() -> Self {
        let up = Arc::new(AtomicBool::new(true));
        let app = Router::new()
            .route("/health", get(health))
            .route("/broken", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .route("/text", get(|| async { "up" }))
            .with_state(up.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            up,
            handle,
            shutdown: tx,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }

    pub async fn close(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.await;
    }
}
