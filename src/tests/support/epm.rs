// Fake package manager API for the EPM driver.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::backend::epm::{ResourceGroup, Vdu};

#[derive(Default)]
pub struct EpmState {
    pub uploads: Vec<(String, Bytes)>,
    pub deleted: Vec<String>,
    pub group: ResourceGroup,
}

type Shared = Arc<Mutex<EpmState>>;

pub struct FakeEpm {
    addr: SocketAddr,
    state: Shared,
    handle: JoinHandle<()>,
    shutdown: tokio::sync::oneshot::Sender<()>,
}

async fn upload(State(state): State<Shared>, headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let mut state = state.lock();
    state.uploads.push((content_type, body));
    Json(state.group.clone())
}

async fn resource_group(State(state): State<Shared>, Path(id): Path<String>) -> impl IntoResponse {
    let state = state.lock();
    if state.group.id == id && !state.deleted.contains(&id) {
        Json(state.group.clone()).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

async fn remove(State(state): State<Shared>, Path(id): Path<String>) -> StatusCode {
    let mut state = state.lock();
    if state.deleted.contains(&id) {
        return StatusCode::NOT_FOUND;
    }
    state.deleted.push(id);
    StatusCode::OK
}

impl FakeEpm {
    /// Serves `/v1/...` with one resource group holding a single running VDU.
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(EpmState {
            group: ResourceGroup {
                id: "rg-42".to_string(),
                name: "svc".to_string(),
                vdus: vec![Vdu {
                    id: "vdu-1".to_string(),
                    name: "web".to_string(),
                    image_name: "nginx:latest".to_string(),
                    compute_id: "cmp-9".to_string(),
                    ip: "192.168.1.20".to_string(),
                    status: "Running".to_string(),
                }],
            },
            ..EpmState::default()
        }));

        let app = Router::new()
            .route("/v1/packages", get(|| async { Json(Vec::<String>::new()) }).post(upload))
            .route("/v1/packages/:id", delete(remove))
            .route("/v1/resourceGroups/:id", get(resource_group))
            .with_state(state.clone());

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
            state,
            handle,
            shutdown: tx,
        }
    }

    pub fn api(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    pub fn set_status(&self, status: &str) {
        for vdu in self.state.lock().group.vdus.iter_mut() {
            vdu.status = status.to_string();
        }
    }

    pub fn uploads(&self) -> Vec<(String, Bytes)> {
        self.state.lock().uploads.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().deleted.clone()
    }

    pub async fn close(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.await;
    }
}
