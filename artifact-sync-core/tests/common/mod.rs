//! In-process HTTP bucket used by the transfer tests.
//!
//! Accepts `PUT` and `DELETE` on any path, records what it saw, and answers `500` for
//! paths listed in `failing`.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use artifact_sync_core::contract::{AttemptOutcome, ProgressSink};
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::routing::any;
use axum::Router;
use tokio::net::TcpListener;

pub const TOKEN: &str = "test-token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub method: Method,
    pub path: String,
    pub len: usize,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Clone, Default)]
struct BucketState {
    received: Arc<Mutex<Vec<Received>>>,
    failing: Arc<HashSet<String>>,
}

pub struct TestBucket {
    pub base_url: String,
    received: Arc<Mutex<Vec<Received>>>,
    _shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl TestBucket {
    pub async fn spawn() -> Self {
        Self::spawn_failing(&[]).await
    }

    /// Paths (without leading slash) that answer `500`.
    pub async fn spawn_failing(failing: &[&str]) -> Self {
        let state = BucketState {
            received: Arc::new(Mutex::new(Vec::new())),
            failing: Arc::new(failing.iter().map(|s| s.to_string()).collect()),
        };
        let received = Arc::clone(&state.received);

        let app = Router::new()
            .route("/{*path}", any(handle))
            .layer(DefaultBodyLimit::disable())
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener.local_addr().expect("Failed to get local address").port();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        Self {
            base_url: format!("http://127.0.0.1:{port}"),
            received,
            _shutdown_tx: shutdown_tx,
        }
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }

    pub fn paths(&self, method: Method) -> Vec<String> {
        self.received()
            .into_iter()
            .filter(|r| r.method == method)
            .map(|r| r.path)
            .collect()
    }
}

async fn handle(
    State(state): State<BucketState>,
    method: Method,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    state.received.lock().unwrap().push(Received {
        method: method.clone(),
        path: path.clone(),
        len: body.len(),
        authorization: header_value(header::AUTHORIZATION),
        content_type: header_value(header::CONTENT_TYPE),
    });

    if state.failing.contains(&path) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "bucket unavailable".to_string());
    }
    match method {
        Method::PUT => (StatusCode::CREATED, String::new()),
        Method::DELETE => (StatusCode::NO_CONTENT, String::new()),
        _ => (StatusCode::METHOD_NOT_ALLOWED, String::new()),
    }
}

/// Keeps every progress value it is handed.
#[derive(Default)]
pub struct RecordingSink {
    pub progress: Mutex<Vec<(String, u64, u64)>>,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<u64> {
        self.progress.lock().unwrap().iter().map(|p| p.1).collect()
    }
}

impl ProgressSink for RecordingSink {
    fn on_progress(&self, label: &str, bytes_sent: u64, total_bytes: u64) {
        self.progress
            .lock()
            .unwrap()
            .push((label.to_string(), bytes_sent, total_bytes));
    }

    fn on_attempt(&self, _label: &str, _attempt: u32, _outcome: &AttemptOutcome) {}
}
