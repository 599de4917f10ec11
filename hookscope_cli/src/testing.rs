//! In-process mock of the Hookscope backend for tests

use crate::config::Config;
use crate::session::{CredentialStore, Session};
use axum::{
    body::Bytes,
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, head, post},
    Json, Router,
};
use hookscope_common::constants::AUTH_HEADER;
use hookscope_common::Registration;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Mutex;

/// One scripted server action on a live connection
#[derive(Debug, Clone)]
pub enum MockFrame {
    Text(String),
    Close(u16),
}

#[derive(Default)]
struct MockState {
    auths: Mutex<HashMap<String, String>>,
    scripts: Mutex<HashMap<String, Vec<MockFrame>>>,
    reject_registrations: AtomicBool,
    omit_token: AtomicBool,
    connections: AtomicUsize,
    active: AtomicUsize,
    close_replies: AtomicUsize,
    register_delay_ms: AtomicU64,
}

pub struct MockBackend {
    pub url: String,
    state: Arc<MockState>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());

        let app = Router::new()
            .route("/register", post(register))
            .route("/validate/{id}", head(validate))
            .route("/connect/{id}", get(connect))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            url: format!("http://{}", addr),
            state,
        }
    }

    pub fn config(&self) -> Config {
        Config::default().with_server(Some(self.url.clone()))
    }

    /// A session backed by a credential file inside `dir`
    pub fn session(&self, dir: &TempDir) -> Arc<Session> {
        let store = CredentialStore::open(dir.path().join("credential.yml")).unwrap();
        Arc::new(Session::new(self.config(), store).unwrap())
    }

    pub async fn insert(&self, id: &str, token: &str) {
        self.state
            .auths
            .lock()
            .await
            .insert(id.to_string(), token.to_string());
    }

    pub async fn script(&self, id: &str, frames: Vec<MockFrame>) {
        self.state.scripts.lock().await.insert(id.to_string(), frames);
    }

    pub fn reject_registrations(&self) {
        self.state.reject_registrations.store(true, Ordering::SeqCst);
    }

    pub fn omit_token(&self) {
        self.state.omit_token.store(true, Ordering::SeqCst);
    }

    /// Hold every `/register` response for `delay`
    pub fn delay_registrations(&self, delay: Duration) {
        self.state
            .register_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Server-initiated closes the client answered
    pub async fn wait_close_replies(&self, n: usize) {
        for _ in 0..200 {
            if self.state.close_replies.load(Ordering::SeqCst) >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {} close replies, found {}",
            n,
            self.state.close_replies.load(Ordering::SeqCst)
        );
    }

    /// Connections accepted so far
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Wait until exactly `n` connections are open
    pub async fn wait_active(&self, n: usize) {
        for _ in 0..200 {
            if self.state.active.load(Ordering::SeqCst) == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {} active connections, found {}",
            n,
            self.state.active.load(Ordering::SeqCst)
        );
    }
}

/// A request event frame as the backend would push it
pub fn frame(method: &str, uri: &str) -> String {
    serde_json::json!({
        "method": method,
        "contentType": "application/json",
        "body": "{\"ok\":true}",
        "complete": true,
        "headers": {"content-type": ["application/json"]},
        "cookies": {},
        "uri": uri,
        "remote": {"host": "localhost", "remoteIp": "127.0.0.1:40000", "headerIp": null, "clientIp": "127.0.0.1"},
        "time": "2024-03-01T12:30:45Z"
    })
    .to_string()
}

async fn register(State(state): State<Arc<MockState>>, body: Bytes) -> Response {
    let delay = state.register_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    if state.reject_registrations.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let registration = if body.is_empty() {
        Registration {
            id: uuid::Uuid::new_v4().simple().to_string(),
            token: uuid::Uuid::new_v4().simple().to_string(),
        }
    } else {
        match serde_json::from_slice::<Registration>(&body) {
            Ok(registration) => registration,
            Err(_) => return StatusCode::BAD_REQUEST.into_response(),
        }
    };

    let mut auths = state.auths.lock().await;
    if auths.contains_key(&registration.id) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    auths.insert(registration.id.clone(), registration.token.clone());

    if state.omit_token.load(Ordering::SeqCst) {
        return Json(serde_json::json!({ "id": registration.id })).into_response();
    }
    Json(registration).into_response()
}

async fn validate(
    State(state): State<Arc<MockState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> StatusCode {
    let token = headers
        .get(AUTH_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    match state.auths.lock().await.get(&id) {
        Some(expected) if expected == token => StatusCode::OK,
        Some(_) => StatusCode::UNAUTHORIZED,
        None => StatusCode::NOT_FOUND,
    }
}

async fn connect(
    State(state): State<Arc<MockState>>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let authorized = match (state.auths.lock().await.get(&id), params.get("token")) {
        (Some(expected), Some(token)) => expected == token,
        _ => false,
    };
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let script = state.scripts.lock().await.get(&id).cloned().unwrap_or_default();
    ws.on_upgrade(move |socket| serve_socket(socket, script, state))
}

async fn serve_socket(mut socket: WebSocket, script: Vec<MockFrame>, state: Arc<MockState>) {
    state.connections.fetch_add(1, Ordering::SeqCst);
    state.active.fetch_add(1, Ordering::SeqCst);

    let mut closed = false;
    for step in script {
        match step {
            MockFrame::Text(text) => {
                if socket.send(Message::Text(text.into())).await.is_err() {
                    closed = true;
                    break;
                }
            }
            MockFrame::Close(code) => {
                let _ = socket
                    .send(Message::Close(Some(CloseFrame {
                        code,
                        reason: "".into(),
                    })))
                    .await;
                let replied = tokio::time::timeout(Duration::from_secs(2), async {
                    while let Some(Ok(msg)) = socket.recv().await {
                        if matches!(msg, Message::Close(_)) {
                            return true;
                        }
                    }
                    false
                })
                .await
                .unwrap_or(false);
                if replied {
                    state.close_replies.fetch_add(1, Ordering::SeqCst);
                }
                closed = true;
                break;
            }
        }
    }

    if !closed {
        while let Some(Ok(msg)) = socket.recv().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    }

    state.active.fetch_sub(1, Ordering::SeqCst);
}
