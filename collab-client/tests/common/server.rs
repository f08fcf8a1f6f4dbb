//! Test server harness for integration tests.
//!
//! Spins up a real Axum server on a random port that speaks the session
//! socket endpoint. Every frame a client sends is recorded; tests push
//! frames to, close, or drop the current socket through control methods.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Instruction for the currently open socket.
enum Control {
    Send(Value),
    Close { code: u16, reason: String },
    Drop,
}

#[derive(Default)]
struct Shared {
    upgrades: AtomicUsize,
    rejected: AtomicUsize,
    reject: AtomicBool,
    frames: Mutex<Vec<Value>>,
    sessions: Mutex<Vec<String>>,
    authorization: Mutex<Vec<Option<String>>>,
    control: Mutex<Option<mpsc::UnboundedSender<Control>>>,
}

#[derive(Clone, Default)]
struct ServerState {
    shared: Arc<Shared>,
}

/// A test server instance with control handles.
pub struct TestServer {
    addr: SocketAddr,
    state: ServerState,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

#[allow(dead_code)]
impl TestServer {
    /// Start a new test server on a random available port.
    ///
    /// # Panics
    ///
    /// Panics if no port is available or server fails to bind.
    pub async fn start() -> Self {
        let port = portpicker::pick_unused_port().expect("no available port");
        let addr = SocketAddr::from(([127, 0, 0, 1], port));

        let state = ServerState::default();
        let app = Router::new()
            .route("/api/collaboration/session/{session_id}/ws", get(ws_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind(addr).await.expect("failed to bind");
        let actual_addr = listener.local_addr().expect("failed to get local addr");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("server error");
        });

        tokio::time::sleep(Duration::from_millis(10)).await;

        Self {
            addr: actual_addr,
            state,
            shutdown_tx: Some(shutdown_tx),
            handle,
        }
    }

    /// API base URL to configure the client with.
    pub fn api_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    /// Sockets accepted so far.
    pub fn upgrades(&self) -> usize {
        self.state.shared.upgrades.load(Ordering::SeqCst)
    }

    /// Handshakes refused so far.
    pub fn rejected(&self) -> usize {
        self.state.shared.rejected.load(Ordering::SeqCst)
    }

    /// Refuse (503) every subsequent handshake.
    pub fn reject_connections(&self, reject: bool) {
        self.state.shared.reject.store(reject, Ordering::SeqCst);
    }

    /// Session ids from the request paths, in connection order.
    pub fn sessions(&self) -> Vec<String> {
        self.state.shared.sessions.lock().unwrap().clone()
    }

    /// `Authorization` header of each handshake, in order.
    pub fn authorization_headers(&self) -> Vec<Option<String>> {
        self.state.shared.authorization.lock().unwrap().clone()
    }

    /// Every JSON frame received from clients so far.
    pub fn frames(&self) -> Vec<Value> {
        self.state.shared.frames.lock().unwrap().clone()
    }

    /// Frames of one `type`.
    pub fn frames_of(&self, kind: &str) -> Vec<Value> {
        self.frames()
            .into_iter()
            .filter(|f| f["type"] == kind)
            .collect()
    }

    /// Wait until `count` frames of `kind` have arrived.
    ///
    /// # Panics
    ///
    /// Panics after 5 seconds.
    pub async fn wait_for_frames(&self, kind: &str, count: usize) -> Vec<Value> {
        self.wait_until(|| self.frames_of(kind).len() >= count).await;
        self.frames_of(kind)
    }

    /// Wait until `count` sockets were accepted.
    pub async fn wait_for_upgrades(&self, count: usize) {
        self.wait_until(|| self.upgrades() >= count).await;
    }

    /// Send a JSON frame on the current socket.
    pub fn send(&self, frame: Value) {
        self.control(Control::Send(frame));
    }

    /// Send a close frame, then end the current socket.
    pub fn close(&self, code: u16, reason: &str) {
        self.control(Control::Close {
            code,
            reason: reason.to_string(),
        });
    }

    /// End the current socket without a closing handshake.
    pub fn drop_connection(&self) {
        self.control(Control::Drop);
    }

    /// Gracefully shut down the server.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = tokio::time::timeout(Duration::from_secs(5), self.handle).await;
    }

    fn control(&self, control: Control) {
        let guard = self.state.shared.control.lock().unwrap();
        let tx = guard.as_ref().expect("no open socket");
        tx.send(control).expect("socket task gone");
    }

    async fn wait_until(&self, condition: impl Fn() -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for server condition"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    State(state): State<ServerState>,
) -> Response {
    let shared = &state.shared;
    if shared.reject.load(Ordering::SeqCst) {
        shared.rejected.fetch_add(1, Ordering::SeqCst);
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    shared.sessions.lock().unwrap().push(session_id);
    shared.authorization.lock().unwrap().push(
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    );

    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: ServerState) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    *state.shared.control.lock().unwrap() = Some(tx);
    state.shared.upgrades.fetch_add(1, Ordering::SeqCst);

    loop {
        tokio::select! {
            control = rx.recv() => match control {
                Some(Control::Send(frame)) => {
                    if socket.send(Message::Text(frame.to_string().into())).await.is_err() {
                        return;
                    }
                }
                Some(Control::Close { code, reason }) => {
                    let _ = socket
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    return;
                }
                Some(Control::Drop) | None => return,
            },
            message = socket.recv() => match message {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) {
                        state.shared.frames.lock().unwrap().push(frame);
                    }
                }
                Some(Ok(Message::Close(_)) | Err(_)) | None => return,
                Some(Ok(_)) => {}
            }
        }
    }
}
