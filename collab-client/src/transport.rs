//! # Session Transport
//!
//! [`CollaborationClient`] owns at most one session socket. Joining spawns a
//! connection task that:
//!
//! 1. opens `{api_url}/collaboration/session/{id}/ws`, sends `join`, and
//!    emits `connected`;
//! 2. decodes inbound frames, routes them through the participant registry
//!    and dispatches the resulting events;
//! 3. writes outbound messages queued by the send operations;
//! 4. on an unclean close, waits `attempt * base_delay` and reopens, until
//!    the attempt ceiling is reached.
//!
//! State changes go through [`ConnectionState::transition`]. Listeners run on
//! the connection task, one event at a time.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use collab_core::{
    current_timestamp, new_message_id, route_message, session_socket_url, ChatMessage,
    ClientMessage, CollabEvent, CollaborationParticipant, Comment, CommentAnchor,
    ConnectionAction, ConnectionInput, ConnectionState, CursorPosition, EventDispatcher,
    InboundMessage, ListenerId, ParticipantRegistry, ParticipantRole, Transition,
    WhiteboardElement,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::config::ClientConfig;
use crate::metrics::{self, Direction};
use crate::timer::{Timer, TokioTimer};

/// How long `leave_session` waits for the connection task before aborting it.
const LEAVE_TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Errors opening a session socket.
#[derive(Debug, Error)]
pub enum TransportError {
    /// URL or message encoding failed.
    #[error(transparent)]
    Collab(#[from] collab_core::CollabError),
    /// The bearer token is not a valid header value.
    #[error("invalid auth token: {0}")]
    InvalidToken(#[from] tungstenite::http::header::InvalidHeaderValue),
    /// Handshake or socket failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
}

/// Who is connected where.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SessionContext {
    session_id: String,
    user_id: String,
    user_name: String,
    role: ParticipantRole,
}

/// Connection state plus a generation bumped on every join and leave.
///
/// A connection task only applies transitions while its generation is
/// current, so a task outliving `leave_session` cannot touch the next session.
#[derive(Debug, Default)]
struct Connection {
    state: ConnectionState,
    generation: u64,
}

struct ConnectionTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// How a socket ended.
enum SocketEnd {
    /// Leave requested.
    Shutdown,
    /// Socket went away.
    Closed {
        clean: bool,
        code: Option<u16>,
        reason: Option<String>,
    },
}

impl SocketEnd {
    const fn unclean() -> Self {
        Self::Closed {
            clean: false,
            code: None,
            reason: None,
        }
    }
}

/// Real-time collaboration client.
///
/// Cheap to clone; clones share the same connection, listeners and registry.
#[derive(Clone)]
pub struct CollaborationClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: ClientConfig,
    timer: Arc<dyn Timer>,
    dispatcher: EventDispatcher,
    registry: ParticipantRegistry,
    connection: RwLock<Connection>,
    session: RwLock<Option<SessionContext>>,
    outgoing: RwLock<Option<mpsc::UnboundedSender<ClientMessage>>>,
    task: Mutex<Option<ConnectionTask>>,
}

impl std::fmt::Debug for CollaborationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollaborationClient")
            .field("api_url", &self.inner.config.api_url.as_str())
            .field("state", &self.connection_state())
            .field("session_id", &self.session_id())
            .field("participants", &self.inner.registry.len())
            .finish_non_exhaustive()
    }
}

impl CollaborationClient {
    /// Create a client that sleeps with Tokio between reconnect attempts.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self::with_timer(config, Arc::new(TokioTimer))
    }

    /// Create a client with a custom reconnect timer.
    #[must_use]
    pub fn with_timer(config: ClientConfig, timer: Arc<dyn Timer>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                timer,
                dispatcher: EventDispatcher::new(),
                registry: ParticipantRegistry::new(),
                connection: RwLock::new(Connection::default()),
                session: RwLock::new(None),
                outgoing: RwLock::new(None),
                task: Mutex::new(None),
            }),
        }
    }

    /// Join a session.
    ///
    /// Returns whether a connection attempt was started. Returns `false` when
    /// the client is already connecting, connected or reconnecting, when no
    /// Tokio runtime is available, or when the socket URL cannot be built.
    /// Success of the attempt is reported through `connected` / `error`
    /// events.
    pub fn join_session(
        &self,
        session_id: &str,
        user_id: &str,
        user_name: &str,
        role: ParticipantRole,
    ) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::error!("join_session called outside a Tokio runtime");
            return false;
        };

        let url = match session_socket_url(&self.inner.config.api_url, session_id) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(session_id, "Cannot build session URL: {}", e);
                self.inner.emit(&CollabEvent::error(e.to_string()));
                return false;
            }
        };

        let generation = {
            let mut connection = self.inner.write_connection();
            let t = connection
                .state
                .transition(ConnectionInput::Join, &self.inner.config.reconnect);
            if t.action != Some(ConnectionAction::Open) {
                tracing::debug!(
                    session_id,
                    state = %connection.state,
                    "Ignoring join, connection already active"
                );
                return false;
            }
            connection.state = t.state;
            connection.generation += 1;
            connection.generation
        };

        *write(&self.inner.session) = Some(SessionContext {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            role,
        });
        self.inner.registry.clear();

        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        *write(&self.inner.outgoing) = Some(outgoing_tx);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = runtime.spawn(run_connection(
            Arc::clone(&self.inner),
            generation,
            url,
            outgoing_rx,
            shutdown_rx,
        ));

        let previous = lock(&self.inner.task).replace(ConnectionTask {
            shutdown: shutdown_tx,
            handle,
        });
        if let Some(previous) = previous {
            // The replaced task has already closed its socket.
            previous.handle.abort();
        }

        tracing::info!(session_id, user_id, role = role.as_str(), "Joining session");
        true
    }

    /// Leave the current session.
    ///
    /// Sends `leave` if connected, closes the socket, cancels any pending
    /// reconnect, and forgets the session, user and participants. No-op when
    /// no session was joined.
    pub async fn leave_session(&self) {
        let Some(session) = write(&self.inner.session).take() else {
            return;
        };

        let was_connected = self.is_connected();
        if was_connected {
            self.inner.queue(ClientMessage::Leave {
                user_id: session.user_id.clone(),
                session_id: session.session_id.clone(),
                timestamp: current_timestamp(),
            });
        }

        {
            let mut connection = self.inner.write_connection();
            let t = connection
                .state
                .transition(ConnectionInput::Leave, &self.inner.config.reconnect);
            connection.state = t.state;
            connection.generation += 1;
        }

        let task = lock(&self.inner.task).take();
        if let Some(task) = task {
            let _ = task.shutdown.send(true);
            let mut handle = task.handle;
            if tokio::time::timeout(LEAVE_TIMEOUT, &mut handle).await.is_err() {
                tracing::warn!("Connection task did not stop in time, aborting");
                handle.abort();
            }
        }

        *write(&self.inner.outgoing) = None;
        self.inner.registry.clear();
        metrics::set_ws_connected(false);

        tracing::info!(session_id = %session.session_id, "Left session");
        if was_connected {
            self.inner.emit(&CollabEvent::Disconnected {
                clean: true,
                code: Some(u16::from(CloseCode::Normal)),
                reason: None,
            });
        }
    }

    /// Broadcast the local cursor position.
    pub fn update_cursor(&self, x: f64, y: f64) -> bool {
        self.send(|ctx, timestamp| ClientMessage::CursorUpdate {
            user_id: ctx.user_id.clone(),
            session_id: ctx.session_id.clone(),
            cursor: CursorPosition { x, y, timestamp },
            timestamp,
        })
    }

    /// Send a chat line as the local user.
    pub fn send_chat_message(&self, content: &str) -> bool {
        self.send(|ctx, timestamp| ClientMessage::ChatMessage {
            user_id: ctx.user_id.clone(),
            session_id: ctx.session_id.clone(),
            message: ChatMessage {
                id: new_message_id(),
                user_id: ctx.user_id.clone(),
                user_name: ctx.user_name.clone(),
                content: content.to_string(),
                timestamp,
            },
            timestamp,
        })
    }

    /// Send new document content. The server merges; the client does not.
    pub fn update_document(&self, content: Value, version: Option<u64>) -> bool {
        self.send(|ctx, timestamp| ClientMessage::DocumentUpdate {
            user_id: ctx.user_id.clone(),
            session_id: ctx.session_id.clone(),
            content,
            version,
            timestamp,
        })
    }

    /// Add a comment as the local user.
    pub fn add_comment(
        &self,
        content: &str,
        position: Option<CommentAnchor>,
        parent_id: Option<String>,
    ) -> bool {
        self.send(|ctx, timestamp| ClientMessage::AddComment {
            user_id: ctx.user_id.clone(),
            session_id: ctx.session_id.clone(),
            comment: Comment {
                id: new_message_id(),
                user_id: ctx.user_id.clone(),
                user_name: ctx.user_name.clone(),
                content: content.to_string(),
                position,
                parent_id,
                resolved: false,
                timestamp,
            },
            timestamp,
        })
    }

    /// Send the whiteboard element list after a local change.
    pub fn update_whiteboard(&self, elements: Vec<WhiteboardElement>) -> bool {
        self.send(|ctx, timestamp| ClientMessage::WhiteboardUpdate {
            user_id: ctx.user_id.clone(),
            session_id: ctx.session_id.clone(),
            elements,
            timestamp,
        })
    }

    /// Participants currently known for the joined session.
    #[must_use]
    pub fn get_participants(&self) -> Vec<CollaborationParticipant> {
        self.inner.registry.list()
    }

    /// The participant registry.
    #[must_use]
    pub fn registry(&self) -> &ParticipantRegistry {
        &self.inner.registry
    }

    /// Current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.read_connection().state
    }

    /// Whether the socket is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection_state().is_connected()
    }

    /// Joined session id.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        read(&self.inner.session).as_ref().map(|s| s.session_id.clone())
    }

    /// Local user id.
    #[must_use]
    pub fn user_id(&self) -> Option<String> {
        read(&self.inner.session).as_ref().map(|s| s.user_id.clone())
    }

    /// Register `callback` for `event`, or for everything with
    /// [`ANY_EVENT`](collab_core::ANY_EVENT).
    pub fn add_event_listener<F>(&self, event: impl Into<String>, callback: F) -> ListenerId
    where
        F: Fn(&CollabEvent) + Send + Sync + 'static,
    {
        self.inner.dispatcher.add_event_listener(event, callback)
    }

    /// Unregister a listener. Returns whether it was registered for `event`.
    pub fn remove_event_listener(&self, event: &str, id: ListenerId) -> bool {
        self.inner.dispatcher.remove_event_listener(event, id)
    }

    fn send(&self, build: impl FnOnce(&SessionContext, u64) -> ClientMessage) -> bool {
        // Held until queued, so a close cannot slip between check and send.
        let connection = self.inner.read_connection();
        if !connection.state.is_connected() {
            return false;
        }
        let Some(ctx) = read(&self.inner.session).clone() else {
            return false;
        };
        self.inner.queue(build(&ctx, current_timestamp()))
    }
}

impl Inner {
    fn read_connection(&self) -> std::sync::RwLockReadGuard<'_, Connection> {
        self.connection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_connection(&self) -> std::sync::RwLockWriteGuard<'_, Connection> {
        self.connection
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `input` if `generation` is still current.
    fn apply(&self, generation: u64, input: ConnectionInput) -> Option<Transition> {
        let mut connection = self.write_connection();
        if connection.generation != generation {
            return None;
        }
        let t = connection.state.transition(input, &self.config.reconnect);
        tracing::trace!(from = %connection.state, to = %t.state, ?input, "Connection transition");
        connection.state = t.state;
        Some(t)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.read_connection().generation == generation
    }

    fn queue(&self, message: ClientMessage) -> bool {
        read(&self.outgoing)
            .as_ref()
            .is_some_and(|tx| tx.send(message).is_ok())
    }

    fn emit(&self, event: &CollabEvent) {
        let report = self.dispatcher.trigger(event);
        metrics::record_listener_panics(report.panicked);
    }

    fn handle_text(&self, text: &str) {
        match InboundMessage::decode(text) {
            Ok(message) => {
                metrics::record_ws_message(Direction::Inbound, message.kind());
                tracing::debug!(kind = message.kind(), "Routing inbound message");
                let event = route_message(message, &self.registry);
                self.emit(&event);
            }
            Err(e) => {
                metrics::record_ws_message(Direction::Inbound, "invalid");
                tracing::warn!("Rejected inbound message: {}", e);
                self.emit(&CollabEvent::error(e.to_string()));
            }
        }
    }
}

async fn open_socket(config: &ClientConfig, url: &Url) -> Result<WsStream, TransportError> {
    let mut request = url.as_str().into_client_request()?;
    if let Some(token) = &config.auth_token {
        request.headers_mut().insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))?,
        );
    }
    let (stream, _response) = tokio_tungstenite::connect_async(request).await?;
    Ok(stream)
}

async fn run_connection(
    inner: Arc<Inner>,
    generation: u64,
    url: Url,
    mut outgoing: mpsc::UnboundedReceiver<ClientMessage>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tracing::debug!(url = %url, "Opening session socket");
        let opened = tokio::select! {
            biased;
            _ = shutdown.changed() => return,
            result = open_socket(&inner.config, &url) => result,
        };

        let end = match opened {
            Ok(stream) => {
                let Some(t) = inner.apply(generation, ConnectionInput::Opened) else {
                    return;
                };
                if t.action == Some(ConnectionAction::Close) {
                    return;
                }
                drive_socket(&inner, stream, &mut outgoing, &mut shutdown).await
            }
            Err(e) => {
                tracing::warn!(url = %url, "Session socket failed to open: {}", e);
                inner.emit(&CollabEvent::error(e.to_string()));
                SocketEnd::unclean()
            }
        };

        let SocketEnd::Closed {
            clean,
            code,
            reason,
        } = end
        else {
            return;
        };

        // Listeners for `disconnected` must already see the closed state.
        let Some(t) = inner.apply(generation, ConnectionInput::Closed { clean }) else {
            return;
        };

        // Nothing queued for a dead socket is delivered later.
        while outgoing.try_recv().is_ok() {}
        metrics::set_ws_connected(false);

        tracing::info!(clean, ?code, "Session socket closed");
        inner.emit(&CollabEvent::Disconnected {
            clean,
            code,
            reason,
        });

        // A listener may have rejoined or left.
        if !inner.is_current(generation) {
            return;
        }
        match t.action {
            Some(ConnectionAction::ScheduleReconnect { attempt, delay }) => {
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(
                    attempt,
                    max_attempts = inner.config.reconnect.max_attempts,
                    delay_ms,
                    "Scheduling reconnect"
                );
                metrics::record_reconnect_attempt();
                inner.emit(&CollabEvent::Reconnecting { attempt, delay_ms });

                tokio::select! {
                    biased;
                    _ = shutdown.changed() => return,
                    () = inner.timer.sleep(delay) => {}
                }

                let Some(t) = inner.apply(generation, ConnectionInput::ReconnectDue) else {
                    return;
                };
                if t.action != Some(ConnectionAction::Open) {
                    return;
                }
            }
            Some(ConnectionAction::GiveUp { attempts }) => {
                tracing::error!(attempts, "Reconnect attempts exhausted");
                inner.emit(&CollabEvent::ConnectionFailed { attempts });
                return;
            }
            _ => return,
        }
    }
}

/// Pump one open socket until it closes or leave is requested.
async fn drive_socket(
    inner: &Inner,
    stream: WsStream,
    outgoing: &mut mpsc::UnboundedReceiver<ClientMessage>,
    shutdown: &mut watch::Receiver<bool>,
) -> SocketEnd {
    let (mut sink, mut source) = stream.split();

    let Some(ctx) = read(&inner.session).clone() else {
        return SocketEnd::Shutdown;
    };
    let join = ClientMessage::Join {
        user_id: ctx.user_id.clone(),
        session_id: ctx.session_id.clone(),
        user_name: ctx.user_name.clone(),
        role: ctx.role,
        timestamp: current_timestamp(),
    };
    if let Err(e) = write_message(&mut sink, &join).await {
        tracing::warn!("Failed to send join: {}", e);
        return SocketEnd::unclean();
    }

    metrics::set_ws_connected(true);
    tracing::info!(session_id = %ctx.session_id, user_id = %ctx.user_id, "Connected to session");
    inner.emit(&CollabEvent::Connected {
        session_id: ctx.session_id,
        user_id: ctx.user_id,
    });

    loop {
        tokio::select! {
            biased;
            Some(message) = outgoing.recv() => {
                if let Err(e) = write_message(&mut sink, &message).await {
                    tracing::warn!(kind = message.type_name(), "Send failed: {}", e);
                    inner.emit(&CollabEvent::error(e.to_string()));
                    return SocketEnd::unclean();
                }
            }
            _ = shutdown.changed() => {
                while let Ok(message) = outgoing.try_recv() {
                    let _ = write_message(&mut sink, &message).await;
                }
                let _ = sink
                    .send(Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "leave".into(),
                    })))
                    .await;
                return SocketEnd::Shutdown;
            }
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => inner.handle_text(&text),
                Some(Ok(Message::Close(frame))) => {
                    // Flushes the automatic close reply.
                    let _ = sink.flush().await;
                    let (code, reason) = frame.map_or((None, None), |f| {
                        let reason = (!f.reason.is_empty()).then(|| f.reason.into_owned());
                        (Some(u16::from(f.code)), reason)
                    });
                    return SocketEnd::Closed { clean: true, code, reason };
                }
                Some(Ok(Message::Binary(bytes))) => {
                    tracing::debug!(len = bytes.len(), "Ignoring binary frame");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("Session socket error: {}", e);
                    inner.emit(&CollabEvent::error(e.to_string()));
                    return SocketEnd::unclean();
                }
                None => return SocketEnd::unclean(),
            }
        }
    }
}

async fn write_message(
    sink: &mut SplitSink<WsStream, Message>,
    message: &ClientMessage,
) -> Result<(), TransportError> {
    let text = message.encode()?;
    sink.send(Message::Text(text)).await?;
    metrics::record_ws_message(Direction::Outbound, message.type_name());
    Ok(())
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
