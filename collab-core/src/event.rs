//! Client events and the listener registry that dispatches them.
//!
//! Listeners are registered per event name (see [`CollabEvent::name`]) or
//! for every event with [`ANY_EVENT`]. Dispatch is synchronous and follows
//! registration order; a panicking listener is logged and skipped.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde_json::Value;

use crate::model::{ChatMessage, CollaborationParticipant, Comment, CursorPosition, WhiteboardElement};

/// Listener key that receives every event.
pub const ANY_EVENT: &str = "*";

/// Events emitted by a collaboration client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CollabEvent {
    /// Socket opened and `join` sent.
    Connected {
        /// Joined session.
        session_id: String,
        /// Local user.
        user_id: String,
    },
    /// Socket closed.
    Disconnected {
        /// Closing handshake completed.
        clean: bool,
        /// Close code, when a close frame arrived.
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<u16>,
        /// Close reason, when non-empty.
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// A reconnect has been scheduled.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
        /// Delay before the attempt (ms).
        delay_ms: u64,
    },
    /// Reconnect attempts are exhausted.
    ConnectionFailed {
        /// Attempts made before giving up.
        attempts: u32,
    },
    /// Socket, protocol or server error.
    Error {
        /// Human-readable message.
        message: String,
    },
    /// A participant entered the session.
    ParticipantJoined(CollaborationParticipant),
    /// A participant left the session.
    ParticipantLeft {
        /// Departing user.
        user_id: String,
    },
    /// Remote pointer moved.
    CursorUpdate {
        /// Owner of the cursor.
        user_id: String,
        /// New position.
        cursor: CursorPosition,
    },
    /// Document content broadcast.
    DocumentUpdate {
        /// Author of the change.
        user_id: String,
        /// New content.
        content: Value,
        /// Server version after the change.
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<u64>,
        /// Change time (ms since epoch).
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
    /// Whiteboard broadcast.
    WhiteboardUpdate {
        /// Author of the change.
        user_id: String,
        /// Element list after the change.
        elements: Vec<WhiteboardElement>,
        /// Change time (ms since epoch).
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
    /// Chat line broadcast.
    ChatMessage(ChatMessage),
    /// Comment broadcast.
    CommentAdded(Comment),
    /// Server message of a type this client does not model.
    Custom {
        /// The message's `type` tag, used as the event name.
        name: String,
        /// The whole message.
        payload: Value,
    },
}

impl CollabEvent {
    /// Name listeners subscribe to.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Disconnected { .. } => "disconnected",
            Self::Reconnecting { .. } => "reconnecting",
            Self::ConnectionFailed { .. } => "connection_failed",
            Self::Error { .. } => "error",
            Self::ParticipantJoined(_) => "participant_joined",
            Self::ParticipantLeft { .. } => "participant_left",
            Self::CursorUpdate { .. } => "cursor_update",
            Self::DocumentUpdate { .. } => "document_update",
            Self::WhiteboardUpdate { .. } => "whiteboard_update",
            Self::ChatMessage(_) => "chat_message",
            Self::CommentAdded(_) => "comment_added",
            Self::Custom { name, .. } => name,
        }
    }

    /// Shorthand for an [`CollabEvent::Error`].
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Listener callback.
pub type Listener = Arc<dyn Fn(&CollabEvent) + Send + Sync>;

/// Handle returned by [`EventDispatcher::add_event_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Outcome of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Listeners that ran to completion.
    pub invoked: usize,
    /// Listeners that panicked.
    pub panicked: usize,
}

/// Named publish/subscribe registry.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<HashMap<String, Vec<(ListenerId, Listener)>>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<String, usize> = self
            .read()
            .iter()
            .map(|(name, list)| (name.clone(), list.len()))
            .collect();
        f.debug_struct("EventDispatcher")
            .field("listeners", &counts)
            .finish_non_exhaustive()
    }
}

impl EventDispatcher {
    /// Create an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `event`. Use [`ANY_EVENT`] to receive everything.
    pub fn add_event_listener<F>(&self, event: impl Into<String>, callback: F) -> ListenerId
    where
        F: Fn(&CollabEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.write()
            .entry(event.into())
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Unregister a listener. Returns whether it was registered for `event`.
    pub fn remove_event_listener(&self, event: &str, id: ListenerId) -> bool {
        let mut listeners = self.write();
        let Some(list) = listeners.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            listeners.remove(event);
        }
        removed
    }

    /// Number of listeners registered for `event`.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.read().get(event).map_or(0, Vec::len)
    }

    /// Drop every listener.
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Invoke the listeners for `event`, then the [`ANY_EVENT`] listeners.
    ///
    /// Runs against a snapshot, so listeners may add or remove listeners
    /// without affecting the dispatch in progress.
    pub fn trigger(&self, event: &CollabEvent) -> DispatchReport {
        let snapshot: Vec<Listener> = {
            let listeners = self.read();
            let named = listeners.get(event.name()).into_iter().flatten();
            // A passthrough typed "*" already selected the wildcard list.
            let any = listeners
                .get(ANY_EVENT)
                .filter(|_| event.name() != ANY_EVENT)
                .into_iter()
                .flatten();
            named.chain(any).map(|(_, l)| Arc::clone(l)).collect()
        };

        let mut report = DispatchReport::default();
        for listener in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => report.invoked += 1,
                Err(panic) => {
                    report.panicked += 1;
                    tracing::error!(
                        event = event.name(),
                        "Event listener panicked: {}",
                        panic_message(panic.as_ref())
                    );
                }
            }
        }
        report
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Vec<(ListenerId, Listener)>>> {
        self.listeners
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Vec<(ListenerId, Listener)>>> {
        self.listeners
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
