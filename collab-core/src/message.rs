//! # Session Wire Protocol
//!
//! JSON text frames exchanged over the session socket. Every frame is an
//! object with a snake_case `type` tag; payload fields are camelCase.
//!
//! ## Client -> Server
//!
//! - `{"type": "join", "userId": "...", "sessionId": "...", "userName": "...", "role": "editor", "timestamp": 0}`
//! - `{"type": "leave", "userId": "...", "sessionId": "...", "timestamp": 0}`
//! - `{"type": "cursor_update", "cursor": {"x": 0, "y": 0, "timestamp": 0}, ...}`
//! - `{"type": "chat_message", "message": {...}, ...}`
//! - `{"type": "document_update", "content": ..., "version": 3, ...}`
//! - `{"type": "add_comment", "comment": {...}, ...}`
//! - `{"type": "whiteboard_update", "elements": [...], ...}`
//!
//! ## Server -> Client
//!
//! - `{"type": "participant_joined", "participant": {...}}`
//! - `{"type": "participant_left", "userId": "..."}`
//! - `{"type": "document_update", "userId": "...", "content": ...}`
//! - `{"type": "whiteboard_update", "userId": "...", "elements": [...]}`
//! - `{"type": "cursor_update", "userId": "...", "cursor": {...}}`
//! - `{"type": "chat_message", "message": {...}}`
//! - `{"type": "comment_added", "comment": {...}}`
//! - `{"type": "error", "message": "...", "code": "..."}`
//!
//! Any other server `type` is passed through untouched.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CollabError, CollabResult};
use crate::model::{
    ChatMessage, CollaborationParticipant, Comment, CursorPosition, ParticipantRole,
    WhiteboardElement,
};

/// Client-to-server socket messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Announce this user in the session.
    Join {
        /// Local user id.
        user_id: String,
        /// Session being joined.
        session_id: String,
        /// Display name.
        user_name: String,
        /// Requested role.
        role: ParticipantRole,
        /// Send time (ms since epoch).
        timestamp: u64,
    },
    /// Announce this user is leaving.
    Leave {
        /// Local user id.
        user_id: String,
        /// Session being left.
        session_id: String,
        /// Send time (ms since epoch).
        timestamp: u64,
    },
    /// Local pointer moved.
    CursorUpdate {
        /// Local user id.
        user_id: String,
        /// Current session.
        session_id: String,
        /// New cursor position.
        cursor: CursorPosition,
        /// Send time (ms since epoch).
        timestamp: u64,
    },
    /// Chat line from the local user.
    ChatMessage {
        /// Local user id.
        user_id: String,
        /// Current session.
        session_id: String,
        /// The chat line.
        message: ChatMessage,
        /// Send time (ms since epoch).
        timestamp: u64,
    },
    /// Document content changed locally.
    DocumentUpdate {
        /// Local user id.
        user_id: String,
        /// Current session.
        session_id: String,
        /// New document content.
        content: Value,
        /// Version the edit was based on.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<u64>,
        /// Send time (ms since epoch).
        timestamp: u64,
    },
    /// New comment from the local user.
    AddComment {
        /// Local user id.
        user_id: String,
        /// Current session.
        session_id: String,
        /// The comment.
        comment: Comment,
        /// Send time (ms since epoch).
        timestamp: u64,
    },
    /// Whiteboard elements changed locally.
    WhiteboardUpdate {
        /// Local user id.
        user_id: String,
        /// Current session.
        session_id: String,
        /// Full element list after the change.
        elements: Vec<WhiteboardElement>,
        /// Send time (ms since epoch).
        timestamp: u64,
    },
}

impl ClientMessage {
    /// Wire `type` tag of this message.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Leave { .. } => "leave",
            Self::CursorUpdate { .. } => "cursor_update",
            Self::ChatMessage { .. } => "chat_message",
            Self::DocumentUpdate { .. } => "document_update",
            Self::AddComment { .. } => "add_comment",
            Self::WhiteboardUpdate { .. } => "whiteboard_update",
        }
    }

    /// Serialize to a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`CollabError::Serialization`] if a payload value cannot be encoded.
    pub fn encode(&self) -> CollabResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Server-to-client socket messages with a known shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// A participant entered the session.
    ParticipantJoined {
        /// The new participant.
        participant: CollaborationParticipant,
    },
    /// A participant left the session.
    ParticipantLeft {
        /// Departing user id.
        user_id: String,
    },
    /// Document content broadcast.
    DocumentUpdate {
        /// Author of the change.
        user_id: String,
        /// New document content.
        content: Value,
        /// Server version after the change.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<u64>,
        /// Change time (ms since epoch).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
    /// Whiteboard broadcast.
    WhiteboardUpdate {
        /// Author of the change.
        user_id: String,
        /// Element list after the change.
        elements: Vec<WhiteboardElement>,
        /// Change time (ms since epoch).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
    /// Remote pointer moved.
    CursorUpdate {
        /// Owner of the cursor.
        user_id: String,
        /// New cursor position.
        cursor: CursorPosition,
    },
    /// Chat line broadcast.
    ChatMessage {
        /// The chat line.
        message: ChatMessage,
    },
    /// Comment broadcast.
    CommentAdded {
        /// The comment.
        comment: Comment,
    },
    /// Server-reported error.
    Error {
        /// Human-readable message.
        message: String,
        /// Machine-readable code, if the server sent one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl ServerMessage {
    /// `type` tags decoded into [`ServerMessage`] rather than passed through.
    pub const KNOWN_TYPES: [&'static str; 8] = [
        "participant_joined",
        "participant_left",
        "document_update",
        "whiteboard_update",
        "cursor_update",
        "chat_message",
        "comment_added",
        "error",
    ];

    /// Wire `type` tag of this message.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::ParticipantJoined { .. } => "participant_joined",
            Self::ParticipantLeft { .. } => "participant_left",
            Self::DocumentUpdate { .. } => "document_update",
            Self::WhiteboardUpdate { .. } => "whiteboard_update",
            Self::CursorUpdate { .. } => "cursor_update",
            Self::ChatMessage { .. } => "chat_message",
            Self::CommentAdded { .. } => "comment_added",
            Self::Error { .. } => "error",
        }
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// A message with a known type and a valid shape.
    Known(ServerMessage),
    /// A message with an unrecognized type, kept verbatim.
    Passthrough {
        /// The frame's `type` tag.
        kind: String,
        /// The whole frame.
        payload: Value,
    },
}

impl InboundMessage {
    /// Decode and validate a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`CollabError::Serialization`] for invalid JSON and
    /// [`CollabError::InvalidMessage`] when the frame has no string `type`
    /// or a known type with the wrong shape.
    pub fn decode(text: &str) -> CollabResult<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Validate an already parsed frame.
    ///
    /// # Errors
    ///
    /// See [`InboundMessage::decode`].
    pub fn from_value(value: Value) -> CollabResult<Self> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| CollabError::InvalidMessage("missing string `type` field".into()))?
            .to_string();

        if ServerMessage::KNOWN_TYPES.contains(&kind.as_str()) {
            serde_json::from_value(value)
                .map(Self::Known)
                .map_err(|e| CollabError::InvalidMessage(format!("{kind}: {e}")))
        } else {
            Ok(Self::Passthrough {
                kind,
                payload: value,
            })
        }
    }

    /// The frame's `type` tag.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Known(message) => message.type_name(),
            Self::Passthrough { kind, .. } => kind,
        }
    }
}

/// Current time in milliseconds since the Unix epoch.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Fresh id for a client-authored chat line or comment.
#[must_use]
pub fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
