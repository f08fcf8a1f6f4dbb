//! # Connect Collab Core
//!
//! Transport-independent pieces of the collaboration client.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                collab-core                  │
//! ├─────────────────────────────────────────────┤
//! │  Wire Protocol   │  Session Model           │
//! │  - ClientMessage │  - Sessions, invites     │
//! │  - ServerMessage │  - Participants, roles   │
//! │  - Passthrough   │  - Chat, comments        │
//! ├─────────────────────────────────────────────┤
//! │  Router ──► Registry       Dispatcher       │
//! │  Connection state machine (reconnect)       │
//! └─────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod connection;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod message;
pub mod model;
pub mod registry;
pub mod router;

pub use connection::{
    ConnectionAction, ConnectionInput, ConnectionState, ReconnectPolicy, Transition,
};
pub use endpoint::{api_endpoint, session_socket_url};
pub use error::{CollabError, CollabResult};
pub use event::{CollabEvent, DispatchReport, EventDispatcher, Listener, ListenerId, ANY_EVENT};
pub use message::{current_timestamp, new_message_id, ClientMessage, InboundMessage, ServerMessage};
pub use model::{
    ChatMessage, CollaborationParticipant, CollaborationSession, Comment, CommentAnchor,
    ContentRef, CreateSessionRequest, CursorPosition, Invitation, InvitationRequest,
    ParticipantPermissions, ParticipantRole, PresenceStatus, SessionSettings, SessionStatus,
    SessionType, WhiteboardElement,
};
pub use registry::ParticipantRegistry;
pub use router::route_message;

/// Collab core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
