//! Inbound message routing.
//!
//! Applies participant changes to the registry and produces the event to
//! dispatch. Unknown message types become [`CollabEvent::Custom`] under their
//! own name.

use crate::event::CollabEvent;
use crate::message::{InboundMessage, ServerMessage};
use crate::registry::ParticipantRegistry;

/// Route one validated inbound message.
pub fn route_message(message: InboundMessage, registry: &ParticipantRegistry) -> CollabEvent {
    let message = match message {
        InboundMessage::Known(message) => message,
        InboundMessage::Passthrough { kind, payload } => {
            tracing::debug!(kind = %kind, "Passing through unrecognized message");
            return CollabEvent::Custom {
                name: kind,
                payload,
            };
        }
    };

    match message {
        ServerMessage::ParticipantJoined { participant } => {
            tracing::debug!(user_id = %participant.user_id, "Participant joined");
            registry.upsert(participant.clone());
            CollabEvent::ParticipantJoined(participant)
        }
        ServerMessage::ParticipantLeft { user_id } => {
            tracing::debug!(user_id = %user_id, "Participant left");
            registry.remove(&user_id);
            CollabEvent::ParticipantLeft { user_id }
        }
        ServerMessage::CursorUpdate { user_id, cursor } => {
            if !registry.update_cursor(&user_id, cursor) {
                tracing::trace!(user_id = %user_id, "Cursor update for unknown participant");
            }
            CollabEvent::CursorUpdate { user_id, cursor }
        }
        ServerMessage::DocumentUpdate {
            user_id,
            content,
            version,
            timestamp,
        } => CollabEvent::DocumentUpdate {
            user_id,
            content,
            version,
            timestamp,
        },
        ServerMessage::WhiteboardUpdate {
            user_id,
            elements,
            timestamp,
        } => CollabEvent::WhiteboardUpdate {
            user_id,
            elements,
            timestamp,
        },
        ServerMessage::ChatMessage { message } => CollabEvent::ChatMessage(message),
        ServerMessage::CommentAdded { comment } => CollabEvent::CommentAdded(comment),
        ServerMessage::Error { message, code } => {
            let message = match code {
                Some(code) => format!("{code}: {message}"),
                None => message,
            };
            tracing::warn!("Server reported error: {}", message);
            CollabEvent::Error { message }
        }
    }
}
