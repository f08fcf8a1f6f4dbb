//! Session, participant and payload records.
//!
//! The server is the source of truth for every record in this module. The
//! client reads session snapshots, mirrors participants in a
//! [`ParticipantRegistry`](crate::ParticipantRegistry) and forwards
//! document, whiteboard, chat and comment payloads without merging them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of artifact a session is built around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionType {
    /// Shared text document.
    Document,
    /// Shared whiteboard.
    Whiteboard,
    /// Project board with tasks.
    Project,
    /// Threaded discussion.
    Discussion,
    /// Live video conference.
    VideoConference,
}

impl SessionType {
    /// Wire name of this session type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Whiteboard => "whiteboard",
            Self::Project => "project",
            Self::Discussion => "discussion",
            Self::VideoConference => "video-conference",
        }
    }
}

impl std::str::FromStr for SessionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" => Ok(Self::Document),
            "whiteboard" => Ok(Self::Whiteboard),
            "project" => Ok(Self::Project),
            "discussion" => Ok(Self::Discussion),
            "video-conference" => Ok(Self::VideoConference),
            other => Err(format!("unknown session type: {other}")),
        }
    }
}

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Running now.
    Active,
    /// Planned for later.
    Scheduled,
    /// Finished.
    Completed,
    /// Kept for reference only.
    Archived,
}

/// Role a participant holds in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    /// Created the session.
    Owner,
    /// May change content.
    Editor,
    /// May comment but not edit.
    Commenter,
    /// Read-only.
    Viewer,
}

impl ParticipantRole {
    /// Wire name of this role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Editor => "editor",
            Self::Commenter => "commenter",
            Self::Viewer => "viewer",
        }
    }
}

impl std::str::FromStr for ParticipantRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Self::Owner),
            "editor" => Ok(Self::Editor),
            "commenter" => Ok(Self::Commenter),
            "viewer" => Ok(Self::Viewer),
            other => Err(format!("unknown participant role: {other}")),
        }
    }
}

/// Presence of a participant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    /// Connected and active.
    #[default]
    Online,
    /// Connected but idle.
    Away,
    /// Connected, do not disturb.
    Busy,
    /// Not connected.
    Offline,
}

/// Last known pointer position of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    /// X position in content coordinates.
    pub x: f64,
    /// Y position in content coordinates.
    pub y: f64,
    /// When the position was reported (ms since epoch).
    pub timestamp: u64,
}

/// What a participant is allowed to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct ParticipantPermissions {
    /// May change content.
    #[serde(default)]
    pub can_edit: bool,
    /// May add comments.
    #[serde(default)]
    pub can_comment: bool,
    /// May share the session.
    #[serde(default)]
    pub can_share: bool,
    /// May invite other users.
    #[serde(default)]
    pub can_invite: bool,
    /// May export content.
    #[serde(default)]
    pub can_export: bool,
}

impl ParticipantPermissions {
    /// Default permission set for a role.
    #[must_use]
    pub const fn for_role(role: ParticipantRole) -> Self {
        match role {
            ParticipantRole::Owner => Self {
                can_edit: true,
                can_comment: true,
                can_share: true,
                can_invite: true,
                can_export: true,
            },
            ParticipantRole::Editor => Self {
                can_edit: true,
                can_comment: true,
                can_share: false,
                can_invite: false,
                can_export: true,
            },
            ParticipantRole::Commenter => Self {
                can_edit: false,
                can_comment: true,
                can_share: false,
                can_invite: false,
                can_export: false,
            },
            ParticipantRole::Viewer => Self {
                can_edit: false,
                can_comment: false,
                can_share: false,
                can_invite: false,
                can_export: false,
            },
        }
    }
}

/// A user's presence and permission record within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaborationParticipant {
    /// User identifier.
    pub user_id: String,
    /// Display name.
    pub name: String,
    /// Role in the session.
    pub role: ParticipantRole,
    /// Presence status.
    #[serde(default)]
    pub status: PresenceStatus,
    /// Last known cursor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorPosition>,
    /// Permission set. Derived from the role when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<ParticipantPermissions>,
    /// When the participant joined, as reported by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<String>,
}

impl CollaborationParticipant {
    /// Create an online participant with the role's default permissions.
    #[must_use]
    pub fn new(user_id: impl Into<String>, name: impl Into<String>, role: ParticipantRole) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
            role,
            status: PresenceStatus::Online,
            cursor: None,
            permissions: Some(ParticipantPermissions::for_role(role)),
            joined_at: None,
        }
    }

    /// Effective permissions: explicit set if present, role default otherwise.
    #[must_use]
    pub fn effective_permissions(&self) -> ParticipantPermissions {
        self.permissions
            .unwrap_or_else(|| ParticipantPermissions::for_role(self.role))
    }
}

/// Per-session settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(clippy::struct_excessive_bools)]
pub struct SessionSettings {
    /// Users without an account may join.
    pub allow_anonymous: bool,
    /// Owner must approve joins.
    pub require_approval: bool,
    /// Participant cap, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_participants: Option<u32>,
    /// Session is being recorded.
    pub recording_enabled: bool,
    /// Chat is available.
    pub chat_enabled: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            allow_anonymous: false,
            require_approval: false,
            max_participants: None,
            recording_enabled: false,
            chat_enabled: true,
        }
    }
}

/// The artifact a session points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentRef {
    /// Collaborative document id.
    Document(String),
    /// Whiteboard id.
    Whiteboard(String),
    /// Project id.
    Project(String),
    /// Discussion thread id.
    Discussion(String),
    /// Video conference id.
    VideoConference(String),
}

/// A server-tracked collaboration room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaborationSession {
    /// Session identifier.
    pub id: String,
    /// Artifact kind.
    #[serde(rename = "type")]
    pub session_type: SessionType,
    /// Title shown to users.
    pub title: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Owner's user id.
    pub owner_id: String,
    /// Participants at snapshot time.
    #[serde(default)]
    pub participants: Vec<CollaborationParticipant>,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Session settings.
    #[serde(default)]
    pub settings: SessionSettings,
    /// Document pointer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    /// Whiteboard pointer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whiteboard_id: Option<String>,
    /// Project pointer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Discussion pointer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discussion_id: Option<String>,
    /// Video conference pointer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_conference_id: Option<String>,
    /// Creation time, as reported by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Last update time, as reported by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl CollaborationSession {
    /// The content artifact this session points at, if the server sent one.
    ///
    /// When several pointers are present the one matching the session type wins.
    #[must_use]
    pub fn content(&self) -> Option<ContentRef> {
        let matching = match self.session_type {
            SessionType::Document => self.document_id.clone().map(ContentRef::Document),
            SessionType::Whiteboard => self.whiteboard_id.clone().map(ContentRef::Whiteboard),
            SessionType::Project => self.project_id.clone().map(ContentRef::Project),
            SessionType::Discussion => self.discussion_id.clone().map(ContentRef::Discussion),
            SessionType::VideoConference => self
                .video_conference_id
                .clone()
                .map(ContentRef::VideoConference),
        };

        matching
            .or_else(|| self.document_id.clone().map(ContentRef::Document))
            .or_else(|| self.whiteboard_id.clone().map(ContentRef::Whiteboard))
            .or_else(|| self.project_id.clone().map(ContentRef::Project))
            .or_else(|| self.discussion_id.clone().map(ContentRef::Discussion))
            .or_else(|| {
                self.video_conference_id
                    .clone()
                    .map(ContentRef::VideoConference)
            })
    }

    /// Find a participant in this snapshot.
    #[must_use]
    pub fn participant(&self, user_id: &str) -> Option<&CollaborationParticipant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }
}

/// Body of `POST /collaboration/sessions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// Artifact kind.
    #[serde(rename = "type")]
    pub session_type: SessionType,
    /// Title shown to users.
    pub title: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Owner's user id.
    pub owner_id: String,
    /// Settings, server defaults when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<SessionSettings>,
}

impl CreateSessionRequest {
    /// Create a request with no description and default settings.
    #[must_use]
    pub fn new(
        session_type: SessionType,
        title: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            session_type,
            title: title.into(),
            description: None,
            owner_id: owner_id.into(),
            settings: None,
        }
    }
}

/// Body of `POST /collaboration/sessions/{id}/invitations`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationRequest {
    /// Invitee email address.
    pub email: String,
    /// Role granted on acceptance.
    pub role: ParticipantRole,
    /// Optional personal note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Invitation record returned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    /// Invitation id.
    #[serde(default)]
    pub id: String,
    /// Session the invitation is for.
    #[serde(default)]
    pub session_id: String,
    /// Invitee email address.
    pub email: String,
    /// Role granted on acceptance.
    pub role: ParticipantRole,
    /// Server-side status (for example `pending`).
    #[serde(default)]
    pub status: String,
}

/// One shape on a whiteboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhiteboardElement {
    /// Element id.
    pub id: String,
    /// Shape kind (`rectangle`, `path`, `text`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// X position.
    #[serde(default)]
    pub x: f64,
    /// Y position.
    #[serde(default)]
    pub y: f64,
    /// Width, for sized shapes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    /// Height, for sized shapes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    /// Everything else the editor stores on the shape.
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

/// A chat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message id.
    pub id: String,
    /// Author's user id.
    pub user_id: String,
    /// Author's display name.
    #[serde(default)]
    pub user_name: String,
    /// Message text.
    pub content: String,
    /// When the message was written (ms since epoch).
    pub timestamp: u64,
}

/// Where a comment is attached.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommentAnchor {
    /// Text range in a document.
    Range {
        /// Start offset.
        start: u64,
        /// End offset.
        end: u64,
    },
    /// Point on a whiteboard.
    Point {
        /// X position.
        x: f64,
        /// Y position.
        y: f64,
    },
}

/// A comment on a document or whiteboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Comment id.
    pub id: String,
    /// Author's user id.
    pub user_id: String,
    /// Author's display name.
    #[serde(default)]
    pub user_name: String,
    /// Comment text.
    pub content: String,
    /// Anchor, if attached to a location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<CommentAnchor>,
    /// Parent comment id for replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Whether the thread is resolved.
    #[serde(default)]
    pub resolved: bool,
    /// When the comment was written (ms since epoch).
    pub timestamp: u64,
}
