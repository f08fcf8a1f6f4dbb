//! Local mirror of the participants in the joined session.
//!
//! Best-effort only: the server is authoritative and a concurrent reader may
//! observe the registry before or after any given event was applied.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::model::{CollaborationParticipant, CursorPosition, PresenceStatus};

/// Participant map keyed by user id.
#[derive(Debug, Default)]
pub struct ParticipantRegistry {
    participants: RwLock<BTreeMap<String, CollaborationParticipant>>,
}

impl ParticipantRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a participant. Returns the previous record.
    pub fn upsert(&self, participant: CollaborationParticipant) -> Option<CollaborationParticipant> {
        let mut participants = self.write();
        participants.insert(participant.user_id.clone(), participant)
    }

    /// Remove a participant. Returns the removed record.
    pub fn remove(&self, user_id: &str) -> Option<CollaborationParticipant> {
        self.write().remove(user_id)
    }

    /// Record a new cursor position. Returns `false` for unknown users.
    pub fn update_cursor(&self, user_id: &str, cursor: CursorPosition) -> bool {
        match self.write().get_mut(user_id) {
            Some(participant) => {
                participant.cursor = Some(cursor);
                true
            }
            None => false,
        }
    }

    /// Record a new presence status. Returns `false` for unknown users.
    pub fn set_status(&self, user_id: &str, status: PresenceStatus) -> bool {
        match self.write().get_mut(user_id) {
            Some(participant) => {
                participant.status = status;
                true
            }
            None => false,
        }
    }

    /// Look up one participant.
    #[must_use]
    pub fn get(&self, user_id: &str) -> Option<CollaborationParticipant> {
        self.read().get(user_id).cloned()
    }

    /// Whether a participant is present.
    #[must_use]
    pub fn contains(&self, user_id: &str) -> bool {
        self.read().contains_key(user_id)
    }

    /// All participants, ordered by user id.
    #[must_use]
    pub fn list(&self) -> Vec<CollaborationParticipant> {
        self.read().values().cloned().collect()
    }

    /// Number of participants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Forget every participant.
    pub fn clear(&self) {
        self.write().clear();
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, CollaborationParticipant>> {
        self.participants
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, CollaborationParticipant>> {
        self.participants
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
