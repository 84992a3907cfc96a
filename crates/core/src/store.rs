//! SessionStore trait — persistence boundary for chat sessions.
//!
//! The store is the only mutable shared resource in the system. It owns its
//! own concurrency discipline (the backing database's transaction
//! guarantees); callers treat it as an opaque, already-safe collaborator and
//! perform no locking of their own. Concurrent writes against the same
//! session may interleave — last-write-wins on title/summary updates is an
//! accepted weak-consistency property.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::session::{ChatMessage, ChatSession, SessionId};

/// A partial update to session-level fields.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub title: Option<String>,
    pub summary: Option<String>,
}

impl SessionPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.summary.is_none()
    }
}

/// The session persistence boundary.
///
/// Implementations: SQLite, in-memory (for testing and ephemeral runs).
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Fetch a session with its full message history.
    async fn get_session(&self, id: &SessionId) -> Result<Option<ChatSession>, StoreError>;

    /// Create a new empty session. `id` of `None` means "generate one".
    async fn create_session(
        &self,
        id: Option<SessionId>,
        user_id: &str,
    ) -> Result<ChatSession, StoreError>;

    /// Append a message to a session. Returns the stored message.
    async fn add_message(
        &self,
        session_id: &SessionId,
        message: ChatMessage,
    ) -> Result<ChatMessage, StoreError>;

    /// Apply a title/summary patch to a session. Fields set to `None` are
    /// left untouched.
    async fn update_session(
        &self,
        session_id: &SessionId,
        patch: SessionPatch,
    ) -> Result<(), StoreError>;

    /// List a user's sessions, most recently updated first.
    async fn user_sessions(&self, user_id: &str) -> Result<Vec<ChatSession>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_patch_detection() {
        assert!(SessionPatch::default().is_empty());
        assert!(
            !SessionPatch {
                title: Some("Kanji goals".into()),
                summary: None,
            }
            .is_empty()
        );
    }
}
