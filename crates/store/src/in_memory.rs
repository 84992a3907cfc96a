//! In-memory session store — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::Utc;
use kotoba_core::error::StoreError;
use kotoba_core::session::{ChatMessage, ChatSession, SessionId};
use kotoba_core::store::{SessionPatch, SessionStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// An in-memory store keeping sessions in a HashMap.
pub struct InMemoryStore {
    sessions: Arc<RwLock<HashMap<SessionId, ChatSession>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<ChatSession>, StoreError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn create_session(
        &self,
        id: Option<SessionId>,
        user_id: &str,
    ) -> Result<ChatSession, StoreError> {
        let session = ChatSession::new(id.unwrap_or_default(), user_id);
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(StoreError::Storage(format!(
                "session {} already exists",
                session.id
            )));
        }
        sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn add_message(
        &self,
        session_id: &SessionId,
        message: ChatMessage,
    ) -> Result<ChatMessage, StoreError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;
        session.push(message.clone());
        Ok(message)
    }

    async fn update_session(
        &self,
        session_id: &SessionId,
        patch: SessionPatch,
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;
        if let Some(title) = patch.title {
            session.title = Some(title);
        }
        if let Some(summary) = patch.summary {
            session.summary = Some(summary);
        }
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn user_sessions(&self, user_id: &str) -> Result<Vec<ChatSession>, StoreError> {
        let sessions = self.sessions.read().await;
        let mut results: Vec<ChatSession> = sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        results.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_fetch_session() {
        let store = InMemoryStore::new();
        let created = store.create_session(None, "user_1").await.unwrap();

        let fetched = store.get_session(&created.id).await.unwrap();
        assert!(fetched.is_some());
        assert_eq!(fetched.unwrap().user_id, "user_1");
    }

    #[tokio::test]
    async fn create_with_explicit_id() {
        let store = InMemoryStore::new();
        let id = SessionId::new();
        let created = store
            .create_session(Some(id.clone()), "user_1")
            .await
            .unwrap();
        assert_eq!(created.id, id);

        // Creating the same id twice is an error
        assert!(store.create_session(Some(id), "user_1").await.is_err());
    }

    #[tokio::test]
    async fn messages_append_in_order() {
        let store = InMemoryStore::new();
        let session = store.create_session(None, "user_1").await.unwrap();

        store
            .add_message(&session.id, ChatMessage::user("first"))
            .await
            .unwrap();
        store
            .add_message(&session.id, ChatMessage::user("second"))
            .await
            .unwrap();

        let fetched = store.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(fetched.messages.len(), 2);
        assert_eq!(fetched.messages[0].content, "first");
        assert_eq!(fetched.messages[1].content, "second");
    }

    #[tokio::test]
    async fn add_message_to_missing_session_fails() {
        let store = InMemoryStore::new();
        let result = store
            .add_message(&SessionId::new(), ChatMessage::user("orphan"))
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn patch_updates_only_set_fields() {
        let store = InMemoryStore::new();
        let session = store.create_session(None, "user_1").await.unwrap();

        store
            .update_session(
                &session.id,
                SessionPatch {
                    title: None,
                    summary: Some("Goal: learn 10 kanji".into()),
                },
            )
            .await
            .unwrap();

        let fetched = store.get_session(&session.id).await.unwrap().unwrap();
        assert!(fetched.title.is_none());
        assert_eq!(fetched.summary.as_deref(), Some("Goal: learn 10 kanji"));
    }

    #[tokio::test]
    async fn user_sessions_most_recent_first() {
        let store = InMemoryStore::new();
        let a = store.create_session(None, "user_1").await.unwrap();
        let b = store.create_session(None, "user_1").await.unwrap();
        store.create_session(None, "user_2").await.unwrap();

        // Touch session `a` so it becomes the most recently updated
        store
            .add_message(&a.id, ChatMessage::user("ping"))
            .await
            .unwrap();

        let sessions = store.user_sessions("user_1").await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, a.id);
        assert_eq!(sessions[1].id, b.id);
    }
}
