//! SQLite session store.
//!
//! A single database file with two tables:
//! - `sessions` — one row per conversation (title, summary, timestamps)
//! - `messages` — append-only turns, FK cascade to their session
//!
//! Insertion order is preserved via the integer rowid, so reads come back
//! in chronological order without relying on timestamp precision.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kotoba_core::error::StoreError;
use kotoba_core::session::{ChatMessage, ChatSession, MessageMeta, Role, SessionId};
use kotoba_core::store::{SessionPatch, SessionStore};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// A durable SQLite session store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store from a file path.
    ///
    /// The database and all tables/indexes are created automatically.
    /// Pass `":memory:"` for an in-process ephemeral database (useful for
    /// tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite session store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id         TEXT PRIMARY KEY,
                user_id    TEXT NOT NULL,
                title      TEXT,
                summary    TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("sessions table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                iid        INTEGER PRIMARY KEY AUTOINCREMENT,
                id         TEXT UNIQUE NOT NULL,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                role       TEXT NOT NULL,
                content    TEXT NOT NULL,
                timestamp  TEXT NOT NULL,
                meta       TEXT NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, iid)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages index: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id, updated_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("sessions index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn role_to_str(role: Role) -> &'static str {
        match role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    fn role_from_str(s: &str) -> Result<Role, StoreError> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(StoreError::QueryFailed(format!("unknown role '{other}'"))),
        }
    }

    fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StoreError::QueryFailed(format!("bad timestamp '{s}': {e}")))
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<ChatMessage, StoreError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let role_str: String = row
            .try_get("role")
            .map_err(|e| StoreError::QueryFailed(format!("role column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| StoreError::QueryFailed(format!("content column: {e}")))?;
        let timestamp: String = row
            .try_get("timestamp")
            .map_err(|e| StoreError::QueryFailed(format!("timestamp column: {e}")))?;
        let meta_json: String = row
            .try_get("meta")
            .map_err(|e| StoreError::QueryFailed(format!("meta column: {e}")))?;

        let meta: MessageMeta = serde_json::from_str(&meta_json)
            .map_err(|e| StoreError::QueryFailed(format!("bad meta json: {e}")))?;

        Ok(ChatMessage {
            id,
            role: Self::role_from_str(&role_str)?,
            content,
            timestamp: Self::parse_timestamp(&timestamp)?,
            meta,
        })
    }

    fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<ChatSession, StoreError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let user_id: String = row
            .try_get("user_id")
            .map_err(|e| StoreError::QueryFailed(format!("user_id column: {e}")))?;
        let title: Option<String> = row
            .try_get("title")
            .map_err(|e| StoreError::QueryFailed(format!("title column: {e}")))?;
        let summary: Option<String> = row
            .try_get("summary")
            .map_err(|e| StoreError::QueryFailed(format!("summary column: {e}")))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;
        let updated_at: String = row
            .try_get("updated_at")
            .map_err(|e| StoreError::QueryFailed(format!("updated_at column: {e}")))?;

        Ok(ChatSession {
            id: SessionId(id),
            user_id,
            title,
            summary,
            messages: Vec::new(),
            created_at: Self::parse_timestamp(&created_at)?,
            updated_at: Self::parse_timestamp(&updated_at)?,
        })
    }

    async fn load_messages(&self, session_id: &SessionId) -> Result<Vec<ChatMessage>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, role, content, timestamp, meta FROM messages
             WHERE session_id = ? ORDER BY iid ASC",
        )
        .bind(&session_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("load messages: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<ChatSession>, StoreError> {
        let row = sqlx::query(
            "SELECT id, user_id, title, summary, created_at, updated_at
             FROM sessions WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("get session: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut session = Self::row_to_session(&row)?;
        session.messages = self.load_messages(id).await?;
        Ok(Some(session))
    }

    async fn create_session(
        &self,
        id: Option<SessionId>,
        user_id: &str,
    ) -> Result<ChatSession, StoreError> {
        let session = ChatSession::new(id.unwrap_or_default(), user_id);

        sqlx::query(
            "INSERT INTO sessions (id, user_id, title, summary, created_at, updated_at)
             VALUES (?, ?, NULL, NULL, ?, ?)",
        )
        .bind(&session.id.0)
        .bind(&session.user_id)
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("create session: {e}")))?;

        Ok(session)
    }

    async fn add_message(
        &self,
        session_id: &SessionId,
        message: ChatMessage,
    ) -> Result<ChatMessage, StoreError> {
        let meta_json = serde_json::to_string(&message.meta)
            .map_err(|e| StoreError::Storage(format!("serialize meta: {e}")))?;

        let result = sqlx::query(
            "INSERT INTO messages (id, session_id, role, content, timestamp, meta)
             SELECT ?, ?, ?, ?, ?, ? WHERE EXISTS (SELECT 1 FROM sessions WHERE id = ?)",
        )
        .bind(&message.id)
        .bind(&session_id.0)
        .bind(Self::role_to_str(message.role))
        .bind(&message.content)
        .bind(message.timestamp.to_rfc3339())
        .bind(&meta_json)
        .bind(&session_id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("add message: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(session_id.to_string()));
        }

        sqlx::query("UPDATE sessions SET updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(&session_id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("touch session: {e}")))?;

        Ok(message)
    }

    async fn update_session(
        &self,
        session_id: &SessionId,
        patch: SessionPatch,
    ) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Ok(());
        }

        let result = sqlx::query(
            "UPDATE sessions SET
                title = COALESCE(?, title),
                summary = COALESCE(?, summary),
                updated_at = ?
             WHERE id = ?",
        )
        .bind(&patch.title)
        .bind(&patch.summary)
        .bind(Utc::now().to_rfc3339())
        .bind(&session_id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("update session: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(session_id.to_string()));
        }
        Ok(())
    }

    async fn user_sessions(&self, user_id: &str) -> Result<Vec<ChatSession>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, user_id, title, summary, created_at, updated_at
             FROM sessions WHERE user_id = ? ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("user sessions: {e}")))?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut session = Self::row_to_session(row)?;
            session.messages = self.load_messages(&session.id).await?;
            sessions.push(session);
        }
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kotoba_core::knowledge::{ReferencedUnit, UnitKind};
    use kotoba_core::session::Action;

    async fn test_store() -> SqliteStore {
        SqliteStore::new(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn create_and_fetch_session() {
        let store = test_store().await;
        let created = store.create_session(None, "user_1").await.unwrap();

        let fetched = store.get_session(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched.user_id, "user_1");
        assert!(fetched.title.is_none());
        assert!(fetched.messages.is_empty());
    }

    #[tokio::test]
    async fn missing_session_is_none() {
        let store = test_store().await;
        assert!(
            store
                .get_session(&SessionId::new())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn messages_roundtrip_with_meta() {
        let store = test_store().await;
        let session = store.create_session(None, "user_1").await.unwrap();

        store
            .add_message(&session.id, ChatMessage::user("食べるって何?"))
            .await
            .unwrap();

        let meta = MessageMeta {
            actions: vec![Action::GrammarReference {
                pattern: "～てみる".into(),
            }],
            referenced_units: vec![ReferencedUnit {
                id: "k_1".into(),
                slug: "taberu-kanji".into(),
                display: "食".into(),
                kind: UnitKind::Kanji,
            }],
        };
        store
            .add_message(&session.id, ChatMessage::assistant("It means to eat.", meta))
            .await
            .unwrap();

        let fetched = store.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(fetched.messages.len(), 2);
        assert_eq!(fetched.messages[0].role, Role::User);
        assert_eq!(fetched.messages[1].role, Role::Assistant);
        assert_eq!(fetched.messages[1].meta.referenced_units.len(), 1);
        assert_eq!(fetched.messages[1].meta.referenced_units[0].display, "食");
    }

    #[tokio::test]
    async fn add_message_to_missing_session_fails() {
        let store = test_store().await;
        let result = store
            .add_message(&SessionId::new(), ChatMessage::user("orphan"))
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn patch_coalesces_unset_fields() {
        let store = test_store().await;
        let session = store.create_session(None, "user_1").await.unwrap();

        store
            .update_session(
                &session.id,
                SessionPatch {
                    title: Some("Kanji goals".into()),
                    summary: None,
                },
            )
            .await
            .unwrap();
        store
            .update_session(
                &session.id,
                SessionPatch {
                    title: None,
                    summary: Some("Goal: JLPT N4".into()),
                },
            )
            .await
            .unwrap();

        let fetched = store.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(fetched.title.as_deref(), Some("Kanji goals"));
        assert_eq!(fetched.summary.as_deref(), Some("Goal: JLPT N4"));
    }

    #[tokio::test]
    async fn user_sessions_ordered_and_scoped() {
        let store = test_store().await;
        let a = store.create_session(None, "user_1").await.unwrap();
        store.create_session(None, "user_2").await.unwrap();

        store
            .add_message(&a.id, ChatMessage::user("hello"))
            .await
            .unwrap();

        let sessions = store.user_sessions("user_1").await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, a.id);
        assert_eq!(sessions[0].messages.len(), 1);
    }

    #[tokio::test]
    async fn file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.db");
        let path_str = path.to_str().unwrap();

        let id = {
            let store = SqliteStore::new(path_str).await.unwrap();
            let session = store.create_session(None, "user_1").await.unwrap();
            store
                .add_message(&session.id, ChatMessage::user("persist me"))
                .await
                .unwrap();
            session.id
        };

        let reopened = SqliteStore::new(path_str).await.unwrap();
        let fetched = reopened.get_session(&id).await.unwrap().unwrap();
        assert_eq!(fetched.messages.len(), 1);
        assert_eq!(fetched.messages[0].content, "persist me");
    }
}
