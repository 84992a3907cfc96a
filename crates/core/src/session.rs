//! Session and message domain types.
//!
//! These are the core value objects that flow through the entire system:
//! the user sends a message → the orchestrator processes it → the model
//! replies → the post-processor extracts structure → the store persists it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::knowledge::ReferencedUnit;

/// Unique identifier for a chat session (one conversation thread).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    /// Whether `s` is a well-formed session identifier (UUID format).
    ///
    /// Callers validate before issuing mutation calls against the store;
    /// malformed ids are treated as "no such session", never as a crash.
    pub fn is_wellformed(s: &str) -> bool {
        Uuid::parse_str(s).is_ok()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI tutor
    Assistant,
    /// System instructions (prompt assembly only — never stored)
    System,
}

/// A suggested UI affordance extracted from a reply.
///
/// A closed tagged union rather than an open metadata bag: the set of
/// actions the UI can render is fixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// The reply mentioned a grammar pattern (e.g. "～てみる").
    GrammarReference { pattern: String },
    /// Offer a drill for study-oriented intents.
    DrillSuggestion,
}

/// Structured metadata attached to an assistant message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageMeta {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub referenced_units: Vec<ReferencedUnit>,
}

impl MessageMeta {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.referenced_units.is_empty()
    }
}

/// A single turn in a session.
///
/// Messages are immutable once stored; the only mutation path is appending.
/// For assistant messages, `content` is the *cleaned* reply with sentinel
/// blocks stripped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message ID
    pub id: String,

    /// Who sent this message (User or Assistant — System is never stored)
    pub role: Role,

    /// The text content
    pub content: String,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Structured metadata (actions, referenced units)
    #[serde(default, skip_serializing_if = "MessageMeta::is_empty")]
    pub meta: MessageMeta,
}

impl ChatMessage {
    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            meta: MessageMeta::default(),
        }
    }

    /// Create a new assistant message with attached metadata.
    pub fn assistant(content: impl Into<String>, meta: MessageMeta) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            meta,
        }
    }
}

/// One persisted conversation thread between a user and the tutor.
///
/// A session exclusively owns its message sequence (insertion order is
/// chronological order). `summary` is the model-maintained "working state"
/// digest used instead of full history to bound prompt size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    /// Unique session ID
    pub id: SessionId,

    /// Owning user
    pub user_id: String,

    /// Short human-readable label (set by the post-processor or left unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Working-state digest maintained across turns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Ordered messages
    pub messages: Vec<ChatMessage>,

    /// When this session was created
    pub created_at: DateTime<Utc>,

    /// When the last message was added
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    /// Create a new empty session for a user.
    pub fn new(id: SessionId, user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id: user_id.into(),
            title: None,
            summary: None,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message to the session.
    pub fn push(&mut self, message: ChatMessage) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// Whether the session has seen no exchanges yet.
    pub fn is_fresh(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = ChatMessage::user("こんにちは!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "こんにちは!");
        assert!(msg.meta.is_empty());
    }

    #[test]
    fn session_tracks_updates() {
        let mut session = ChatSession::new(SessionId::new(), "user_1");
        let created = session.created_at;
        assert!(session.is_fresh());

        session.push(ChatMessage::user("First message"));
        assert_eq!(session.messages.len(), 1);
        assert!(!session.is_fresh());
        assert!(session.updated_at >= created);
    }

    #[test]
    fn session_id_format_validation() {
        assert!(SessionId::is_wellformed(&SessionId::new().0));
        assert!(!SessionId::is_wellformed("not-a-uuid"));
        assert!(!SessionId::is_wellformed(""));
    }

    #[test]
    fn action_serialization_is_tagged() {
        let action = Action::GrammarReference {
            pattern: "～てみる".into(),
        };
        let json = serde_json::to_string(&action).unwrap();
        assert!(json.contains("grammar_reference"));
        assert!(json.contains("～てみる"));

        let back: Action = serde_json::from_str(&json).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn message_serialization_roundtrip() {
        let msg = ChatMessage::assistant(
            "Try ～てみる here.",
            MessageMeta {
                actions: vec![Action::DrillSuggestion],
                referenced_units: vec![],
            },
        );
        let json = serde_json::to_string(&msg).unwrap();
        let back: ChatMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.content, msg.content);
        assert_eq!(back.meta.actions, vec![Action::DrillSuggestion]);
    }
}
