//! ModelClient trait — the abstraction over LLM backends.
//!
//! A ModelClient knows how to send an assembled prompt to a language model
//! and get a complete reply back. The canonical path is a single
//! synchronous-style call per send — no streaming, no tool-call loop.
//!
//! Implementations: OpenAI-compatible endpoints, mocks for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::session::Role;

/// One message in an outbound prompt.
///
/// Distinct from the stored [`crate::session::ChatMessage`]: prompt messages
/// carry no identity or metadata, and may use the System role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The model to use (e.g., "gpt-4o", "anthropic/claude-sonnet-4")
    pub model: String,

    /// The assembled prompt messages
    pub messages: Vec<PromptMessage>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.7
}

/// A complete reply from a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    /// The raw generated text (sentinel blocks included, if any)
    pub content: String,

    /// Which model actually responded (may differ from requested)
    pub model: String,

    /// Token usage statistics
    pub usage: Option<Usage>,
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The core ModelClient trait.
///
/// The orchestrator calls `complete()` without knowing which backend is
/// configured — pure polymorphism.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// A human-readable name for this client (e.g., "openai", "openrouter").
    fn name(&self) -> &str;

    /// Send a request and get a complete reply.
    async fn complete(&self, request: ChatRequest) -> Result<ChatReply, ModelError>;

    /// List available models for this backend.
    async fn list_models(&self) -> Result<Vec<String>, ModelError> {
        Ok(Vec::new())
    }

    /// Health check — can we reach the backend?
    async fn health_check(&self) -> Result<bool, ModelError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_message_constructors() {
        assert_eq!(PromptMessage::system("rules").role, Role::System);
        assert_eq!(PromptMessage::user("hi").role, Role::User);
        assert_eq!(PromptMessage::assistant("hello").role, Role::Assistant);
    }

    #[test]
    fn chat_request_serializes_roles_lowercase() {
        let req = ChatRequest {
            model: "gpt-4o".into(),
            messages: vec![PromptMessage::system("You are a tutor")],
            temperature: default_temperature(),
            max_tokens: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"system\""));
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
    }
}
