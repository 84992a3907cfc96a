//! MemoryService trait — the long-term-memory collaborator boundary.
//!
//! The memory service holds cross-session facts about a learner (goals,
//! preferences, past struggles) and renders them as a ready-to-inject
//! prompt block. It is external to this runtime; callers must treat any
//! failure as "no memory available" — a down memory service never fails a
//! send.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MemoryServiceError;
use crate::session::SessionId;

/// The memory block returned for one query, ready for prompt injection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryContext {
    /// Rendered prompt text. Empty means "nothing relevant".
    pub prompt_block: String,
}

/// The long-term-memory boundary.
#[async_trait]
pub trait MemoryService: Send + Sync {
    /// The service name (e.g., "http", "noop").
    fn name(&self) -> &str;

    /// Fetch a memory context block scoped by user, current text, session,
    /// and a result-count limit.
    async fn get_context(
        &self,
        user_id: &str,
        query: &str,
        session_id: &SessionId,
        max_results: usize,
    ) -> Result<MemoryContext, MemoryServiceError>;
}
