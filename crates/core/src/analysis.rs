//! SentenceAnalyzer trait — the ANALYZE delegation target.
//!
//! When the classifier decides the user pasted a Japanese sentence to be
//! broken down, the orchestrator hands the text to this collaborator and
//! returns its result directly, bypassing the normal pipeline.

use async_trait::async_trait;

use crate::error::ModelError;

/// Sentence breakdown boundary.
#[async_trait]
pub trait SentenceAnalyzer: Send + Sync {
    /// Analyze a Japanese sentence and return a rendered breakdown.
    async fn analyze(&self, user_id: &str, text: &str) -> Result<String, ModelError>;
}
