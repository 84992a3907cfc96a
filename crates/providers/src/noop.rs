//! No-op memory service — used when the memory service is disabled.

use async_trait::async_trait;
use kotoba_core::error::MemoryServiceError;
use kotoba_core::memory::{MemoryContext, MemoryService};
use kotoba_core::session::SessionId;

/// A memory service that always returns an empty block.
pub struct NoopMemoryService;

#[async_trait]
impl MemoryService for NoopMemoryService {
    fn name(&self) -> &str {
        "noop"
    }

    async fn get_context(
        &self,
        _user_id: &str,
        _query: &str,
        _session_id: &SessionId,
        _max_results: usize,
    ) -> Result<MemoryContext, MemoryServiceError> {
        Ok(MemoryContext::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_returns_empty_block() {
        let svc = NoopMemoryService;
        let ctx = svc
            .get_context("user_1", "anything", &SessionId::new(), 5)
            .await
            .unwrap();
        assert!(ctx.prompt_block.is_empty());
    }
}
