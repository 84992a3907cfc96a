//! HTTP client for the long-term-memory service.
//!
//! The memory service is a separate deployment that stores cross-session
//! facts about a learner and renders them into a ready-to-inject prompt
//! block. Callers must treat every failure here as "no memory available".

use async_trait::async_trait;
use kotoba_core::error::MemoryServiceError;
use kotoba_core::memory::{MemoryContext, MemoryService};
use kotoba_core::session::SessionId;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A memory-service client over HTTP.
pub struct HttpMemoryService {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpMemoryService {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, MemoryServiceError> {
        // Shorter deadline than the model call: memory is best-effort and
        // should never hold a send hostage.
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| MemoryServiceError::Unavailable(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }
}

#[derive(Debug, Serialize)]
struct ContextRequest<'a> {
    user_id: &'a str,
    query: &'a str,
    session_id: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct ContextResponse {
    #[serde(default)]
    prompt_block: String,
}

#[async_trait]
impl MemoryService for HttpMemoryService {
    fn name(&self) -> &str {
        "http"
    }

    async fn get_context(
        &self,
        user_id: &str,
        query: &str,
        session_id: &SessionId,
        max_results: usize,
    ) -> Result<MemoryContext, MemoryServiceError> {
        let url = format!("{}/context", self.base_url);
        let body = ContextRequest {
            user_id,
            query,
            session_id: &session_id.0,
            max_results,
        };

        debug!(user_id, max_results, "Fetching memory context");

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| MemoryServiceError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MemoryServiceError::QueryFailed(format!(
                "memory service returned status {}",
                response.status().as_u16()
            )));
        }

        let parsed: ContextResponse = response
            .json()
            .await
            .map_err(|e| MemoryServiceError::QueryFailed(format!("bad response: {e}")))?;

        Ok(MemoryContext {
            prompt_block: parsed.prompt_block,
        })
    }
}
