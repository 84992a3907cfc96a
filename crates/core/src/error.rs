//! Error types for the Kotoba domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator boundary has its own error variant.
//!
//! The taxonomy mirrors how failures are handled by the orchestrator:
//! - **Validation** — rejected before any collaborator is touched
//! - **Fatal** — session resolution and the primary model call propagate
//! - **Degraded** — everything else is caught at the call site, logged,
//!   and replaced with an empty/default value

use thiserror::Error;

/// The top-level error type for all Kotoba operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Session store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Model client errors ---
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    // --- Memory service errors ---
    #[error("Memory service error: {0}")]
    MemoryService(#[from] MemoryServiceError),

    // --- Knowledge repository errors ---
    #[error("Knowledge error: {0}")]
    Knowledge(#[from] KnowledgeError),

    // --- Input validation ---
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Collaborator boundary errors ---

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum MemoryServiceError {
    #[error("Memory service unavailable: {0}")]
    Unavailable(String),

    #[error("Memory query failed: {0}")]
    QueryFailed(String),
}

#[derive(Debug, Clone, Error)]
pub enum KnowledgeError {
    #[error("Lookup failed: {0}")]
    LookupFailed(String),

    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_error_displays_correctly() {
        let err = Error::Model(ModelError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn store_error_displays_correctly() {
        let err = Error::Store(StoreError::NotFound("sess_123".into()));
        assert!(err.to_string().contains("sess_123"));
    }

    #[test]
    fn invalid_input_displays_reason() {
        let err = Error::InvalidInput("text must not be empty".into());
        assert!(err.to_string().contains("must not be empty"));
    }
}
