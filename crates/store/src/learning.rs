//! In-memory learning state — a seedable stand-in for the product's SRS
//! scheduler data.

use async_trait::async_trait;
use kotoba_core::error::KnowledgeError;
use kotoba_core::learning::{LearningState, SrsSnapshot};

/// Serves a fixed set of review snapshots, all under one user.
pub struct InMemoryLearning {
    snapshots: Vec<SrsSnapshot>,
}

impl InMemoryLearning {
    pub fn new(snapshots: Vec<SrsSnapshot>) -> Self {
        Self { snapshots }
    }

    /// An empty learning state (no review history yet).
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl LearningState for InMemoryLearning {
    async fn snapshots(&self, _user_id: &str) -> Result<Vec<SrsSnapshot>, KnowledgeError> {
        Ok(self.snapshots.clone())
    }
}
