//! LearningState trait — SRS progress snapshots.
//!
//! Consumed by the SRS status injector to describe where the learner is
//! struggling. Scheduling itself lives elsewhere; this boundary only reads
//! per-unit accuracy snapshots.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::KnowledgeError;
use crate::knowledge::UnitKind;

/// A per-unit review snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SrsSnapshot {
    /// Curriculum unit id
    pub unit_id: String,

    /// Display form for prompt rendering
    pub display: String,

    /// Unit kind
    pub kind: UnitKind,

    /// Fraction of recent reviews answered correctly (0.0–1.0)
    pub accuracy: f32,

    /// Consecutive correct answers
    pub streak: u32,

    /// Last review time
    pub last_reviewed: DateTime<Utc>,
}

/// Read-only access to a learner's review state.
#[async_trait]
pub trait LearningState: Send + Sync {
    /// All current snapshots for a user.
    async fn snapshots(&self, user_id: &str) -> Result<Vec<SrsSnapshot>, KnowledgeError>;
}
