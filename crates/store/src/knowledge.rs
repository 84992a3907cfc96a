//! Seedable in-memory knowledge repository.
//!
//! Stands in for the product's curriculum database. Matching is exact on
//! the display form or slug first, then falls back to a prefix match —
//! enough for reference detection in replies, which only ever asks for the
//! first hit per token.

use async_trait::async_trait;
use kotoba_core::error::KnowledgeError;
use kotoba_core::knowledge::{KnowledgeRepository, ReferencedUnit, UnitKind};

/// An in-memory curriculum index seeded at construction.
pub struct InMemoryKnowledge {
    units: Vec<ReferencedUnit>,
}

impl InMemoryKnowledge {
    pub fn new(units: Vec<ReferencedUnit>) -> Self {
        Self { units }
    }

    /// An empty repository (no reference detection will hit).
    pub fn empty() -> Self {
        Self { units: Vec::new() }
    }
}

#[async_trait]
impl KnowledgeRepository for InMemoryKnowledge {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn search(
        &self,
        token: &str,
        kind: Option<UnitKind>,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<ReferencedUnit>, KnowledgeError> {
        let token_lower = token.to_lowercase();

        let matches = |u: &&ReferencedUnit| {
            if let Some(k) = kind {
                if u.kind != k {
                    return false;
                }
            }
            u.display == token
                || u.slug == token_lower
                || u.display.starts_with(token)
                || u.slug.starts_with(&token_lower)
        };

        let skip = (page.saturating_sub(1) as usize) * page_size as usize;
        Ok(self
            .units
            .iter()
            .filter(matches)
            .skip(skip)
            .take(page_size as usize)
            .cloned()
            .collect())
    }
}
