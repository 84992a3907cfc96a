//! KnowledgeRepository trait — curriculum lookup boundary.
//!
//! The knowledge repository is the product's curriculum database (kanji,
//! vocabulary, grammar points). The chat runtime does not own these
//! records; it holds weak references — a lookup key plus cached display
//! fields — surfaced to the UI as clickable references.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::KnowledgeError;

/// The kind of curriculum unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Kanji,
    Vocabulary,
    Grammar,
}

/// A lightweight pointer to a curriculum entry detected in a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencedUnit {
    /// Stable identifier in the curriculum database
    pub id: String,

    /// URL-safe slug
    pub slug: String,

    /// Display character or headword (e.g., "食", "食べる")
    pub display: String,

    /// Unit kind
    pub kind: UnitKind,
}

/// The curriculum lookup boundary.
#[async_trait]
pub trait KnowledgeRepository: Send + Sync {
    /// The repository name (e.g., "in_memory", "http").
    fn name(&self) -> &str;

    /// Search for units matching `token`, optionally filtered by kind.
    /// Results are paged; the post-processor only ever asks for the first
    /// page with a size of one.
    async fn search(
        &self,
        token: &str,
        kind: Option<UnitKind>,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<ReferencedUnit>, KnowledgeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn referenced_unit_serialization() {
        let unit = ReferencedUnit {
            id: "kanji_taberu".into(),
            slug: "taberu".into(),
            display: "食".into(),
            kind: UnitKind::Kanji,
        };
        let json = serde_json::to_string(&unit).unwrap();
        assert!(json.contains("\"kanji\""));
        assert!(json.contains("食"));
    }
}
