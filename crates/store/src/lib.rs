//! Persistence implementations for Kotoba.
//!
//! Session stores: SQLite (durable, default) and in-memory (tests and
//! ephemeral runs). The knowledge repository here is a seedable in-memory
//! stand-in for the product's curriculum database.

pub mod in_memory;
pub mod knowledge;
pub mod learning;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use knowledge::InMemoryKnowledge;
pub use learning::InMemoryLearning;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
