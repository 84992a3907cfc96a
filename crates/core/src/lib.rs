//! # Kotoba Core
//!
//! Domain types, traits, and error definitions for the Kotoba chat-tutor
//! runtime. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator is defined as a trait here. Implementations live in
//! their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod analysis;
pub mod error;
pub mod knowledge;
pub mod learning;
pub mod memory;
pub mod model;
pub mod session;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use analysis::SentenceAnalyzer;
pub use error::{Error, Result};
pub use knowledge::{KnowledgeRepository, ReferencedUnit, UnitKind};
pub use learning::{LearningState, SrsSnapshot};
pub use memory::{MemoryContext, MemoryService};
pub use model::{ChatReply, ChatRequest, ModelClient, PromptMessage, Usage};
pub use session::{Action, ChatMessage, ChatSession, MessageMeta, Role, SessionId};
pub use store::{SessionPatch, SessionStore};
