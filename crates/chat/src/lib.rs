//! Session orchestration for Kotoba.
//!
//! This crate turns a stored conversation plus auxiliary signals (intent,
//! long-term memory, persona) into a single prompt for a language model,
//! and extracts structured updates — session summary, title, referenced
//! curriculum units — out of the model's reply.
//!
//! Pipeline, leaf to root:
//! 1. [`intent::classify`] — keyword/script-range intent routing
//! 2. [`inject`] — independent strategies contributing prompt blocks
//! 3. [`assemble::PromptAssembler`] — deterministic prompt composition
//! 4. [`postprocess::ReplyPostProcessor`] — sentinel extraction, action
//!    and reference detection
//! 5. [`orchestrator::ChatService`] — the `send_message` entry point

pub mod analysis;
pub mod assemble;
pub mod inject;
pub mod intent;
pub mod orchestrator;
pub mod postprocess;

pub use analysis::ModelBackedAnalyzer;
pub use assemble::{PromptAssembler, PromptInputs};
pub use inject::{
    ContextInjector, InjectionCue, InjectionSlot, MemoryInjector, PersonaInjector,
    ProjectAwarenessInjector, SrsStatusInjector,
};
pub use intent::{classify, Intent};
pub use orchestrator::{ChatService, SendOutcome};
pub use postprocess::{ProcessedReply, ReplyPostProcessor};
