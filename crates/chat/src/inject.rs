//! Context injectors — independent strategies that each contribute one
//! optional block of text to the assembled system prompt.
//!
//! Each injector is read-only and side-effect-free; the orchestrator runs
//! the applicable ones and catches any failure locally, treating it as "no
//! contribution". A down collaborator never fails a send.

use async_trait::async_trait;
use kotoba_core::learning::{LearningState, SrsSnapshot};
use kotoba_core::memory::MemoryService;
use kotoba_core::session::SessionId;
use kotoba_core::Result;
use std::sync::Arc;

use crate::intent::Intent;

/// Everything an injector may consider when deciding whether and what to
/// contribute.
pub struct InjectionCue<'a> {
    pub user_id: &'a str,
    pub session_id: &'a SessionId,
    pub user_text: &'a str,
    pub intent: Intent,
}

/// Deterministic placement of a contributed block within the prompt.
/// Lower slots render earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InjectionSlot {
    /// Long-term-memory block (rendered with a personalization instruction)
    Memory,
    /// Learning-status block (trouble items, recommendations)
    Status,
    /// Tone/style persona block
    Persona,
    /// Product-context block
    ProjectBrief,
}

/// A strategy contributing one optional prompt block.
#[async_trait]
pub trait ContextInjector: Send + Sync {
    /// Injector name, for logging.
    fn name(&self) -> &str;

    /// Where the contributed block is placed in the prompt.
    fn slot(&self) -> InjectionSlot;

    /// Whether this injector should run for the given message at all.
    fn applies(&self, cue: &InjectionCue<'_>) -> bool {
        let _ = cue;
        true
    }

    /// Produce the block. An empty string means "nothing to add".
    async fn contribute(&self, cue: &InjectionCue<'_>) -> Result<String>;
}

// ── Persona ────────────────────────────────────────────────────────────────

const DEFAULT_PERSONA: &str = "\
## Persona
You are a warm, encouraging Japanese tutor. Keep replies concise and \
practical. Use plain English for explanations, include Japanese script \
with readings when introducing new terms, and celebrate small wins without \
being saccharine.";

/// Static tone/style block. Always applies.
pub struct PersonaInjector {
    block: String,
}

impl PersonaInjector {
    pub fn new(block: impl Into<String>) -> Self {
        Self {
            block: block.into(),
        }
    }
}

impl Default for PersonaInjector {
    fn default() -> Self {
        Self::new(DEFAULT_PERSONA)
    }
}

#[async_trait]
impl ContextInjector for PersonaInjector {
    fn name(&self) -> &str {
        "persona"
    }

    fn slot(&self) -> InjectionSlot {
        InjectionSlot::Persona
    }

    async fn contribute(&self, _cue: &InjectionCue<'_>) -> Result<String> {
        Ok(self.block.clone())
    }
}

// ── Project awareness ──────────────────────────────────────────────────────

const DEFAULT_PROJECT_BRIEF: &str = "\
## Product Context
The learner is using a Japanese-learning app with spaced-repetition \
flashcards, reading practice, and this chat tutor. When asked about \"the \
project\" or \"the stack\", answer about this app and its study features.";

/// Static product-context block. Applies only when the user text mentions
/// the project or the stack.
pub struct ProjectAwarenessInjector {
    block: String,
}

impl ProjectAwarenessInjector {
    pub fn new(block: impl Into<String>) -> Self {
        Self {
            block: block.into(),
        }
    }
}

impl Default for ProjectAwarenessInjector {
    fn default() -> Self {
        Self::new(DEFAULT_PROJECT_BRIEF)
    }
}

#[async_trait]
impl ContextInjector for ProjectAwarenessInjector {
    fn name(&self) -> &str {
        "project_awareness"
    }

    fn slot(&self) -> InjectionSlot {
        InjectionSlot::ProjectBrief
    }

    fn applies(&self, cue: &InjectionCue<'_>) -> bool {
        let lower = cue.user_text.to_lowercase();
        lower.contains("project") || lower.contains("stack")
    }

    async fn contribute(&self, _cue: &InjectionCue<'_>) -> Result<String> {
        Ok(self.block.clone())
    }
}

// ── Long-term memory ───────────────────────────────────────────────────────

/// Fetches a long-term-memory block from the memory service, scoped by
/// user, current text, session, and a result-count limit.
pub struct MemoryInjector {
    service: Arc<dyn MemoryService>,
    limit: usize,
}

impl MemoryInjector {
    pub fn new(service: Arc<dyn MemoryService>, limit: usize) -> Self {
        Self { service, limit }
    }
}

#[async_trait]
impl ContextInjector for MemoryInjector {
    fn name(&self) -> &str {
        "memory"
    }

    fn slot(&self) -> InjectionSlot {
        InjectionSlot::Memory
    }

    async fn contribute(&self, cue: &InjectionCue<'_>) -> Result<String> {
        let context = self
            .service
            .get_context(cue.user_id, cue.user_text, cue.session_id, self.limit)
            .await?;
        Ok(context.prompt_block)
    }
}

// ── SRS status ─────────────────────────────────────────────────────────────

/// The rule deciding whether a snapshot counts as a "trouble item".
pub type TroubleRule = Box<dyn Fn(&SrsSnapshot) -> bool + Send + Sync>;

/// Summarizes the learner's review state: trouble items selected by a
/// caller-supplied rule, plus a fixed-size topic recommendation list.
/// Applies only for study-oriented intents.
pub struct SrsStatusInjector {
    learning: Arc<dyn LearningState>,
    trouble_rule: TroubleRule,
    recommend_limit: usize,
}

impl SrsStatusInjector {
    pub fn new(
        learning: Arc<dyn LearningState>,
        trouble_rule: TroubleRule,
        recommend_limit: usize,
    ) -> Self {
        Self {
            learning,
            trouble_rule,
            recommend_limit,
        }
    }

    /// The default rule: below 60% accuracy or a broken streak.
    pub fn default_rule() -> TroubleRule {
        Box::new(|s: &SrsSnapshot| s.accuracy < 0.6 || s.streak == 0)
    }
}

#[async_trait]
impl ContextInjector for SrsStatusInjector {
    fn name(&self) -> &str {
        "srs_status"
    }

    fn slot(&self) -> InjectionSlot {
        InjectionSlot::Status
    }

    fn applies(&self, cue: &InjectionCue<'_>) -> bool {
        matches!(cue.intent, Intent::StudyRequest | Intent::SrsSession)
    }

    async fn contribute(&self, cue: &InjectionCue<'_>) -> Result<String> {
        let snapshots = self.learning.snapshots(cue.user_id).await?;

        let mut trouble: Vec<&SrsSnapshot> = snapshots
            .iter()
            .filter(|s| (self.trouble_rule)(s))
            .collect();
        if trouble.is_empty() {
            return Ok(String::new());
        }

        // Weakest items first; the recommendation list is a fixed-size cut
        trouble.sort_by(|a, b| {
            a.accuracy
                .partial_cmp(&b.accuracy)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        trouble.truncate(self.recommend_limit);

        let mut block = String::from("## Review Status\nThe learner is struggling with:\n");
        for item in &trouble {
            block.push_str(&format!(
                "- {} ({:?}, {:.0}% recent accuracy)\n",
                item.display,
                item.kind,
                item.accuracy * 100.0
            ));
        }
        block.push_str("Recommend revisiting these before introducing new material.");
        Ok(block)
    }
}
