//! Prompt assembly — deterministic composition of the system prompt.
//!
//! Composition order is fixed:
//! 1. Base instruction block (role, grounding policy)
//! 2. Context-management policy (the summary is authoritative working
//!    state, not full history; the update-trigger protocol)
//! 3. Current summary content (or a placeholder when none exists yet)
//! 4. Injected blocks in slot order — the memory block, when non-empty,
//!    is preceded by a personalization instruction
//! 5. Trailing instruction restating the sentinel format
//!
//! Assembly is pure string concatenation over already-resolved inputs;
//! all fallibility lives in the injectors that produced those inputs.
//! Identical inputs always produce identical output.

use crate::inject::InjectionSlot;
use crate::intent::Intent;
use crate::postprocess::{SUMMARY_SENTINEL, TITLE_SENTINEL};

const BASE_INSTRUCTIONS: &str = "\
You are the conversational tutor inside a Japanese-learning app. You help \
the learner with vocabulary, kanji, grammar, and study planning. Always \
ground claims about specific Japanese terms against the curriculum lookup \
before answering; if a term is not in the curriculum, say so rather than \
guessing.";

const CONTEXT_POLICY: &str = "\
## Working State
The \"Current Working State\" section below is the authoritative digest of \
this conversation's decisions and goals — it replaces the full history, \
which is not sent. Whenever the conversation establishes or changes a goal, \
preference, or decision, you must emit an updated working state using the \
update protocol described at the end of this prompt.";

const NO_SUMMARY_PLACEHOLDER: &str =
    "(none yet — this is a new conversation; establish goals as you go)";

const MEMORY_INSTRUCTION: &str = "\
## Learner Memory
The following long-term facts were retrieved for this learner. You MUST \
use this data when answering personal questions about the learner's goals, \
history, or preferences:";

/// Everything the assembler needs for one prompt.
pub struct PromptInputs<'a> {
    pub intent: Intent,
    pub summary: Option<&'a str>,
    /// Injected blocks with their slots. Order-insensitive; the assembler
    /// sorts by slot.
    pub sections: &'a [(InjectionSlot, String)],
    pub user_text: &'a str,
}

/// The prompt assembler. Stateless — create one and reuse it.
#[derive(Default)]
pub struct PromptAssembler;

impl PromptAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Compose the final system prompt.
    pub fn assemble(&self, inputs: &PromptInputs<'_>) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(inputs.sections.len() + 4);

        parts.push(format!(
            "{BASE_INSTRUCTIONS}\n\nDetected intent for this message: {:?}.",
            inputs.intent
        ));
        parts.push(CONTEXT_POLICY.to_string());
        parts.push(format!(
            "## Current Working State\n{}",
            inputs.summary.unwrap_or(NO_SUMMARY_PLACEHOLDER)
        ));

        let mut sections: Vec<&(InjectionSlot, String)> = inputs
            .sections
            .iter()
            .filter(|(_, block)| !block.is_empty())
            .collect();
        sections.sort_by_key(|(slot, _)| *slot);

        for (slot, block) in sections {
            match slot {
                InjectionSlot::Memory => {
                    parts.push(format!("{MEMORY_INSTRUCTION}\n{block}"));
                }
                _ => parts.push(block.clone()),
            }
        }

        parts.push(format!(
            "## Update Protocol\nWhen the working state should change, append \
exactly this to the very end of your reply: {SUMMARY_SENTINEL}<the full \
updated working state>{TITLE_SENTINEL}<a short conversation title>. Either \
marker may appear alone. Emit the markers only when something changed; \
never mention them to the learner."
        ));

        parts.join("\n\n")
    }
}
