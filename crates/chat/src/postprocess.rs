//! Reply post-processing.
//!
//! The model's raw reply may carry trailing sentinel blocks (an updated
//! working state and/or a title). The post-processor strips them out,
//! detects grammar-pattern mentions and curriculum references in the
//! cleaned text, and hands the orchestrator everything it needs to persist
//! the turn. Processing never fails: a reply the user can read always
//! comes out, even when every enrichment step degrades.

use std::collections::HashSet;
use std::sync::Arc;

use kotoba_core::knowledge::{KnowledgeRepository, ReferencedUnit};
use kotoba_core::session::{Action, MessageMeta};
use kotoba_core::store::SessionPatch;
use regex_lite::Regex;
use tracing::warn;

use crate::intent::Intent;

/// Marker opening an updated working-state block in a raw reply.
pub const SUMMARY_SENTINEL: &str = "[[SUMMARY_UPDATE]]";
/// Marker opening an updated title block in a raw reply.
pub const TITLE_SENTINEL: &str = "[[TITLE_UPDATE]]";

const LEGACY_SUMMARY_OPEN: &str = "<session_summary>";
const LEGACY_SUMMARY_CLOSE: &str = "</session_summary>";

/// Hard cap on curriculum references attached to one reply.
const MAX_REFERENCES: usize = 3;

/// The result of post-processing one raw model reply.
#[derive(Debug, Default)]
pub struct ProcessedReply {
    /// User-facing text with all sentinel blocks removed.
    pub clean: String,
    /// Session-level fields to patch (empty when no sentinel was present).
    pub patch: SessionPatch,
    /// Actions and curriculum references detected in the cleaned text.
    pub meta: MessageMeta,
    /// Whether the reply carried any sentinel block.
    pub has_update: bool,
}

/// Split a raw reply into clean text plus optional summary/title updates.
///
/// The bracket format takes priority: when either bracket marker is
/// present, the legacy `<session_summary>` tags are ignored entirely (a
/// model emitting both is following the current protocol; stale tags in
/// its output are treated as content). Markers may appear in either order;
/// each block runs to the next marker or end of text. Without any marker
/// the input is returned unchanged.
pub fn extract_sentinels(raw: &str) -> (String, SessionPatch) {
    let summary_at = raw.find(SUMMARY_SENTINEL);
    let title_at = raw.find(TITLE_SENTINEL);

    if summary_at.is_some() || title_at.is_some() {
        let mut patch = SessionPatch::default();

        if let Some(at) = summary_at {
            let start = at + SUMMARY_SENTINEL.len();
            let end = match title_at {
                Some(t) if t > at => t,
                _ => raw.len(),
            };
            let text = raw[start..end].trim();
            if !text.is_empty() {
                patch.summary = Some(text.to_string());
            }
        }

        if let Some(at) = title_at {
            let start = at + TITLE_SENTINEL.len();
            let end = match summary_at {
                Some(s) if s > at => s,
                _ => raw.len(),
            };
            let text = raw[start..end].trim();
            if !text.is_empty() {
                patch.title = Some(text.to_string());
            }
        }

        let first = match (summary_at, title_at) {
            (Some(s), Some(t)) => s.min(t),
            (Some(s), None) => s,
            (None, Some(t)) => t,
            (None, None) => unreachable!(),
        };
        return (raw[..first].trim().to_string(), patch);
    }

    // Legacy tag pair, only consulted when no bracket marker exists.
    if let Some(open) = raw.find(LEGACY_SUMMARY_OPEN) {
        if let Some(close_rel) = raw[open..].find(LEGACY_SUMMARY_CLOSE) {
            let close = open + close_rel;
            let summary = raw[open + LEGACY_SUMMARY_OPEN.len()..close].trim();
            let after = &raw[close + LEGACY_SUMMARY_CLOSE.len()..];
            let clean = format!("{} {}", raw[..open].trim_end(), after.trim_start());
            let patch = SessionPatch {
                title: None,
                summary: (!summary.is_empty()).then(|| summary.to_string()),
            };
            return (clean.trim().to_string(), patch);
        }
    }

    (raw.to_string(), SessionPatch::default())
}

/// Whether a character is a CJK ideograph (a kanji candidate).
fn is_kanji(c: char) -> bool {
    matches!(c, '\u{4E00}'..='\u{9FFF}')
}

fn is_kana(c: char) -> bool {
    matches!(c, '\u{3040}'..='\u{309F}' | '\u{30A0}'..='\u{30FF}')
}

/// Candidate lookup tokens from a reply, in first-appearance order.
///
/// Alphanumeric runs become word tokens (contiguous Japanese script counts
/// as one run, so "食べる" is looked up whole; romaji words match slugs),
/// and each kanji additionally becomes a single-char token so the kanji
/// entry for "食" is also reachable. Duplicates are dropped.
fn candidate_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut seen = HashSet::new();
    let mut run = String::new();
    let mut kanji_in_run: Vec<char> = Vec::new();

    let mut flush = |run: &mut String,
                     kanji_in_run: &mut Vec<char>,
                     tokens: &mut Vec<String>,
                     seen: &mut HashSet<String>| {
        if !run.is_empty() {
            if seen.insert(run.clone()) {
                tokens.push(run.clone());
            }
            for k in kanji_in_run.iter() {
                let single = k.to_string();
                if single != *run && seen.insert(single.clone()) {
                    tokens.push(single);
                }
            }
            run.clear();
            kanji_in_run.clear();
        }
    };

    for c in text.chars() {
        if is_kanji(c) || is_kana(c) || c.is_alphanumeric() {
            run.push(c);
            if is_kanji(c) {
                kanji_in_run.push(c);
            }
        } else {
            flush(&mut run, &mut kanji_in_run, &mut tokens, &mut seen);
        }
    }
    flush(&mut run, &mut kanji_in_run, &mut tokens, &mut seen);

    tokens
}

/// Extracts structure from raw model replies.
pub struct ReplyPostProcessor {
    knowledge: Arc<dyn KnowledgeRepository>,
    grammar_pattern: Regex,
}

impl ReplyPostProcessor {
    pub fn new(knowledge: Arc<dyn KnowledgeRepository>) -> Self {
        Self {
            knowledge,
            // A tilde introduces a grammar pattern ("～てみる"); both the
            // fullwidth and ASCII tildes occur in model output.
            grammar_pattern: Regex::new(r"[～~]\S+").expect("static regex"),
        }
    }

    /// Process one raw reply. Infallible: enrichment steps that fail are
    /// logged and skipped, never surfaced.
    pub async fn process(&self, raw: &str, intent: Intent) -> ProcessedReply {
        let (clean, patch) = extract_sentinels(raw);
        let has_update = !patch.is_empty();

        let meta = MessageMeta {
            actions: self.detect_actions(&clean, intent),
            referenced_units: self.detect_references(&clean).await,
        };

        ProcessedReply {
            clean,
            patch,
            meta,
            has_update,
        }
    }

    fn detect_actions(&self, clean: &str, intent: Intent) -> Vec<Action> {
        let mut actions = Vec::new();
        let mut seen = HashSet::new();

        for m in self.grammar_pattern.find_iter(clean) {
            let pattern = m.as_str().trim_end_matches(['.', ',', '!', '?', '。', '、']);
            if pattern.chars().count() > 1 && seen.insert(pattern.to_string()) {
                actions.push(Action::GrammarReference {
                    pattern: pattern.to_string(),
                });
            }
        }

        if matches!(intent, Intent::StudyRequest | Intent::SrsSession) {
            actions.push(Action::DrillSuggestion);
        }

        actions
    }

    /// Resolve reply tokens against the curriculum, capped at
    /// [`MAX_REFERENCES`]. Lookup failures degrade to fewer references.
    async fn detect_references(&self, clean: &str) -> Vec<ReferencedUnit> {
        let mut units: Vec<ReferencedUnit> = Vec::new();

        for token in candidate_tokens(clean) {
            if units.len() >= MAX_REFERENCES {
                break;
            }
            match self.knowledge.search(&token, None, 1, 1).await {
                Ok(found) => {
                    if let Some(unit) = found.into_iter().next() {
                        if !units.iter().any(|u| u.id == unit.id) {
                            units.push(unit);
                        }
                    }
                }
                Err(e) => {
                    warn!(token = %token, error = %e, "curriculum lookup failed, skipping token");
                }
            }
        }

        units
    }
}
