//! Intent classification — keyword and script-range routing.
//!
//! Routing is a latency/cost optimization: it avoids an extra model call
//! for classification, so correctness is best-effort. The heuristics live
//! behind this module's single entry point so a model-based classifier can
//! replace them without touching the orchestrator.

/// A coarse intent label for one user message. Computed fresh per message;
/// never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Greeting,
    SrsSession,
    StudyRequest,
    Analyze,
    ProjectQuery,
    GeneralChat,
}

const ANALYSIS_VERBS: [&str; 3] = ["analyze", "explain", "breakdown"];
const QUESTION_WORDS: [&str; 7] = ["what", "who", "where", "when", "why", "how", "tell"];
const PROJECT_KEYWORDS: [&str; 4] = ["project", "stack", "building", "architecture"];
const SRS_KEYWORDS: [&str; 2] = ["quiz me", "start test"];
const STUDY_KEYWORDS: [&str; 4] = ["study", "practice", "learn", "suggestion"];
const GREETING_PREFIXES: [&str; 5] = ["hi", "hello", "konnichiwa", "yo", "hey"];

/// Whether a character is in a Japanese script range
/// (Hiragana, Katakana, or CJK ideographs).
fn is_japanese_char(c: char) -> bool {
    matches!(c,
        '\u{3040}'..='\u{309F}'   // Hiragana
        | '\u{30A0}'..='\u{30FF}' // Katakana
        | '\u{4E00}'..='\u{9FFF}' // CJK ideographs
    )
}

/// Whether the text contains any Japanese-script character.
pub fn contains_japanese(text: &str) -> bool {
    text.chars().any(is_japanese_char)
}

/// Classify a raw user message into a coarse intent.
///
/// Pure and deterministic: same input always yields the same intent.
/// Rules are ordered; first match wins; the fallback is `GeneralChat`.
pub fn classify(text: &str) -> Intent {
    let trimmed = text.trim();
    let lower = trimmed.to_lowercase();
    let japanese = contains_japanese(trimmed);

    // Explicit analysis request over Japanese text
    if japanese && ANALYSIS_VERBS.iter().any(|v| lower.starts_with(v)) {
        return Intent::Analyze;
    }

    // Short Japanese-heavy input is assumed to be "please analyze this
    // sentence" — unless it reads like an English question about it.
    let len = trimmed.chars().count();
    if japanese
        && len > 2
        && len < 100
        && !QUESTION_WORDS.iter().any(|w| lower.starts_with(w))
    {
        return Intent::Analyze;
    }

    if PROJECT_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return Intent::ProjectQuery;
    }

    if SRS_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return Intent::SrsSession;
    }

    if STUDY_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return Intent::StudyRequest;
    }

    if GREETING_PREFIXES.iter().any(|g| lower.starts_with(g)) {
        return Intent::Greeting;
    }

    Intent::GeneralChat
}
