//! Text sanitization for anything that may end up in a graph query or prompt.
//!
//! Sanitizing and length-limiting are deliberately separate steps: callers
//! run [`sanitize`] first and [`truncate`] afterwards, so long but harmless
//! text is shortened instead of rejected.

use regex::Regex;
use std::sync::LazyLock;

pub const MAX_FIELD_LEN: usize = 500;
pub const MAX_TYPE_LEN: usize = 100;
pub const MAX_QUERY_LEN: usize = 2000;

static SCRIPT_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>").unwrap()
});
static TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static CONTROLS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{Cc}\p{Cf}&&[^\t\n\r\x0B\x0C]]").unwrap());
static DISALLOWED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s\-.,!?]").unwrap());
static COMMENT_DASHES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{2,}").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static KEY_PUNCTUATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.,!?]").unwrap());

/// Strip markup, control characters and comment sequences. Idempotent.
pub fn sanitize(text: &str) -> String {
    let text = SCRIPT_BLOCKS.replace_all(text, "");
    let text = TAGS.replace_all(&text, "");
    let text = CONTROLS.replace_all(&text, "");
    let text = DISALLOWED.replace_all(&text, "");
    // Must run after DISALLOWED, which can bring dashes next to each other
    let text = COMMENT_DASHES.replace_all(&text, "");
    let text = WHITESPACE.replace_all(&text, " ");
    text.trim().to_string()
}

/// Cut to at most `max_chars` characters
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    cut.trim_end().to_string()
}

/// Sanitize then truncate, the order every field goes through
pub fn clean_field(text: &str, max_chars: usize) -> String {
    truncate(&sanitize(text), max_chars)
}

/// Lowercased, punctuation-free form used as an identity key
pub fn canonical_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let stripped = KEY_PUNCTUATION.replace_all(&lowered, "");
    WHITESPACE.replace_all(stripped.trim(), " ").to_string()
}

/// Entity types are upper-case labels such as `PERSON` or `ORGANIZATION`
pub fn normalize_entity_type(raw: &str) -> String {
    let upper = sanitize(raw).to_uppercase().replace(' ', "_");
    truncate(&upper, MAX_TYPE_LEN)
}
