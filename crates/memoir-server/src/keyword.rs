// crates/memoir-server/src/keyword.rs
// Trigger-phrase detection for chat messages
//
// Code is stripped before matching so that `remember` inside a fence or
// inline span never fires the detector.

use once_cell::sync::Lazy;
use regex::Regex;

/// Built-in trigger phrases, unioned with any configured extras.
pub const DEFAULT_KEYWORDS: [&str; 15] = [
    "remember",
    "memorize",
    "save this",
    "note this",
    "keep in mind",
    "don't forget",
    "learn this",
    "store this",
    "record this",
    "make a note",
    "take note",
    "jot down",
    "commit to memory",
    "never forget",
    "always remember",
];

/// Fenced code blocks: triple-backtick, lazy across lines.
#[allow(clippy::unwrap_used)] // pattern is a compile-time constant
static FENCED_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```.*?```").unwrap());

/// Inline code spans: single-backtick, lazy, no newlines.
#[allow(clippy::unwrap_used)] // pattern is a compile-time constant
static INLINE_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`[^`\n]*?`").unwrap());

/// Remove fenced blocks first, then inline spans. Matches are replaced
/// with a space so the surrounding words don't fuse together.
fn strip_code(text: &str) -> String {
    let without_fences = FENCED_CODE_RE.replace_all(text, " ");
    INLINE_CODE_RE.replace_all(&without_fences, " ").into_owned()
}

/// Case-insensitive, word-boundary matcher over a keyword set.
#[derive(Debug, Clone)]
pub struct KeywordDetector {
    /// None when the keyword set is empty; such a detector never matches.
    pattern: Option<Regex>,
}

impl KeywordDetector {
    /// Detector over the default set plus the given extras.
    pub fn new(extra_keywords: &[String]) -> Self {
        let keywords: Vec<&str> = DEFAULT_KEYWORDS
            .iter()
            .copied()
            .chain(extra_keywords.iter().map(|k| k.as_str()))
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .collect();
        Self::from_keywords(&keywords)
    }

    /// Detector over the default set only.
    pub fn with_defaults() -> Self {
        Self::new(&[])
    }

    /// Detector over an explicit keyword set (empty set never matches).
    pub fn from_keywords(keywords: &[&str]) -> Self {
        if keywords.is_empty() {
            return Self { pattern: None };
        }

        let escaped: Vec<String> = keywords.iter().map(|k| regex::escape(k)).collect();
        let source = format!(r"(?i)\b(?:{})\b", escaped.join("|"));
        let pattern = match Regex::new(&source) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!("failed to build keyword pattern, detection disabled: {e}");
                None
            }
        };
        Self { pattern }
    }

    /// True when any keyword appears outside code spans.
    pub fn detect(&self, text: &str) -> bool {
        let Some(pattern) = &self.pattern else {
            return false;
        };
        pattern.is_match(&strip_code(text))
    }
}

impl Default for KeywordDetector {
    fn default() -> Self {
        Self::with_defaults()
    }
}
