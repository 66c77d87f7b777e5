//! Redaction of secrets from dialer output and log lines.
//!
//! Applied to everything the dialer prints before it is stored in a
//! result or written to any log.

use regex::Regex;
use std::sync::LazyLock;

const REDACTED: &str = "[REDACTED]";

/// Patterns that should be redacted
static REDACTION_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        // pppd PAP/CHAP traces: password="..." or password=...
        (
            Regex::new(r#"(?i)(password|passwd|pwd|secret)\s*=\s*("[^"]*"|'[^']*'|\S+)"#).unwrap(),
            "$1=[REDACTED]",
        ),
        // pppd options: password "..." / password ...
        (
            Regex::new(r#"(?i)\b(password|passwd)\s+("[^"]*"|'[^']*'|\S+)"#).unwrap(),
            "$1 [REDACTED]",
        ),
        // key: value form
        (
            Regex::new(r#"(?i)(password|passwd|pwd)\s*:\s*\S+"#).unwrap(),
            "$1: [REDACTED]",
        ),
    ]
});

/// Redact sensitive patterns from text
pub fn redact(text: &str) -> String {
    let mut result = text.to_string();

    for (pattern, replacement) in REDACTION_PATTERNS.iter() {
        result = pattern.replace_all(&result, *replacement).to_string();
    }

    result
}

/// Redact patterns and every literal occurrence of `secret`
pub fn redact_secret(text: &str, secret: &str) -> String {
    redact_secrets(text, &[secret])
}

/// Redact patterns and every literal occurrence of each of `secrets`.
///
/// Longer secrets are replaced first so a username that contains the
/// password (or the reverse) leaves no fragment behind.
pub fn redact_secrets(text: &str, secrets: &[&str]) -> String {
    let mut ordered: Vec<&str> = secrets.iter().copied().filter(|s| !s.is_empty()).collect();
    ordered.sort_by_key(|s| std::cmp::Reverse(s.len()));

    let mut scrubbed = text.to_string();
    for secret in ordered {
        scrubbed = scrubbed.replace(secret, REDACTED);
    }
    redact(&scrubbed)
}

/// Check if text contains sensitive patterns
pub fn contains_sensitive(text: &str) -> bool {
    REDACTION_PATTERNS
        .iter()
        .any(|(pattern, _)| pattern.is_match(text))
}
