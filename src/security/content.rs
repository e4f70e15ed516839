//! Content-safety scanning: a regex pattern list flagging likely PII,
//! credentials, and payment-card numbers in text about to be sent to or
//! received from a model (spec §4.4).
//!
//! This is a filter, not a classifier: it looks for structural patterns
//! (a 16-digit run grouped like a card number, an `sk-`-prefixed token,
//! an email address) rather than attempting semantic moderation, which
//! is out of scope for this runtime and left to whatever model or
//! service sits behind [`crate::sdk::AgentSdk`].

use regex::Regex;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFlag {
    Email,
    CreditCard,
    ApiKeyLike,
    SocialSecurityNumber,
}

impl std::fmt::Display for ContentFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ContentFlag::Email => "email",
            ContentFlag::CreditCard => "credit_card",
            ContentFlag::ApiKeyLike => "api_key_like",
            ContentFlag::SocialSecurityNumber => "ssn",
        };
        write!(f, "{s}")
    }
}

struct Pattern {
    flag: ContentFlag,
    regex: &'static LazyLock<Regex>,
}

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").unwrap());
static CREDIT_CARD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\d[ -]?){13,16}\b").unwrap());
static API_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(sk|pk|rk)-[A-Za-z0-9]{16,}\b").unwrap());
static SSN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());

fn patterns() -> [Pattern; 4] {
    [
        Pattern { flag: ContentFlag::Email, regex: &EMAIL_RE },
        Pattern { flag: ContentFlag::CreditCard, regex: &CREDIT_CARD_RE },
        Pattern { flag: ContentFlag::ApiKeyLike, regex: &API_KEY_RE },
        Pattern { flag: ContentFlag::SocialSecurityNumber, regex: &SSN_RE },
    ]
}

/// Outcome of scanning one piece of text.
#[derive(Debug, Clone)]
pub struct ContentCheckResult {
    pub is_flagged: bool,
    pub flags: Vec<ContentFlag>,
    /// False when a flag is severe enough that the content should be
    /// rejected outright rather than redacted and allowed through.
    pub safe_to_use: bool,
    /// `text` with every match replaced by `[REDACTED:<flag>]`.
    pub filtered_content: String,
}

/// Flags severe enough to block rather than redact (spec: `safe_to_use`
/// is false only for credential-like content, since a redacted email or
/// SSN is still useful conversational content but a redacted API key
/// has already leaked by the time it reaches this scanner).
const BLOCKING_FLAGS: &[ContentFlag] = &[ContentFlag::ApiKeyLike];

/// Scans `text` against the built-in pattern list.
pub fn scan(text: &str) -> ContentCheckResult {
    let mut flags = Vec::new();
    let mut filtered = text.to_string();

    for pattern in patterns() {
        if pattern.regex.is_match(&filtered) {
            flags.push(pattern.flag);
            let replacement = format!("[REDACTED:{}]", pattern.flag);
            filtered = pattern.regex.replace_all(&filtered, replacement.as_str()).into_owned();
        }
    }

    let is_flagged = !flags.is_empty();
    let safe_to_use = !flags.iter().any(|f| BLOCKING_FLAGS.contains(f));

    ContentCheckResult {
        is_flagged,
        flags,
        safe_to_use,
        filtered_content: filtered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_not_flagged() {
        let result = scan("hello, how can I help you today?");
        assert!(!result.is_flagged);
        assert!(result.safe_to_use);
    }

    #[test]
    fn test_email_flagged_but_safe_to_use() {
        let result = scan("contact me at alice@example.com please");
        assert!(result.is_flagged);
        assert!(result.flags.contains(&ContentFlag::Email));
        assert!(result.safe_to_use);
        assert!(result.filtered_content.contains("[REDACTED:email]"));
        assert!(!result.filtered_content.contains("alice@example.com"));
    }

    #[test]
    fn test_api_key_like_blocks() {
        let result = scan("my key is sk-abcdefghijklmnopqrstuvwxyz");
        assert!(result.is_flagged);
        assert!(result.flags.contains(&ContentFlag::ApiKeyLike));
        assert!(!result.safe_to_use);
    }

    #[test]
    fn test_credit_card_pattern_flagged() {
        let result = scan("card number 4111 1111 1111 1111 thanks");
        assert!(result.flags.contains(&ContentFlag::CreditCard));
    }

    #[test]
    fn test_ssn_pattern_flagged() {
        let result = scan("ssn is 123-45-6789");
        assert!(result.flags.contains(&ContentFlag::SocialSecurityNumber));
    }
}
