//! Local redaction of sensitive clipboard content.
//!
//! Three independent patterns are applied in order, each on the output of the
//! previous one: SSN-like numbers, payment-card-like numbers (Luhn-validated),
//! and credential-like `key=value` pairs. Every matched span is replaced with
//! [`REDACTED_SENTINEL`].
//!
//! 本地脱敏：在上传前移除敏感内容。

mod luhn;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

pub use luhn::{is_repeated_digit, luhn_valid};

/// Replacement for every redacted span.
pub const REDACTED_SENTINEL: &str = "[REDACTED]";

const CARD_MIN_DIGITS: usize = 13;
const CARD_MAX_DIGITS: usize = 19;

static SSN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{3}[ -]?\d{2}[ -]?\d{4}\b").expect("ssn pattern"));

/// One whole digit run of card length, single spaces or dashes allowed
/// between any two digits.
static CARD_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d(?:[ -]?\d){12,18}").expect("card pattern"));

static CREDENTIAL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:password|pwd|secret|api[_-]?key|token)\s*[:=]\s*\S+")
        .expect("credential pattern")
});

/// Category of sensitive content found by [`redact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionCategory {
    Ssn,
    CreditCard,
    Credential,
}

impl RedactionCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ssn => "ssn",
            Self::CreditCard => "credit_card",
            Self::Credential => "credential",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactionResult {
    pub redacted: String,
    pub was_redacted: bool,
    /// Each category at most once, in detection order.
    pub categories: Vec<RedactionCategory>,
}

impl RedactionResult {
    fn passthrough(text: &str) -> Self {
        Self {
            redacted: text.to_string(),
            was_redacted: false,
            categories: Vec::new(),
        }
    }
}

/// Redact sensitive spans from `text`. Stateless; empty or absent input is
/// returned untouched.
pub fn redact<'a>(text: impl Into<Option<&'a str>>) -> RedactionResult {
    let text = match text.into() {
        Some(text) if !text.is_empty() => text,
        _ => return RedactionResult::passthrough(""),
    };

    let mut categories = Vec::new();

    let after_ssn = replace_tracked(&SSN_PATTERN, text, |_| true);
    if after_ssn.1 {
        categories.push(RedactionCategory::Ssn);
    }

    let after_card = replace_tracked(&CARD_PATTERN, &after_ssn.0, |m| {
        is_card_number(m.as_str()) && is_standalone_digit_run(&after_ssn.0, m.start(), m.end())
    });
    if after_card.1 {
        categories.push(RedactionCategory::CreditCard);
    }

    let after_credential = replace_tracked(&CREDENTIAL_PATTERN, &after_card.0, |_| true);
    if after_credential.1 {
        categories.push(RedactionCategory::Credential);
    }

    #[cfg(feature = "tracing")]
    if !categories.is_empty() {
        tracing::debug!(?categories, "sensitive content redacted");
    }

    RedactionResult {
        was_redacted: !categories.is_empty(),
        redacted: after_credential.0,
        categories,
    }
}

/// Replace every accepted match with the sentinel, reporting whether any was replaced.
fn replace_tracked<F>(pattern: &Regex, text: &str, accept: F) -> (String, bool)
where
    F: Fn(&regex::Match<'_>) -> bool,
{
    let mut replaced = false;
    let output = pattern.replace_all(text, |caps: &Captures<'_>| {
        let Some(m) = caps.get(0) else {
            return String::new();
        };
        if accept(&m) {
            replaced = true;
            REDACTED_SENTINEL.to_string()
        } else {
            m.as_str().to_string()
        }
    });
    (output.into_owned(), replaced)
}

fn is_card_number(candidate: &str) -> bool {
    let digits: Vec<u8> = candidate
        .bytes()
        .filter(u8::is_ascii_digit)
        .map(|b| b - b'0')
        .collect();

    (CARD_MIN_DIGITS..=CARD_MAX_DIGITS).contains(&digits.len())
        && !is_repeated_digit(&digits)
        && luhn_valid(&digits)
}

/// A card candidate must not be a slice of a longer number.
fn is_standalone_digit_run(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(|c| c.is_ascii_digit()) && !after.is_some_and(|c| c.is_ascii_digit())
}
