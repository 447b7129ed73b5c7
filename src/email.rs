use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

pub const FROM: &str = "From";
pub const SUBJECT: &str = "Subject";
pub const DATE: &str = "Date";

/// Headers requested per message; bodies are never fetched
pub const METADATA_HEADERS: &[&str] = &[FROM, SUBJECT, DATE];

pub const NO_SUBJECT: &str = "No Subject";
pub const UNKNOWN_DATE: &str = "Unknown Date";

static BRACKETED_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(.+?)>").expect("bracketed address pattern is valid"));

/// A message as listed under a sender
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageRef {
    pub id: String,
    pub subject: String,
    pub date: String,
}

impl MessageRef {
    /// Builds a reference, substituting fallbacks for absent headers
    pub fn new(id: impl Into<String>, subject: Option<&str>, date: Option<&str>) -> Self {
        Self {
            id: id.into(),
            subject: subject.unwrap_or(NO_SUBJECT).to_string(),
            date: date.unwrap_or(UNKNOWN_DATE).to_string(),
        }
    }
}

/// How extracted addresses are turned into deduplication keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityPolicy {
    /// Addresses are compared exactly as they appear in the header
    #[default]
    Exact,
    /// `Jane@X.com` and `jane@x.com` are the same sender
    IgnoreCase,
}

impl IdentityPolicy {
    /// Derives the sender identity for a From header value
    pub fn identity(self, from: &str) -> String {
        let address = extract_address(from);
        match self {
            IdentityPolicy::Exact => address.to_string(),
            IdentityPolicy::IgnoreCase => address.to_lowercase(),
        }
    }
}

/// Extracts the address from a "Name <address>" header value.
/// Without angle brackets the raw value is returned untouched.
pub fn extract_address(from: &str) -> &str {
    BRACKETED_ADDRESS
        .captures(from)
        .and_then(|captures| captures.get(1))
        .map_or(from, |m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_address_with_name_and_brackets() {
        assert_eq!(extract_address("Jane Doe <jane@x.com>"), "jane@x.com");
    }

    #[test]
    fn test_extract_address_with_only_brackets() {
        assert_eq!(extract_address("<jane@test.org>"), "jane@test.org");
    }

    #[test]
    fn test_extract_address_without_brackets() {
        assert_eq!(extract_address("noreply@y.com"), "noreply@y.com");
    }

    #[test]
    fn test_extract_address_keeps_raw_value() {
        // No trimming or normalization of bare values
        assert_eq!(extract_address("  Spaced@Email.com "), "  Spaced@Email.com ");
    }

    #[test]
    fn test_extract_address_complex_name() {
        assert_eq!(
            extract_address("\"Doe, John\" <john.doe@company.co.uk>"),
            "john.doe@company.co.uk"
        );
    }

    #[test]
    fn test_extract_address_first_bracket_wins() {
        assert_eq!(extract_address("a <one@x.com> <two@x.com>"), "one@x.com");
    }

    #[test]
    fn test_extract_address_empty_brackets_not_an_address() {
        assert_eq!(extract_address("Nobody <>"), "Nobody <>");
    }

    #[test]
    fn test_identity_exact_preserves_case() {
        assert_eq!(
            IdentityPolicy::Exact.identity("Jane <Jane@X.com>"),
            "Jane@X.com"
        );
    }

    #[test]
    fn test_identity_ignore_case_lowercases() {
        assert_eq!(
            IdentityPolicy::IgnoreCase.identity("Jane <Jane@X.com>"),
            "jane@x.com"
        );
    }

    #[test]
    fn test_message_ref_fallbacks() {
        let msg = MessageRef::new("m1", None, None);
        assert_eq!(msg.subject, NO_SUBJECT);
        assert_eq!(msg.date, UNKNOWN_DATE);

        let msg = MessageRef::new("m2", Some("Hi"), Some("Mon, 1 Jan 2024 10:00:00 +0000"));
        assert_eq!(msg.subject, "Hi");
        assert_eq!(msg.date, "Mon, 1 Jan 2024 10:00:00 +0000");
    }
}
