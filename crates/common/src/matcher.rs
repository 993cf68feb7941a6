//! Fuzzy identity matching for entity names
//!
//! Parallel test workers suffix fixture names (`"Eldoria-w3-17"`) so they do
//! not collide on the shared backend. The matcher equates the suffixed and
//! unsuffixed forms without knowing the suffix format.

use serde::{Deserialize, Serialize};

use crate::notification::PayloadField;

/// How two identifiers are compared after normalization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Equality only
    Exact,
    /// Equal, or either side contains the other
    #[default]
    ContainsEitherDirection,
}

/// Compare `candidate` against `expected` using trim + lowercase normalization.
///
/// An empty value on either side never matches.
pub fn matches(candidate: &str, expected: &str, mode: MatchMode) -> bool {
    compare(candidate, expected, mode, true)
}

fn compare(candidate: &str, expected: &str, mode: MatchMode, case_insensitive: bool) -> bool {
    let (candidate, expected) = if case_insensitive {
        (normalize(candidate), normalize(expected))
    } else {
        (candidate.trim().to_string(), expected.trim().to_string())
    };

    if candidate.is_empty() || expected.is_empty() {
        return false;
    }

    match mode {
        MatchMode::Exact => candidate == expected,
        MatchMode::ContainsEitherDirection => {
            candidate == expected || candidate.contains(&expected) || expected.contains(&candidate)
        }
    }
}

/// Trim and lowercase
pub fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Payload filter used by a channel listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRule {
    /// Payload field the rule reads
    pub field: PayloadField,

    /// Target value (world name, role, tab label, ...)
    pub expected: String,

    #[serde(default)]
    pub mode: MatchMode,

    #[serde(default = "default_case_insensitive")]
    pub case_insensitive: bool,
}

fn default_case_insensitive() -> bool {
    true
}

impl MatchRule {
    /// Fuzzy, case-insensitive rule on `field`
    pub fn fuzzy(field: PayloadField, expected: impl Into<String>) -> Self {
        Self {
            field,
            expected: expected.into(),
            mode: MatchMode::ContainsEitherDirection,
            case_insensitive: true,
        }
    }

    /// Exact, case-insensitive rule on `field`
    pub fn exact(field: PayloadField, expected: impl Into<String>) -> Self {
        Self {
            mode: MatchMode::Exact,
            ..Self::fuzzy(field, expected)
        }
    }

    pub fn case_sensitive(mut self) -> Self {
        self.case_insensitive = false;
        self
    }

    /// Evaluate the rule against a single field value
    pub fn evaluate(&self, value: &str) -> bool {
        compare(value, &self.expected, self.mode, self.case_insensitive)
    }
}
