//! Declarative input validators.
//!
//! Validators are plain data so the conversation graph stays serializable.
//! A failed validation is not an error: the orchestrator re-prompts.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static DATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{2}-[0-9]{2}-[0-9]{4}$").expect("Invalid date regex"));

/// Predicate over raw turn input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputValidator {
    /// `DD-MM-YYYY` shape. Only the shape is checked, not calendar validity.
    DatePattern,
    /// ASCII digits whose value lies in `min..=max`.
    IntRange { min: u64, max: u64 },
    /// Exactly `len` ASCII digits.
    FixedLengthDigits { len: usize },
    /// Exactly `len` characters, each an uppercase ASCII letter or digit.
    AlnumPattern { len: usize },
}

impl InputValidator {
    pub fn accepts(&self, input: &str) -> bool {
        match self {
            InputValidator::DatePattern => DATE_PATTERN.is_match(input),
            InputValidator::IntRange { min, max } => {
                is_ascii_digits(input)
                    && input
                        .parse::<u64>()
                        .map(|n| (*min..=*max).contains(&n))
                        .unwrap_or(false)
            }
            InputValidator::FixedLengthDigits { len } => {
                input.len() == *len && is_ascii_digits(input)
            }
            InputValidator::AlnumPattern { len } => {
                input.len() == *len
                    && input
                        .bytes()
                        .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
            }
        }
    }
}

fn is_ascii_digits(input: &str) -> bool {
    !input.is_empty() && input.bytes().all(|b| b.is_ascii_digit())
}
