//! # Eligibility Matcher
//!
//! Decides which steps of a chain run on the worker pool.
//!
//! An allow-list of step-name prefixes compiles into one anchored,
//! case-insensitive alternation. Prefixes are literal text: `.` or `+`
//! in a prefix match themselves, not any character.

use crate::{OffloadError, Step};
use regex::{Regex, RegexBuilder};

/// Compiled allow-list of step-name prefixes.
#[derive(Debug, Clone)]
pub struct EligibilityPattern {
    /// `None` for an empty allow-list, which matches nothing.
    regex: Option<Regex>,
}

impl EligibilityPattern {
    /// Compile an allow-list.
    ///
    /// Empty prefixes are ignored; they would otherwise match every step.
    pub fn new<S: AsRef<str>>(prefixes: &[S]) -> Result<Self, OffloadError> {
        let alternatives: Vec<String> = prefixes
            .iter()
            .map(|prefix| prefix.as_ref())
            .filter(|prefix| !prefix.is_empty())
            .map(regex::escape)
            .collect();

        if alternatives.is_empty() {
            return Ok(Self { regex: None });
        }

        let regex = RegexBuilder::new(&format!("^(?:{})", alternatives.join("|")))
            .case_insensitive(true)
            .build()
            .map_err(|e| OffloadError::InvalidPattern(e.to_string()))?;

        Ok(Self { regex: Some(regex) })
    }

    /// The compiled pattern source, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.regex.as_ref().map(Regex::as_str)
    }

    /// Check a step name against the allow-list.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.regex.as_ref().is_some_and(|regex| regex.is_match(name))
    }

    /// Check a step by its canonical name.
    #[must_use]
    pub fn is_eligible(&self, step: &Step) -> bool {
        self.matches(step.name())
    }

    /// Select the eligible steps of a chain, in chain order.
    ///
    /// Duplicates are kept. Wrapped steps are returned in their execution
    /// view (`loader` and `options` only).
    #[must_use]
    pub fn filter(&self, chain: &[Step]) -> Vec<Step> {
        chain
            .iter()
            .filter(|step| self.is_eligible(step))
            .map(Step::execution_view)
            .collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================
