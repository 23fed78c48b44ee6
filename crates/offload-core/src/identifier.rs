//! # Rule Identifier Generator
//!
//! Derives the `{slug}-{hash}` key of a rule's pool delegate.
//!
//! - `slug`: the matcher source, lower-cased, with every run of
//!   non-alphanumeric characters collapsed into one `-`
//! - `hash`: the first 8 hex characters of the BLAKE3 digest of the
//!   rule's canonical form
//!
//! The canonical form is the rule's JSON with object keys sorted at every
//! level, so it depends only on content. No randomness, no clock.
//!
//! Identifier collisions are not detected here. Under
//! [`IdentityScope::ChainOnly`] two rules that differ only in their matcher
//! share a digest; the slug still tells them apart unless the matchers
//! also slug identically.

use crate::primitives::{FALLBACK_SLUG, RULE_HASH_LENGTH};
use crate::{CompilationRule, Matcher, OffloadError, RuleId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which parts of a rule feed its digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityScope {
    /// The whole rule, matcher included.
    #[default]
    MatcherAndChain,
    /// The rule without its matcher.
    ChainOnly,
}

/// Serialize a rule into its canonical byte form.
pub fn canonical_form(
    rule: &CompilationRule,
    scope: IdentityScope,
) -> Result<Vec<u8>, OffloadError> {
    let mut value =
        serde_json::to_value(rule).map_err(|e| OffloadError::SerializationError(e.to_string()))?;

    if scope == IdentityScope::ChainOnly
        && let Value::Object(fields) = &mut value
    {
        fields.remove("test");
    }

    serde_json::to_vec(&sorted(value)).map_err(|e| OffloadError::SerializationError(e.to_string()))
}

/// Digest of a rule's canonical form, truncated to [`RULE_HASH_LENGTH`] hex characters.
pub fn rule_hash(rule: &CompilationRule, scope: IdentityScope) -> Result<String, OffloadError> {
    let bytes = canonical_form(rule, scope)?;
    let hex = blake3::hash(&bytes).to_hex();
    Ok(hex.as_str()[..RULE_HASH_LENGTH].to_string())
}

/// Identifier-safe slug of a matcher source.
#[must_use]
pub fn slug(matcher: &Matcher) -> String {
    let mut out = String::with_capacity(matcher.source().len());
    for c in matcher.source().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        out
    }
}

/// Combine a rule's slug with a precomputed hash.
#[must_use]
pub fn compose_id(rule: &CompilationRule, hash: &str) -> RuleId {
    RuleId(format!("{}-{}", slug(&rule.test), hash))
}

/// Identifier of a rule.
pub fn rule_id(rule: &CompilationRule, scope: IdentityScope) -> Result<RuleId, OffloadError> {
    Ok(compose_id(rule, &rule_hash(rule, scope)?))
}

/// Rebuild a JSON value with object keys in sorted order, recursively.
fn sorted(value: Value) -> Value {
    match value {
        Value::Object(fields) => {
            let mut entries: Vec<(String, Value)> = fields.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, sorted(value)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}

// =============================================================================
// TESTS
// =============================================================================
