//! # Primitives
//!
//! Fixed constants of the rewriting engine.
//!
//! These are compiled into the binary; callers override the defaults
//! through [`crate::options::RewriteOptions`], never by editing them.

/// Separator of inline-chained steps in a plain string (`"style!css"`).
pub const STEP_SEPARATOR: char = '!';

/// Step-name prefixes offloaded when the caller supplies none.
pub const DEFAULT_ELIGIBLE_PREFIXES: [&str; 2] = ["babel-loader", "css-loader"];

/// Step name of the reference that routes a rule to its pool delegate.
pub const DEFAULT_DELEGATE_STEP: &str = "happypack/loader";

/// Number of hex characters of the rule digest kept in a rule identifier.
pub const RULE_HASH_LENGTH: usize = 8;

/// Slug used when a matcher's source has no alphanumeric characters.
pub const FALLBACK_SLUG: &str = "rule";

/// Cache environment name when none is configured.
pub const DEFAULT_CACHE_ENV: &str = "development";
