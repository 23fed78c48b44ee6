//! # Rewrite Options
//!
//! What a caller can tune about the rewrite.

use crate::identifier::IdentityScope;
use crate::primitives::{DEFAULT_DELEGATE_STEP, DEFAULT_ELIGIBLE_PREFIXES};
use crate::CachePolicy;

/// Options shared by every wrapped block of one assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct RewriteOptions {
    /// Step-name prefixes to offload.
    pub eligible_prefixes: Vec<String>,
    /// Cache settings copied into each registration.
    pub cache_policy: CachePolicy,
    /// Step name of the delegate reference.
    pub delegate_step: String,
    /// Which parts of a rule feed its identifier.
    pub identity: IdentityScope,
    /// Skip all wrapping.
    pub disable_all: bool,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            eligible_prefixes: DEFAULT_ELIGIBLE_PREFIXES
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
            cache_policy: CachePolicy::default(),
            delegate_step: DEFAULT_DELEGATE_STEP.to_string(),
            identity: IdentityScope::default(),
            disable_all: false,
        }
    }
}

impl RewriteOptions {
    /// Create options with the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the eligible prefixes.
    #[must_use]
    pub fn with_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.eligible_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the cache policy.
    #[must_use]
    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    /// Replace the delegate step name.
    #[must_use]
    pub fn with_delegate_step(mut self, step: impl Into<String>) -> Self {
        self.delegate_step = step.into();
        self
    }

    /// Replace the identity scope.
    #[must_use]
    pub fn with_identity(mut self, identity: IdentityScope) -> Self {
        self.identity = identity;
        self
    }

    /// Turn all wrapping on or off.
    #[must_use]
    pub fn disabled(mut self, disable_all: bool) -> Self {
        self.disable_all = disable_all;
        self
    }
}
