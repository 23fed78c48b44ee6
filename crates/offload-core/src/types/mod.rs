//! # Core Type Definitions
//!
//! This module contains all core types for the offload rule-rewriting engine:
//! - Processing steps and chains (`Step`, `WrappedStep`, `Chain`)
//! - Compilation rules (`Matcher`, `ChainField`, `CompilationRule`)
//! - Pool delegate registrations (`RuleId`, `CachePolicy`, `PoolDelegateRegistration`)
//! - Configuration fragments (`Plugin`, `Fragment`)
//! - Error types (`OffloadError`)
//!
//! ## Determinism Guarantees
//!
//! Equality on every type is structural. JSON objects compare by content,
//! not by key order, so two rules written with different key orders are
//! the same rule.

use crate::primitives::DEFAULT_CACHE_ENV;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

// =============================================================================
// STEPS
// =============================================================================

/// A step written as an object: a step name plus attached metadata.
///
/// Auxiliary fields (extraction markers, `query`, ...) live in `extra` and
/// are carried through a rewrite untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrappedStep {
    /// The step name.
    pub loader: String,
    /// Step options, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
    /// Every other field of the object.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WrappedStep {
    /// Create a wrapped step with no options and no auxiliary fields.
    #[must_use]
    pub fn new(loader: impl Into<String>) -> Self {
        Self {
            loader: loader.into(),
            options: None,
            extra: Map::new(),
        }
    }

    /// The wrapped form of a delegate reference.
    #[must_use]
    pub fn delegate(step_name: &str, id: &RuleId) -> Self {
        let mut options = Map::new();
        options.insert("id".to_string(), Value::String(id.as_str().to_string()));
        Self::new(step_name).with_options(Value::Object(options))
    }

    /// Attach options.
    #[must_use]
    pub fn with_options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }

    /// Attach an auxiliary field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// One atomic processing unit of a chain.
///
/// A bare step serializes as a JSON string, a wrapped step as a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Step {
    /// Name only.
    Bare(String),
    /// Name plus metadata.
    Wrapped(WrappedStep),
}

impl Step {
    /// Create a bare step.
    #[must_use]
    pub fn bare(name: impl Into<String>) -> Self {
        Self::Bare(name.into())
    }

    /// Create a wrapped step without options.
    #[must_use]
    pub fn wrapped(loader: impl Into<String>) -> Self {
        Self::Wrapped(WrappedStep::new(loader))
    }

    /// The reference that routes a rule's eligible steps to its pool delegate.
    #[must_use]
    pub fn delegate(step_name: &str, id: &RuleId) -> Self {
        Self::Wrapped(WrappedStep::delegate(step_name, id))
    }

    /// Canonical name: the bare string, or the wrapped step's `loader`.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Bare(name) => name,
            Self::Wrapped(step) => &step.loader,
        }
    }

    /// Check if this step was written as an object.
    #[must_use]
    pub fn is_wrapped(&self) -> bool {
        matches!(self, Self::Wrapped(_))
    }

    /// The part of the step a worker pool needs to execute it.
    ///
    /// Wrapped steps keep `loader` and `options`; auxiliary fields stay on the rule.
    #[must_use]
    pub fn execution_view(&self) -> Self {
        match self {
            Self::Bare(name) => Self::Bare(name.clone()),
            Self::Wrapped(step) => Self::Wrapped(WrappedStep {
                loader: step.loader.clone(),
                options: step.options.clone(),
                extra: Map::new(),
            }),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bare(name) => f.write_str(name),
            Self::Wrapped(step) => match &step.options {
                Some(options) => write!(f, "{}?{}", step.loader, options),
                None => f.write_str(&step.loader),
            },
        }
    }
}

/// An ordered list of steps. Order is significant.
pub type Chain = Vec<Step>;

// =============================================================================
// COMPILATION RULES
// =============================================================================

/// The pattern source a rule uses to select input paths.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Matcher(pub String);

impl Matcher {
    /// Create a matcher from its pattern source.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self(source.into())
    }

    /// Get the pattern source.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.0
    }
}

/// The field names a rule may declare its chain under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChainField {
    /// `loader`
    Loader,
    /// `loaders`
    Loaders,
    /// `use`
    Use,
}

impl ChainField {
    /// Lookup order when locating a rule's chain.
    pub const PRECEDENCE: [ChainField; 3] = [Self::Loader, Self::Loaders, Self::Use];

    /// The field name as written in a configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Loader => "loader",
            Self::Loaders => "loaders",
            Self::Use => "use",
        }
    }
}

impl fmt::Display for ChainField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pattern-to-chain mapping in a build configuration.
///
/// The chain fields hold the raw, unnormalized representation; see
/// [`crate::normalizer::ChainNormalizer`] for the accepted shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilationRule {
    /// Input-path matcher.
    pub test: Matcher,
    /// Chain declared under `loader`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loader: Option<Value>,
    /// Chain declared under `loaders`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loaders: Option<Value>,
    /// Chain declared under `use`.
    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub use_: Option<Value>,
    /// Every other field (`include`, `exclude`, ...), untouched by rewriting.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CompilationRule {
    /// Create a rule with a matcher and no chain.
    #[must_use]
    pub fn new(test: impl Into<String>) -> Self {
        Self {
            test: Matcher::new(test),
            loader: None,
            loaders: None,
            use_: None,
            extra: Map::new(),
        }
    }

    /// Set a chain field.
    #[must_use]
    pub fn with_chain(mut self, field: ChainField, chain: Value) -> Self {
        *self.slot_mut(field) = Some(chain);
        self
    }

    /// Set a non-chain field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Get the raw value of a chain field.
    #[must_use]
    pub fn chain_field(&self, field: ChainField) -> Option<&Value> {
        match field {
            ChainField::Loader => self.loader.as_ref(),
            ChainField::Loaders => self.loaders.as_ref(),
            ChainField::Use => self.use_.as_ref(),
        }
    }

    /// Remove every chain field.
    pub fn clear_chain(&mut self) {
        for field in ChainField::PRECEDENCE {
            *self.slot_mut(field) = None;
        }
    }

    fn slot_mut(&mut self, field: ChainField) -> &mut Option<Value> {
        match field {
            ChainField::Loader => &mut self.loader,
            ChainField::Loaders => &mut self.loaders,
            ChainField::Use => &mut self.use_,
        }
    }
}

// =============================================================================
// RULE IDENTIFIER
// =============================================================================

/// Deterministic key of a rule's pool delegate: `{slug}-{hash}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub String);

impl RuleId {
    /// Create an identifier from a string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// CACHE POLICY
// =============================================================================

/// Cache-busting token handed to the worker pool.
///
/// `Fixed(0)` keeps the pool cache; a `Token` is regenerated on every
/// request for a refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Refresh {
    /// A numeric token.
    Fixed(u64),
    /// A generated token.
    Token(String),
}

impl Default for Refresh {
    fn default() -> Self {
        Self::Fixed(0)
    }
}

/// The context the worker pool keys its cache on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheContext {
    /// Build environment name.
    pub env: String,
    /// Cache-busting token.
    pub refresh: Refresh,
    /// Caller-supplied fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for CacheContext {
    fn default() -> Self {
        Self {
            env: DEFAULT_CACHE_ENV.to_string(),
            refresh: Refresh::default(),
            extra: Map::new(),
        }
    }
}

impl CacheContext {
    /// Create a context for an environment with the fixed refresh token.
    #[must_use]
    pub fn new(env: impl Into<String>) -> Self {
        Self {
            env: env.into(),
            ..Self::default()
        }
    }

    /// Lay caller-supplied fields over this context.
    ///
    /// `env` and `refresh` replace the typed fields; anything else is kept as is.
    pub fn with_overrides(mut self, overrides: &Map<String, Value>) -> Result<Self, OffloadError> {
        for (key, value) in overrides {
            match key.as_str() {
                "env" => {
                    self.env = value
                        .as_str()
                        .ok_or_else(|| {
                            OffloadError::ConfigError("cacheContext.env must be a string".into())
                        })?
                        .to_string();
                }
                "refresh" => {
                    self.refresh = serde_json::from_value(value.clone()).map_err(|_| {
                        OffloadError::ConfigError(
                            "cacheContext.refresh must be a non-negative integer or a string"
                                .into(),
                        )
                    })?;
                }
                _ => {
                    self.extra.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(self)
    }
}

/// Cache settings applied to every delegate registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachePolicy {
    /// Whether the worker pool caches step output.
    pub cache: bool,
    /// What the cache is keyed on.
    pub cache_context: CacheContext,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            cache: true,
            cache_context: CacheContext::default(),
        }
    }
}

// =============================================================================
// POOL DELEGATES & PLUGINS
// =============================================================================

/// What the worker pool receives for one rewritten rule.
///
/// Created at most once per rewritten rule. The pool receiving it may
/// adjust its cache context before binding it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolDelegateRegistration {
    /// Delegate key, referenced from the rewritten chain.
    pub id: RuleId,
    /// The eligible steps, in chain order.
    pub steps: Chain,
    /// Whether the pool caches step output.
    pub cache: bool,
    /// What the cache is keyed on.
    pub cache_context: CacheContext,
}

impl PoolDelegateRegistration {
    /// Create a registration under a cache policy.
    #[must_use]
    pub fn new(id: RuleId, steps: Chain, policy: &CachePolicy) -> Self {
        Self {
            id,
            steps,
            cache: policy.cache,
            cache_context: policy.cache_context.clone(),
        }
    }
}

/// The shared pool a delegate is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolHandle {
    /// Number of background workers.
    pub size: usize,
}

/// A registration bound to a worker pool, as it appears in a plugin list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegatePlugin {
    /// The registration.
    pub delegate: PoolDelegateRegistration,
    /// The pool it runs on.
    pub thread_pool: PoolHandle,
}

/// An entry of a configuration's plugin list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Plugin {
    /// A pool delegate registered by the rewriter.
    Delegate(DelegatePlugin),
    /// Any other plugin, kept opaque.
    External(Value),
}

impl Plugin {
    /// The delegate id, if this is a pool delegate.
    #[must_use]
    pub fn delegate_id(&self) -> Option<&RuleId> {
        match self {
            Self::Delegate(plugin) => Some(&plugin.delegate.id),
            Self::External(_) => None,
        }
    }
}

// =============================================================================
// FRAGMENT
// =============================================================================

/// A piece of build configuration: plugins plus rules.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Fragment {
    /// Plugin registrations, in order.
    #[serde(default)]
    pub plugins: Vec<Plugin>,
    /// Compilation rules, in order. `loaders` is read as a legacy name.
    #[serde(default, alias = "loaders")]
    pub rules: Vec<CompilationRule>,
}

impl Fragment {
    /// Create an empty fragment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule.
    #[must_use]
    pub fn with_rule(mut self, rule: CompilationRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Append a plugin.
    #[must_use]
    pub fn with_plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Check if a structurally equal rule is already present.
    #[must_use]
    pub fn contains_rule(&self, rule: &CompilationRule) -> bool {
        self.rules.contains(rule)
    }

    /// Check if a delegate with this id is already registered.
    #[must_use]
    pub fn has_delegate(&self, id: &RuleId) -> bool {
        self.plugins.iter().any(|p| p.delegate_id() == Some(id))
    }

    /// Fold another fragment into this one.
    ///
    /// Plugins and rules are appended in order. A rule equal to one already
    /// present is skipped, and so is a delegate whose id is already registered.
    pub fn merge(&mut self, other: Fragment) {
        for plugin in other.plugins {
            if let Some(id) = plugin.delegate_id()
                && self.has_delegate(id)
            {
                continue;
            }
            self.plugins.push(plugin);
        }
        for rule in other.rules {
            if !self.contains_rule(&rule) {
                self.rules.push(rule);
            }
        }
    }

    /// Check if the fragment carries nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty() && self.rules.is_empty()
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur while rewriting or assembling a configuration.
///
/// - No silent failures
/// - Every error aborts the assembly; nothing is retried
#[derive(Debug, Error)]
pub enum OffloadError {
    /// A rule declares its chain under more than one field.
    #[error("Malformed rule: chain declared under more than one field ({})", .fields.join(", "))]
    AmbiguousChain {
        /// The populated fields, in lookup order.
        fields: Vec<&'static str>,
    },

    /// A chain entry has a shape that is neither a string nor a step object.
    #[error("Malformed rule: unrecognized chain entry {0}")]
    UnrecognizedStep(String),

    /// The eligibility pattern could not be compiled.
    #[error("Invalid eligibility pattern: {0}")]
    InvalidPattern(String),

    /// A block failed to produce its fragment.
    #[error("Block '{block}' failed: {reason}")]
    BlockFailed {
        /// The failing block.
        block: String,
        /// What went wrong.
        reason: String,
    },

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// A configuration value is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

// =============================================================================
// TESTS
// =============================================================================
