//! # offload-core
//!
//! The rule-rewriting engine for Offload - THE LOGIC.
//!
//! Given configuration-producing blocks, each contributing compilation rules
//! (matcher → chain of steps), this crate rewrites the eligible steps of
//! every chain into a single reference to a worker-pool delegate and adds
//! the matching delegate registration to the assembled configuration.
//!
//! ## Pipeline (per rule)
//!
//! ```text
//! rule ─► normalizer ─► eligibility ─► identifier ─► rewriter ─► (rule', registration)
//! ```
//!
//! ## Architectural Constraints
//!
//! - Deterministic: identical input yields identical rules and identifiers
//! - Idempotent across blocks: rules already assembled upstream are not reprocessed
//! - Has NO async, NO environment reads, NO randomness (pure Rust)
//! - The worker pool is injected, configured, and never driven

// =============================================================================
// MODULES
// =============================================================================

pub mod block;
pub mod eligibility;
pub mod identifier;
pub mod normalizer;
pub mod options;
pub mod pool;
pub mod primitives;
pub mod rewriter;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    CacheContext, CachePolicy, Chain, ChainField, CompilationRule, DelegatePlugin, Fragment,
    Matcher, OffloadError, Plugin, PoolDelegateRegistration, PoolHandle, Refresh, RuleId, Step,
    WrappedStep,
};

// =============================================================================
// RE-EXPORTS: Rewriting Engine
// =============================================================================

pub use block::{
    Block, BlockRef, Context, FnBlock, Group, Offloaded, StaticBlock, create_config, from_fn,
    offload,
};
pub use eligibility::EligibilityPattern;
pub use identifier::{IdentityScope, rule_hash, rule_id, slug};
pub use normalizer::ChainNormalizer;
pub use options::RewriteOptions;
pub use pool::{ThreadPool, WorkerPool};
pub use rewriter::{ChainRewriter, Rewrite};
