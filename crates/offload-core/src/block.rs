//! # Blocks and Composition
//!
//! A block is a configuration-producing unit: given the composition
//! [`Context`] and the fragment assembled so far, it returns the fragment
//! it contributes. Assembly folds those contributions in order.
//!
//! ## Composition stages
//!
//! 1. `pre` hooks of every block run once, in order, and may adjust the context
//! 2. the blocks run, each seeing everything assembled before it
//! 3. `post` hooks run as blocks of their own, after all main blocks
//!
//! [`offload`] wraps every block (and, separately, every post hook) in an
//! [`Offloaded`] block that rewrites the rules the block contributes.

use crate::options::RewriteOptions;
use crate::pool::WorkerPool;
use crate::rewriter::{ChainRewriter, Rewrite};
use crate::{Fragment, OffloadError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared handle to a block.
pub type BlockRef = Arc<dyn Block>;

// =============================================================================
// CONTEXT
// =============================================================================

/// Values shared by all blocks of one assembly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    values: BTreeMap<String, Value>,
}

impl Context {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Set a value, replacing any previous one.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Check if no values are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// =============================================================================
// BLOCK TRAIT
// =============================================================================

/// A configuration-producing unit.
pub trait Block: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Produce this block's contribution, given what was assembled before it.
    fn apply(&self, context: &Context, prev: &Fragment) -> Result<Fragment, OffloadError>;

    /// Adjust the context before any block runs.
    fn pre(&self, _context: &mut Context) -> Result<(), OffloadError> {
        Ok(())
    }

    /// Blocks to run after all main blocks.
    fn post(&self) -> Vec<BlockRef> {
        Vec::new()
    }
}

// =============================================================================
// SIMPLE BLOCKS
// =============================================================================

/// A block that always contributes the same fragment.
pub struct StaticBlock {
    name: String,
    fragment: Fragment,
    context: BTreeMap<String, Value>,
    post: Vec<BlockRef>,
}

impl StaticBlock {
    /// Create a block contributing `fragment`.
    #[must_use]
    pub fn new(name: impl Into<String>, fragment: Fragment) -> Self {
        Self {
            name: name.into(),
            fragment,
            context: BTreeMap::new(),
            post: Vec::new(),
        }
    }

    /// Set a context value in the `pre` stage.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Add a post hook.
    #[must_use]
    pub fn with_post(mut self, hook: BlockRef) -> Self {
        self.post.push(hook);
        self
    }
}

impl Block for StaticBlock {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, _context: &Context, _prev: &Fragment) -> Result<Fragment, OffloadError> {
        Ok(self.fragment.clone())
    }

    fn pre(&self, context: &mut Context) -> Result<(), OffloadError> {
        for (key, value) in &self.context {
            context.set(key.clone(), value.clone());
        }
        Ok(())
    }

    fn post(&self) -> Vec<BlockRef> {
        self.post.clone()
    }
}

/// A block backed by a function.
pub struct FnBlock<F> {
    name: String,
    produce: F,
}

impl<F> Block for FnBlock<F>
where
    F: Fn(&Context, &Fragment) -> Result<Fragment, OffloadError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, context: &Context, prev: &Fragment) -> Result<Fragment, OffloadError> {
        (self.produce)(context, prev)
    }
}

/// Create a block from a function of the context and the assembled fragment.
pub fn from_fn<F>(name: impl Into<String>, produce: F) -> FnBlock<F>
where
    F: Fn(&Context, &Fragment) -> Result<Fragment, OffloadError> + Send + Sync,
{
    FnBlock {
        name: name.into(),
        produce,
    }
}

// =============================================================================
// GROUP
// =============================================================================

/// A sequence of blocks acting as one.
pub struct Group {
    blocks: Vec<BlockRef>,
}

impl Group {
    /// Create a group.
    #[must_use]
    pub fn new(blocks: Vec<BlockRef>) -> Self {
        Self { blocks }
    }

    /// The members, in order.
    #[must_use]
    pub fn blocks(&self) -> &[BlockRef] {
        &self.blocks
    }
}

impl Block for Group {
    fn name(&self) -> &str {
        "group"
    }

    fn apply(&self, context: &Context, prev: &Fragment) -> Result<Fragment, OffloadError> {
        let mut assembled = prev.clone();
        let mut contributed = Fragment::new();
        for block in &self.blocks {
            let delta = block.apply(context, &assembled)?;
            assembled.merge(delta.clone());
            contributed.merge(delta);
        }
        Ok(contributed)
    }

    fn pre(&self, context: &mut Context) -> Result<(), OffloadError> {
        for block in &self.blocks {
            block.pre(context)?;
        }
        Ok(())
    }

    fn post(&self) -> Vec<BlockRef> {
        self.blocks.iter().flat_map(|block| block.post()).collect()
    }
}

/// Assemble a configuration from a sequence of blocks.
pub fn create_config(blocks: &[BlockRef], mut context: Context) -> Result<Fragment, OffloadError> {
    let root = Group::new(blocks.to_vec());
    root.pre(&mut context)?;

    let mut assembled = Fragment::new();
    let delta = root.apply(&context, &assembled)?;
    assembled.merge(delta);

    for hook in root.post() {
        let delta = hook.apply(&context, &assembled)?;
        assembled.merge(delta);
    }

    tracing::debug!(
        rules = assembled.rules.len(),
        plugins = assembled.plugins.len(),
        "configuration assembled"
    );
    Ok(assembled)
}

// =============================================================================
// OFFLOAD WRAPPER
// =============================================================================

/// What every wrapper of one assembly shares.
struct Engine {
    rewriter: ChainRewriter,
    pool: Arc<dyn WorkerPool>,
}

/// A block whose contributed rules are rewritten onto the worker pool.
///
/// Rules already present in the fragment assembled upstream pass through
/// untouched; they were rewritten (or left alone) when first contributed.
pub struct Offloaded {
    inner: BlockRef,
    engine: Arc<Engine>,
}

impl Offloaded {
    /// The wrapped block.
    #[must_use]
    pub fn inner(&self) -> &BlockRef {
        &self.inner
    }
}

impl Block for Offloaded {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn apply(&self, context: &Context, prev: &Fragment) -> Result<Fragment, OffloadError> {
        let Fragment { mut plugins, rules } = self.inner.apply(context, prev)?;
        let mut rewritten = Vec::with_capacity(rules.len());
        let mut offloaded = 0usize;

        for rule in rules {
            if prev.contains_rule(&rule) {
                rewritten.push(rule);
                continue;
            }
            let Rewrite { rule, registration } = self.engine.rewriter.process(&rule)?;
            if let Some(registration) = registration {
                plugins.push(self.engine.pool.register_delegate(registration));
                offloaded += 1;
            }
            rewritten.push(rule);
        }

        tracing::debug!(block = self.name(), offloaded, "block rewritten");
        Ok(Fragment {
            plugins,
            rules: rewritten,
        })
    }

    fn pre(&self, context: &mut Context) -> Result<(), OffloadError> {
        self.inner.pre(context)
    }

    fn post(&self) -> Vec<BlockRef> {
        self.inner
            .post()
            .into_iter()
            .map(|hook| {
                Arc::new(Offloaded {
                    inner: hook,
                    engine: Arc::clone(&self.engine),
                }) as BlockRef
            })
            .collect()
    }
}

/// Wrap a sequence of blocks so their rules run through the worker pool.
///
/// With `disable_all` set, the blocks are grouped untouched.
///
/// # Errors
/// Returns `OffloadError::InvalidPattern` if the eligible prefixes do not compile.
pub fn offload(
    blocks: Vec<BlockRef>,
    options: &RewriteOptions,
    pool: Arc<dyn WorkerPool>,
) -> Result<Group, OffloadError> {
    if options.disable_all {
        tracing::info!("offloading disabled, blocks left untouched");
        return Ok(Group::new(blocks));
    }

    let engine = Arc::new(Engine {
        rewriter: ChainRewriter::new(options)?,
        pool,
    });

    Ok(Group::new(
        blocks
            .into_iter()
            .map(|inner| {
                Arc::new(Offloaded {
                    inner,
                    engine: Arc::clone(&engine),
                }) as BlockRef
            })
            .collect(),
    ))
}

// =============================================================================
// TESTS
// =============================================================================
