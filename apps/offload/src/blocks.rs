//! # Block Files
//!
//! JSON description of a block sequence, for the CLI.
//!
//! ```json
//! {
//!   "blocks": [
//!     {
//!       "name": "babel",
//!       "rules": [{ "test": "\\.jsx?$", "use": ["babel-loader"] }],
//!       "plugins": [],
//!       "context": { "babel": true },
//!       "post": [{ "name": "extract", "rules": [] }]
//!     }
//!   ]
//! }
//! ```

use offload_core::{BlockRef, CompilationRule, Fragment, OffloadError, Plugin, StaticBlock};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

/// Maximum size of a block file (64 MB).
const MAX_BLOCK_FILE_SIZE: u64 = 64 * 1024 * 1024;

/// One block as written in a block file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSpec {
    /// Block name.
    pub name: String,
    /// Rules the block contributes. `loaders` is read as a legacy name.
    #[serde(default, alias = "loaders")]
    pub rules: Vec<CompilationRule>,
    /// Plugins the block contributes.
    #[serde(default)]
    pub plugins: Vec<Plugin>,
    /// Context values set before any block runs.
    #[serde(default)]
    pub context: Map<String, Value>,
    /// Blocks run after all main blocks.
    #[serde(default)]
    pub post: Vec<BlockSpec>,
}

impl BlockSpec {
    /// Turn the description into a runnable block.
    #[must_use]
    pub fn into_block(self) -> BlockRef {
        let fragment = Fragment {
            plugins: self.plugins,
            rules: self.rules,
        };
        let mut block = StaticBlock::new(self.name, fragment);
        for (key, value) in self.context {
            block = block.with_context(key, value);
        }
        for hook in self.post {
            block = block.with_post(hook.into_block());
        }
        Arc::new(block)
    }

    fn collect_rules<'a>(&'a self, out: &mut Vec<(&'a str, &'a CompilationRule)>) {
        out.extend(self.rules.iter().map(|rule| (self.name.as_str(), rule)));
        for hook in &self.post {
            hook.collect_rules(out);
        }
    }
}

/// A sequence of blocks.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BlockFile {
    /// Blocks, in assembly order.
    pub blocks: Vec<BlockSpec>,
}

impl BlockFile {
    /// Parse a block file from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, OffloadError> {
        serde_json::from_slice(bytes).map_err(|e| OffloadError::SerializationError(e.to_string()))
    }

    /// Read and parse a block file.
    pub fn load(path: &Path) -> Result<Self, OffloadError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            OffloadError::IoError(format!("Cannot read file metadata: {}", e))
        })?;
        if metadata.len() > MAX_BLOCK_FILE_SIZE {
            return Err(OffloadError::SerializationError(format!(
                "File size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_BLOCK_FILE_SIZE
            )));
        }

        let bytes =
            std::fs::read(path).map_err(|e| OffloadError::IoError(format!("Read file: {}", e)))?;
        Self::from_slice(&bytes)
    }

    /// Every rule in the file, post hooks included, with its block name.
    #[must_use]
    pub fn rules(&self) -> Vec<(&str, &CompilationRule)> {
        let mut out = Vec::new();
        for block in &self.blocks {
            block.collect_rules(&mut out);
        }
        out
    }

    /// Turn the file into runnable blocks.
    #[must_use]
    pub fn into_blocks(self) -> Vec<BlockRef> {
        self.blocks.into_iter().map(BlockSpec::into_block).collect()
    }
}
