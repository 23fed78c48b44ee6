//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::blocks::BlockFile;
use crate::config::Resolved;
use offload_core::{
    BlockRef, ChainNormalizer, ChainRewriter, CompilationRule, Context, Fragment, OffloadError,
    RewriteOptions, RuleId, Step, WorkerPool, create_config, offload, rule_id,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Maximum size of a single-rule file (1 MB).
const MAX_RULE_FILE_SIZE: u64 = 1024 * 1024;

/// Validate input path.
///
/// Canonicalizes the path and ensures it is a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, OffloadError> {
    let canonical = path.canonicalize().map_err(|e| {
        OffloadError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(OffloadError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Validate output path: the parent directory must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, OffloadError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        OffloadError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(OffloadError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| OffloadError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

// =============================================================================
// REWRITE COMMAND
// =============================================================================

/// Assemble a block file through the offload wrapper.
pub fn assemble(resolved: &Resolved, file: BlockFile) -> Result<Fragment, OffloadError> {
    let group = offload(file.into_blocks(), &resolved.options, resolved.worker_pool())?;
    create_config(&[Arc::new(group) as BlockRef], Context::new())
}

/// Rewrite a block file and write the configuration as JSON.
pub fn cmd_rewrite(
    resolved: &Resolved,
    input: &Path,
    output: Option<&Path>,
) -> Result<(), OffloadError> {
    tracing::info!("Rewriting {:?}", input);

    let file = BlockFile::load(&validate_file_path(input)?)?;
    let config = assemble(resolved, file)?;

    let delegates = config
        .plugins
        .iter()
        .filter(|p| p.delegate_id().is_some())
        .count();
    tracing::info!(
        "Assembled {} rules, {} pool delegates",
        config.rules.len(),
        delegates
    );

    let json = serde_json::to_string_pretty(&config)
        .map_err(|e| OffloadError::SerializationError(e.to_string()))?;

    match output {
        Some(path) => {
            let path = validate_output_path(path)?;
            std::fs::write(&path, json + "\n")
                .map_err(|e| OffloadError::IoError(format!("Write file: {}", e)))?;
            tracing::info!("Wrote {:?}", path);
        }
        None => println!("{}", json),
    }

    Ok(())
}

// =============================================================================
// INSPECT COMMAND
// =============================================================================

/// What the rewriter would do with one rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleReport {
    /// Block contributing the rule.
    pub block: String,
    /// Matcher source.
    pub test: String,
    /// Delegate identifier, when something is offloaded.
    pub id: Option<RuleId>,
    /// Steps that would run on the pool.
    pub eligible: Vec<Step>,
    /// Normalized chain before rewriting.
    pub before: Vec<Step>,
    /// Normalized chain after rewriting.
    pub after: Vec<Step>,
}

/// Report, per rule, what the rewriter would do.
///
/// Distinct rules sharing an identifier are logged as collisions.
pub fn inspect_rules(
    options: &RewriteOptions,
    rules: &[(&str, &CompilationRule)],
) -> Result<Vec<RuleReport>, OffloadError> {
    let rewriter = ChainRewriter::new(options)?;
    let mut reports = Vec::with_capacity(rules.len());
    let mut seen: BTreeMap<RuleId, &CompilationRule> = BTreeMap::new();

    for (block, rule) in rules {
        let before = ChainNormalizer::normalize(rule)?;
        let eligible = rewriter.pattern().filter(&before);
        let rewrite = rewriter.process(rule)?;
        let after = ChainNormalizer::normalize(&rewrite.rule)?;
        let id = rewrite.registration.map(|r| r.id);

        if let Some(id) = &id {
            let collides = seen.get(id).is_some_and(|previous| *previous != *rule);
            if collides {
                tracing::warn!("Identifier collision: {} names two different rules", id);
            } else {
                seen.insert(id.clone(), *rule);
            }
        }

        reports.push(RuleReport {
            block: (*block).to_string(),
            test: rule.test.source().to_string(),
            id,
            eligible,
            before,
            after,
        });
    }

    Ok(reports)
}

fn render_chain(chain: &[Step]) -> String {
    chain
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" → ")
}

/// Print what would be offloaded.
pub fn cmd_inspect(resolved: &Resolved, input: &Path, json_mode: bool) -> Result<(), OffloadError> {
    let file = BlockFile::load(&validate_file_path(input)?)?;
    let reports = inspect_rules(&resolved.options, &file.rules())?;

    if json_mode {
        let json = serde_json::to_string_pretty(&reports)
            .map_err(|e| OffloadError::SerializationError(e.to_string()))?;
        println!("{}", json);
        return Ok(());
    }

    if resolved.options.disable_all {
        println!("(offloading disabled: rules would be left untouched)");
    }
    println!("Pool size: {}", resolved.pool.size());
    for report in &reports {
        println!();
        println!("[{}] {}", report.block, report.test);
        match &report.id {
            Some(id) => {
                println!("  id:       {}", id);
                println!("  offload:  {}", render_chain(&report.eligible));
                println!("  before:   {}", render_chain(&report.before));
                println!("  after:    {}", render_chain(&report.after));
            }
            None => println!("  (no eligible steps)"),
        }
    }

    Ok(())
}

// =============================================================================
// ID COMMAND
// =============================================================================

/// Print the identifier of one rule.
pub fn cmd_id(resolved: &Resolved, input: &Path) -> Result<(), OffloadError> {
    let path = validate_file_path(input)?;
    let metadata = std::fs::metadata(&path)
        .map_err(|e| OffloadError::IoError(format!("Cannot read file metadata: {}", e)))?;
    if metadata.len() > MAX_RULE_FILE_SIZE {
        return Err(OffloadError::SerializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            MAX_RULE_FILE_SIZE
        )));
    }

    let bytes =
        std::fs::read(&path).map_err(|e| OffloadError::IoError(format!("Read file: {}", e)))?;
    let rule: CompilationRule = serde_json::from_slice(&bytes)
        .map_err(|e| OffloadError::SerializationError(e.to_string()))?;

    println!("{}", rule_id(&rule, resolved.options.identity)?);
    Ok(())
}
