//! # Offload CLI Module
//!
//! This module implements the CLI interface for Offload.
//!
//! ## Available Commands
//!
//! - `rewrite` - Assemble a block file with eligible steps moved to the worker pool
//! - `inspect` - Show, per rule, the identifier and the steps that would be offloaded
//! - `id` - Print the identifier of a single rule

mod commands;

use crate::config::{EnvFlags, Overrides, Settings};
use clap::{Parser, Subcommand};
use offload_core::OffloadError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Offload - run eligible build steps on a shared worker pool
///
/// Reads a sequence of configuration blocks and rewrites their compilation
/// rules so that matching steps go through one pool delegate per rule.
#[derive(Parser, Debug)]
#[command(name = "offload")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a TOML settings file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Step-name prefix to offload (repeatable; replaces the configured list)
    #[arg(long = "prefix", global = true)]
    pub prefixes: Vec<String>,

    /// Leave every block untouched
    #[arg(long, global = true)]
    pub disable: bool,

    /// Turn the worker-pool cache off
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Bust the worker-pool cache with a fresh token
    #[arg(long, global = true)]
    pub refresh: bool,

    /// Number of pool workers
    #[arg(long, global = true)]
    pub pool_size: Option<usize>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Assemble a block file and write the rewritten configuration
    Rewrite {
        /// Path to the block file (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show what would be offloaded, rule by rule
    Inspect {
        /// Path to the block file (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print the identifier of one rule
    Id {
        /// Path to a file holding one rule (JSON)
        #[arg(short, long)]
        input: PathBuf,
    },
}

impl Cli {
    /// The command-line flags that override settings.
    #[must_use]
    pub fn overrides(&self) -> Overrides {
        Overrides {
            prefixes: self.prefixes.clone(),
            disable: self.disable,
            no_cache: self.no_cache,
            refresh: self.refresh,
            pool_size: self.pool_size,
        }
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), OffloadError> {
    let env = EnvFlags::from_process()?;
    let resolved = Settings::load(cli.config.as_deref())?
        .with_overrides(&cli.overrides())
        .resolve(&env)?;

    match cli.command {
        Commands::Rewrite { input, output } => cmd_rewrite(&resolved, &input, output.as_deref()),
        Commands::Inspect { input, json } => cmd_inspect(&resolved, &input, json),
        Commands::Id { input } => cmd_id(&resolved, &input),
    }
}
