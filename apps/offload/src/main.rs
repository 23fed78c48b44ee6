//! # Offload
//!
//! Command-line front end for the offload rule-rewriting engine.
//!
//! ## Usage
//!
//! ```bash
//! # Rewrite a block file, printing the configuration
//! offload rewrite -i blocks.json
//!
//! # Same, with settings and an extra eligible prefix
//! offload -c offload.toml --prefix ts-loader rewrite -i blocks.json -o config.json
//!
//! # Show what would be offloaded
//! offload inspect -i blocks.json
//! ```

use clap::Parser;
use offload::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = cli::Cli::parse();

    // OFFLOAD_LOG_FORMAT=json enables machine-parseable output.
    // Logs go to stderr; stdout carries the configuration.
    let log_format = std::env::var("OFFLOAD_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let default_filter = if cli.verbose {
        "offload=debug,offload_core=debug"
    } else {
        "offload=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
