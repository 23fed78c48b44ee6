//! # Offload
//!
//! Command-line front end for `offload-core`.
//!
//! - [`config`]: layered settings (file, environment, flags)
//! - [`blocks`]: JSON block files
//! - [`cli`]: commands

pub mod blocks;
pub mod cli;
pub mod config;
