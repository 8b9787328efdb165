//! # gems-cli
//!
//! Command-line front end for the `gems-alerts` compiler.
//!
//! Provides commands for:
//! - Compiling a native snapshot into alert rules
//! - Rendering the native objects of one alert rule
//! - Applying or removing an alert rule in a snapshot file
//! - Listing the expression templates in effect
//!
//! Snapshots and alert rules are exchanged as JSON files; the cluster
//! read/write itself happens outside this tool.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::{Cli, Commands, Format};
pub use error::CliError;
pub use output::OutputFormat;
