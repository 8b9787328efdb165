//! CLI error types.

use std::path::PathBuf;

use gems_alerts::{AggregateError, AlertError};
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// A file could not be read or written.
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Writing to stdout failed.
    #[error("output error: {0}")]
    Output(#[from] std::io::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// An input file is not valid JSON for its type.
    #[error("invalid {kind} in {}: {reason}", .path.display())]
    Parse {
        /// What the file should contain.
        kind: &'static str,
        /// The file involved.
        path: PathBuf,
        /// The parser's message.
        reason: String,
    },

    /// Compilation failed.
    #[error(transparent)]
    Compile(#[from] AlertError),

    /// Some alerts of a snapshot failed under `--strict`.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    /// Output formatting error.
    #[error("format error: {0}")]
    Format(String),
}
