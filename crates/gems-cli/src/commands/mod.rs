//! Command implementations.
//!
//! Every command reads its inputs from JSON files, runs the compiler and
//! writes the result through an [`OutputFormat`](crate::output::OutputFormat).

mod compile;
mod edit;
mod render;
mod templates;

use std::fs;
use std::path::{Path, PathBuf};

use gems_alerts::{CompilerConfig, CompilerOptions};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::CliError;

pub use compile::CompileCommand;
pub use edit::{ApplyCommand, RemoveCommand};
pub use render::RenderCommand;
pub use templates::TemplatesCommand;

/// Loads compiler options from an optional config file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_options(path: Option<&Path>) -> Result<CompilerOptions, CliError> {
    let Some(path) = path else {
        return Ok(CompilerOptions::default());
    };
    let text = read_file(path)?;
    let config = CompilerConfig::from_json(&text)
        .map_err(|e| CliError::Config(format!("{}: {e}", path.display())))?;
    debug!(path = %path.display(), "loaded compiler config");
    Ok(config.into_options())
}

/// Reads and parses a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not parse as `T`.
pub fn read_json<T: DeserializeOwned>(path: &Path, kind: &'static str) -> Result<T, CliError> {
    let text = read_file(path)?;
    serde_json::from_str(&text).map_err(|e| CliError::Parse {
        kind,
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Serializes a value as pretty JSON into a file.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<(), CliError> {
    let mut text = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
    text.push('\n');
    fs::write(path, text).map_err(|source| io_error(path, source))
}

fn read_file(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|source| io_error(path, source))
}

fn io_error(path: &Path, source: std::io::Error) -> CliError {
    CliError::Io {
        path: PathBuf::from(path),
        source,
    }
}
