//! Command-line argument parsing with clap.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};

/// GEMS alert compiler - translate between alert rules and native resources.
#[derive(Parser, Debug, Clone)]
#[command(name = "gems-alerts")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format.
    #[arg(short, long, global = true, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Compiler config file (JSON).
    #[arg(short, long, global = true, env = "GEMS_ALERTS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Compile a native snapshot into alert rules.
    Compile(CompileArgs),

    /// Render the native objects of one alert rule.
    Render {
        /// Alert rule file (JSON).
        #[arg(short, long)]
        alert: PathBuf,
    },

    /// Insert or replace an alert rule in a snapshot.
    Apply(ApplyArgs),

    /// Remove an alert rule from a snapshot.
    Remove(RemoveArgs),

    /// List the expression templates in effect.
    Templates,
}

/// Arguments for `compile`.
#[derive(Args, Debug, Clone)]
pub struct CompileArgs {
    /// Snapshot file (JSON).
    #[arg(short, long)]
    pub snapshot: PathBuf,

    /// Include references to the native objects.
    #[arg(long)]
    pub with_origin: bool,

    /// Evaluate silences at this time instead of now (RFC 3339).
    #[arg(long)]
    pub at: Option<DateTime<Utc>>,

    /// Fail if any alert does not compile.
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for `apply`.
#[derive(Args, Debug, Clone)]
pub struct ApplyArgs {
    /// Snapshot file (JSON); a missing file starts from an empty snapshot.
    #[arg(short, long)]
    pub snapshot: PathBuf,

    /// Alert rule file (JSON).
    #[arg(short, long)]
    pub alert: PathBuf,

    /// Write the result back to the snapshot file instead of printing it.
    #[arg(short, long)]
    pub write: bool,
}

/// Arguments for `remove`.
#[derive(Args, Debug, Clone)]
pub struct RemoveArgs {
    /// Snapshot file (JSON).
    #[arg(short, long)]
    pub snapshot: PathBuf,

    /// Namespace of the alert.
    #[arg(short, long)]
    pub namespace: String,

    /// Alert name.
    #[arg(long)]
    pub name: String,

    /// Write the result back to the snapshot file instead of printing it.
    #[arg(short, long)]
    pub write: bool,
}
