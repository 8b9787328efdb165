//! `apply` and `remove`: edit an alert inside a snapshot file.
//!
//! Without `--write` the edited snapshot is printed as JSON so it can be
//! piped; with `--write` the file is replaced and a summary is printed.

use std::io::Write;
use std::path::Path;

use gems_alerts::{AlertRule, AlertSnapshot, CompilerOptions, to_native};
use tracing::{info, warn};

use crate::cli::{ApplyArgs, RemoveArgs};
use crate::error::CliError;
use crate::output::{OutputFormat, write_json};

use super::{read_json, write_json_file};

/// Handler for the apply command.
pub struct ApplyCommand<'a> {
    options: &'a CompilerOptions,
}

impl<'a> ApplyCommand<'a> {
    /// Creates a new apply command handler.
    #[must_use]
    pub const fn new(options: &'a CompilerOptions) -> Self {
        Self { options }
    }

    /// Executes the apply command.
    ///
    /// # Errors
    ///
    /// Returns error if an input cannot be read, or the alert does not
    /// compile or fit the snapshot.
    pub fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &ApplyArgs,
    ) -> Result<(), CliError> {
        let mut snapshot = if args.snapshot.exists() {
            read_json(&args.snapshot, "snapshot")?
        } else {
            AlertSnapshot::default()
        };
        let alert: AlertRule = read_json(&args.alert, "alert rule")?;

        let native = to_native(&alert, &self.options.templates)?;
        snapshot.upsert_in_place(native)?;
        info!(namespace = %alert.namespace, alert = %alert.name, "applied alert");

        finish(out, format, &args.snapshot, args.write, &snapshot)
    }
}

/// Handler for the remove command.
pub struct RemoveCommand;

impl RemoveCommand {
    /// Executes the remove command.
    ///
    /// # Errors
    ///
    /// Returns error if the snapshot cannot be read or written.
    pub fn execute<W: Write>(
        out: &mut W,
        format: &OutputFormat,
        args: &RemoveArgs,
    ) -> Result<(), CliError> {
        let mut snapshot: AlertSnapshot = read_json(&args.snapshot, "snapshot")?;
        if snapshot.remove_alert(&args.namespace, &args.name) {
            info!(namespace = %args.namespace, alert = %args.name, "removed alert");
        } else {
            warn!(namespace = %args.namespace, alert = %args.name, "alert not found");
        }
        finish(out, format, &args.snapshot, args.write, &snapshot)
    }
}

fn finish<W: Write>(
    out: &mut W,
    format: &OutputFormat,
    path: &Path,
    write: bool,
    snapshot: &AlertSnapshot,
) -> Result<(), CliError> {
    if write {
        write_json_file(path, snapshot)?;
        format.write(out, snapshot)
    } else {
        write_json(out, snapshot)
    }
}
