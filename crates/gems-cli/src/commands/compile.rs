//! `compile`: native snapshot to alert rules.

use std::io::Write;

use gems_alerts::{AlertCompiler, AlertSnapshot, CompilerOptions};
use tracing::info;

use crate::cli::CompileArgs;
use crate::error::CliError;
use crate::output::{AlertView, CompileReport, FailedAlert, OutputFormat};

use super::read_json;

/// Handler for the compile command.
pub struct CompileCommand<'a> {
    options: &'a CompilerOptions,
}

impl<'a> CompileCommand<'a> {
    /// Creates a new compile command handler.
    #[must_use]
    pub const fn new(options: &'a CompilerOptions) -> Self {
        Self { options }
    }

    /// Executes the compile command.
    ///
    /// # Errors
    ///
    /// Returns error if the snapshot cannot be read, or under `--strict` if
    /// any alert fails to compile.
    pub fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &CompileArgs,
    ) -> Result<(), CliError> {
        let snapshot: AlertSnapshot = read_json(&args.snapshot, "snapshot")?;
        let mut compiler = AlertCompiler::new(&snapshot, self.options);
        if let Some(at) = args.at {
            compiler = compiler.at(at);
        }
        let output = compiler.to_alerts(args.with_origin);
        info!(
            alerts = output.alerts.len(),
            failed = output.error.as_ref().map_or(0, gems_alerts::AggregateError::len),
            mismatches = output.mismatches.len(),
            "compiled snapshot"
        );

        if args.strict {
            if let Some(err) = output.error {
                return Err(err.into());
            }
        }

        let failed = output
            .error
            .as_ref()
            .map(|err| {
                err.errors()
                    .iter()
                    .map(|e| FailedAlert {
                        namespace: e.namespace.clone(),
                        name: e.name.clone(),
                        error: e.source.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        let report = CompileReport {
            alerts: output.alerts.into_iter().map(AlertView::from).collect(),
            failed,
            mismatches: output.mismatches,
        };
        format.write(out, &report)
    }
}
