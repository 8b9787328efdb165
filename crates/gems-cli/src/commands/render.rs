//! `render`: alert rule to native objects.

use std::io::Write;
use std::path::Path;

use gems_alerts::{AlertRule, CompilerOptions, to_native};

use crate::error::CliError;
use crate::output::OutputFormat;

use super::read_json;

/// Handler for the render command.
pub struct RenderCommand<'a> {
    options: &'a CompilerOptions,
}

impl<'a> RenderCommand<'a> {
    /// Creates a new render command handler.
    #[must_use]
    pub const fn new(options: &'a CompilerOptions) -> Self {
        Self { options }
    }

    /// Executes the render command.
    ///
    /// # Errors
    ///
    /// Returns error if the alert cannot be read or does not compile.
    pub fn execute<W: Write>(&self, out: &mut W, format: &OutputFormat, alert: &Path) -> Result<(), CliError> {
        let alert: AlertRule = read_json(alert, "alert rule")?;
        let native = to_native(&alert, &self.options.templates)?;
        format.write(out, &native)
    }
}
