//! `templates`: list the effective template registry.

use std::io::Write;

use gems_alerts::CompilerOptions;

use crate::error::CliError;
use crate::output::{OutputFormat, TemplateInfo, TemplateList};

/// Handler for the templates command.
pub struct TemplatesCommand<'a> {
    options: &'a CompilerOptions,
}

impl<'a> TemplatesCommand<'a> {
    /// Creates a new templates command handler.
    #[must_use]
    pub const fn new(options: &'a CompilerOptions) -> Self {
        Self { options }
    }

    /// Executes the templates command.
    ///
    /// # Errors
    ///
    /// Returns error if writing fails.
    pub fn execute<W: Write>(&self, out: &mut W, format: &OutputFormat) -> Result<(), CliError> {
        let list = TemplateList {
            templates: self
                .options
                .templates
                .iter()
                .map(|(resource, rule_type, template)| TemplateInfo {
                    resource: resource.to_string(),
                    rule_type: rule_type.to_string(),
                    expr: template.expr.clone(),
                    units: template.units.clone(),
                })
                .collect(),
        };
        format.write(out, &list)
    }
}
