//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::io::Write;

use gems_alerts::{AlertOrigin, AlertRule, AlertSnapshot, ExpressionMismatch, NativeAlert};
use serde::Serialize;

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Get the current format.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    /// Check if JSON format is selected.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, Format::Json)
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => write_json(writer, value)?,
            Format::Table => value.write_table(writer)?,
        }
        Ok(())
    }

    /// Write a serializable value to a string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_string<T>(&self, value: &T) -> Result<String, CliError>
    where
        T: Serialize + TableDisplay,
    {
        let mut buf = Vec::new();
        self.write(&mut buf, value)?;
        String::from_utf8(buf).map_err(|e| CliError::Format(format!("UTF-8 error: {e}")))
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Table)
    }
}

/// Writes pretty JSON followed by a newline.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_json<W: Write, T: Serialize + ?Sized>(writer: &mut W, value: &T) -> Result<(), CliError> {
    serde_json::to_writer_pretty(&mut *writer, value)
        .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
    writeln!(writer)?;
    Ok(())
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

/// One compiled alert with its optional origin.
#[derive(Debug, Clone, Serialize)]
pub struct AlertView {
    /// The compiled alert.
    #[serde(flatten)]
    pub alert: AlertRule,
    /// Native objects the alert came from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<AlertOrigin>,
}

impl From<AlertRule> for AlertView {
    fn from(mut alert: AlertRule) -> Self {
        let origin = alert.origin.take();
        Self { alert, origin }
    }
}

/// An alert that failed to compile.
#[derive(Debug, Clone, Serialize)]
pub struct FailedAlert {
    /// Namespace of the alert.
    pub namespace: String,
    /// Alert name.
    pub name: String,
    /// Why it failed.
    pub error: String,
}

/// Result of the `compile` command.
#[derive(Debug, Clone, Serialize)]
pub struct CompileReport {
    /// Alerts that compiled.
    pub alerts: Vec<AlertView>,
    /// Alerts that failed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<FailedAlert>,
    /// Stored expressions differing from their templates.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mismatches: Vec<ExpressionMismatch>,
}

impl TableDisplay for CompileReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.alerts.is_empty() {
            writeln!(writer, "No alerts found.")?;
        } else {
            writeln!(
                writer,
                "{:<24} {:<28} {:<8} {:<6} {:<6} {:<24} LEVELS",
                "NAMESPACE", "NAME", "FOR", "OPEN", "MUTE", "RECEIVERS"
            )?;
            writeln!(writer, "{}", "─".repeat(110))?;
            for view in &self.alerts {
                let alert = &view.alert;
                let receivers = alert
                    .receivers
                    .iter()
                    .map(|r| r.name.as_str())
                    .collect::<Vec<_>>()
                    .join(",");
                let levels = alert
                    .alert_levels
                    .iter()
                    .map(|l| format!("{}:{}{}", l.severity, l.compare_op, l.compare_value))
                    .collect::<Vec<_>>()
                    .join(" ");
                writeln!(
                    writer,
                    "{:<24} {:<28} {:<8} {:<6} {:<6} {:<24} {}",
                    truncate(&alert.namespace, 24),
                    truncate(&alert.name, 28),
                    alert.for_duration,
                    yes_no(alert.is_open),
                    yes_no(alert.mute),
                    truncate(if receivers.is_empty() { "-" } else { &receivers }, 24),
                    levels
                )?;
            }
        }

        if !self.failed.is_empty() {
            writeln!(writer)?;
            writeln!(writer, "Failed ({})", self.failed.len())?;
            for failed in &self.failed {
                writeln!(writer, "  {}/{}: {}", failed.namespace, failed.name, failed.error)?;
            }
        }

        if !self.mismatches.is_empty() {
            writeln!(writer)?;
            writeln!(writer, "Expression mismatches ({})", self.mismatches.len())?;
            for m in &self.mismatches {
                writeln!(writer, "  {}/{} [{}]", m.namespace, m.name, m.severity)?;
                writeln!(writer, "    stored:   {}", m.stored)?;
                writeln!(
                    writer,
                    "    expected: {}",
                    m.expected.as_deref().unwrap_or("(no template)")
                )?;
            }
        }
        Ok(())
    }
}

impl TableDisplay for NativeAlert {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Alert: {}/{}", self.namespace, self.name)?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Rules")?;
        for rule in &self.group.rules {
            let severity = rule.labels.get("severity").map_or("-", String::as_str);
            writeln!(writer, "  [{severity}] for {}: {}", rule.for_duration, rule.expr)?;
        }
        writeln!(writer)?;
        writeln!(writer, "Routes")?;
        for route in &self.routes {
            let receiver = route.receiver.as_deref().unwrap_or("-");
            let suffix = if route.continue_matching { " (continue)" } else { "" };
            writeln!(writer, "  -> {receiver}{suffix}")?;
        }
        if !self.inhibit_rules.is_empty() {
            writeln!(writer)?;
            writeln!(writer, "Inhibit rules: {}", self.inhibit_rules.len())?;
        }
        Ok(())
    }
}

impl TableDisplay for AlertSnapshot {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        let rules: usize = self.rules.groups.iter().map(|g| g.rules.len()).sum();
        writeln!(writer, "Snapshot: {}/{}", self.rules.namespace, self.rules.name)?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Rule groups:    {}", self.rules.groups.len())?;
        writeln!(writer, "Rule entries:   {rules}")?;
        match &self.routing {
            Some(routing) => {
                writeln!(writer, "Routes:         {}", routing.route.routes.len())?;
                writeln!(writer, "Receivers:      {}", routing.receivers.len())?;
                writeln!(writer, "Inhibit rules:  {}", routing.inhibit_rules.len())?;
            }
            None => writeln!(writer, "Routing:        (none)")?,
        }
        writeln!(writer, "Silences:       {}", self.silences.len())?;
        Ok(())
    }
}

/// Registered expression template.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateInfo {
    /// Resource kind.
    pub resource: String,
    /// Rule type.
    pub rule_type: String,
    /// Expression with `$selector` placeholder.
    pub expr: String,
    /// Accepted units; empty means unitless.
    pub units: Vec<String>,
}

/// List of templates.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateList {
    /// Templates in resource, rule type order.
    pub templates: Vec<TemplateInfo>,
}

impl TableDisplay for TemplateList {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "{:<12} {:<22} {:<16} EXPRESSION", "RESOURCE", "RULE TYPE", "UNITS")?;
        writeln!(writer, "{}", "─".repeat(100))?;
        for t in &self.templates {
            let units = if t.units.is_empty() {
                "-".to_string()
            } else {
                t.units.join(",")
            };
            writeln!(writer, "{:<12} {:<22} {:<16} {}", t.resource, t.rule_type, units, t.expr)?;
        }
        Ok(())
    }
}

const fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

/// Truncate a string to the given length, adding "..." if truncated.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
