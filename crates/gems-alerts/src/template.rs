//! Expression templates keyed by resource and rule type.
//!
//! The engine only builds expressions; it never parses them. Verification of
//! stored rules compares against a freshly built expression with
//! insignificant whitespace ignored.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AlertError, Result};
use crate::types::CompareOp;

/// Placeholder replaced by the rendered label selector.
pub const SELECTOR_PLACEHOLDER: &str = "$selector";

/// One expression template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTemplate {
    /// Expression containing [`SELECTOR_PLACEHOLDER`].
    pub expr: String,
    /// Units accepted for the compared value; empty means unitless.
    #[serde(default)]
    pub units: Vec<String>,
}

impl RuleTemplate {
    fn new(expr: &str, units: &[&str]) -> Self {
        Self {
            expr: expr.to_string(),
            units: units.iter().map(|u| (*u).to_string()).collect(),
        }
    }
}

/// The closed set of templates the compiler recognizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, BTreeMap<String, RuleTemplate>>,
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        let defaults = [
            ("node", "statusCondition", RuleTemplate::new("kube_node_status_condition{$selector}", &[])),
            ("node", "cpuUsagePercent", RuleTemplate::new("gems_node_cpu_usage_percent{$selector}", &["percent"])),
            ("node", "memoryUsagePercent", RuleTemplate::new("gems_node_memory_usage_percent{$selector}", &["percent"])),
            ("node", "diskUsagePercent", RuleTemplate::new("gems_node_disk_usage_percent{$selector}", &["percent"])),
            ("container", "cpuUsageCore", RuleTemplate::new("gems_container_cpu_usage_cores{$selector}", &["core", "mcore"])),
            ("container", "memoryUsageBytes", RuleTemplate::new("gems_container_memory_usage_bytes{$selector}", &["B", "KB", "MB", "GB"])),
            ("pod", "restartTimesLast5m", RuleTemplate::new("increase(kube_pod_container_status_restarts_total{$selector}[5m])", &[])),
            ("pod", "statusPhase", RuleTemplate::new("kube_pod_status_phase{$selector}", &[])),
            ("pvc", "volumeUsagePercent", RuleTemplate::new("gems_pvc_usage_percent{$selector}", &["percent"])),
        ];
        for (resource, rule_type, template) in defaults {
            registry.insert(resource, rule_type, template);
        }
        registry
    }
}

impl TemplateRegistry {
    /// Creates a registry with no templates.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            templates: BTreeMap::new(),
        }
    }

    /// Registers or replaces a template.
    pub fn insert(
        &mut self,
        resource: impl Into<String>,
        rule_type: impl Into<String>,
        template: RuleTemplate,
    ) {
        self.templates
            .entry(resource.into())
            .or_default()
            .insert(rule_type.into(), template);
    }

    /// Adds every template of `other`, replacing duplicates.
    pub fn merge(&mut self, other: &Self) {
        for (resource, rule_type, template) in other.iter() {
            self.insert(resource, rule_type, template.clone());
        }
    }

    /// Looks up a template.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::UnknownTemplate` if none is registered.
    pub fn get(&self, resource: &str, rule_type: &str) -> Result<&RuleTemplate> {
        self.templates
            .get(resource)
            .and_then(|rules| rules.get(rule_type))
            .ok_or_else(|| AlertError::UnknownTemplate {
                resource: resource.to_string(),
                rule_type: rule_type.to_string(),
            })
    }

    /// Iterates `(resource, rule_type, template)` in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &RuleTemplate)> {
        self.templates.iter().flat_map(|(resource, rules)| {
            rules
                .iter()
                .map(move |(rule_type, t)| (resource.as_str(), rule_type.as_str(), t))
        })
    }

    /// Returns the number of templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.values().map(BTreeMap::len).sum()
    }

    /// Returns true if no template is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Builds the expression for a query.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::UnknownTemplate` for an unregistered rule type.
    pub fn build(
        &self,
        resource: &str,
        rule_type: &str,
        label_pairs: &BTreeMap<String, String>,
    ) -> Result<String> {
        let template = self.get(resource, rule_type)?;
        Ok(template.expr.replace(SELECTOR_PLACEHOLDER, &render_selector(label_pairs)))
    }

    /// Checks that a unit is accepted by the template.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::UnknownTemplate` for an unregistered rule type and
    /// `AlertError::InvalidRule` for a unit the template does not accept.
    pub fn check_unit(&self, resource: &str, rule_type: &str, unit: &str) -> Result<()> {
        let template = self.get(resource, rule_type)?;
        let accepted = if template.units.is_empty() {
            unit.is_empty()
        } else {
            unit.is_empty() || template.units.iter().any(|u| u == unit)
        };
        if accepted {
            Ok(())
        } else {
            Err(AlertError::invalid(format!(
                "unit {unit:?} is not accepted by {resource}.{rule_type}"
            )))
        }
    }
}

/// Renders label filters as `k=~"v", ...` in key order.
#[must_use]
pub fn render_selector(label_pairs: &BTreeMap<String, String>) -> String {
    label_pairs
        .iter()
        .map(|(k, v)| format!("{k}=~\"{}\"", escape(v)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Appends a comparison to an expression, as stored in rule entries.
#[must_use]
pub fn with_comparison(expr: &str, op: CompareOp, value: &str) -> String {
    format!("{expr} {op} {value}")
}

/// Removes a trailing `<op> <value>` from a stored expression if present.
#[must_use]
pub fn strip_comparison<'a>(stored: &'a str, op: CompareOp, value: &str) -> &'a str {
    let trimmed = stored.trim();
    trimmed
        .strip_suffix(value.trim())
        .map(str::trim_end)
        .and_then(|rest| rest.strip_suffix(op.as_symbol()))
        .map_or(trimmed, str::trim_end)
}

/// Drops whitespace outside double-quoted strings.
#[must_use]
pub fn normalize(expr: &str) -> String {
    let mut out = String::with_capacity(expr.len());
    let mut in_string = false;
    let mut escaped = false;
    for c in expr.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
            out.push(c);
        } else if !c.is_whitespace() {
            out.push(c);
        }
    }
    out
}

/// Compares two expressions ignoring insignificant whitespace.
#[must_use]
pub fn expressions_match(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> BTreeMap<String, String> {
        items
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn build_status_condition() {
        let registry = TemplateRegistry::default();
        let expr = registry
            .build(
                "node",
                "statusCondition",
                &pairs(&[("status", "true"), ("condition", "Ready")]),
            )
            .unwrap();
        assert_eq!(
            expr,
            r#"kube_node_status_condition{condition=~"Ready", status=~"true"}"#
        );
    }

    #[test]
    fn build_without_labels() {
        let registry = TemplateRegistry::default();
        let expr = registry
            .build("pod", "restartTimesLast5m", &BTreeMap::new())
            .unwrap();
        assert_eq!(expr, "increase(kube_pod_container_status_restarts_total{}[5m])");
    }

    #[test]
    fn build_escapes_quotes() {
        let registry = TemplateRegistry::default();
        let expr = registry
            .build("pod", "statusPhase", &pairs(&[("phase", r#"a"b\c"#)]))
            .unwrap();
        assert_eq!(expr, r#"kube_pod_status_phase{phase=~"a\"b\\c"}"#);
    }

    #[test]
    fn unknown_rule_type_fails() {
        let registry = TemplateRegistry::default();
        let err = registry.build("node", "bogus", &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, AlertError::UnknownTemplate { .. }));
    }

    #[test]
    fn merge_adds_and_replaces() {
        let mut registry = TemplateRegistry::default();
        let before = registry.len();
        let mut extra = TemplateRegistry::empty();
        extra.insert("gpu", "utilization", RuleTemplate::new("gpu_util{$selector}", &["percent"]));
        extra.insert("node", "statusCondition", RuleTemplate::new("custom{$selector}", &[]));
        registry.merge(&extra);

        assert_eq!(registry.len(), before + 1);
        assert_eq!(registry.get("node", "statusCondition").unwrap().expr, "custom{$selector}");
        assert!(registry.get("gpu", "utilization").is_ok());
    }

    #[test]
    fn registry_deserializes_nested_map() {
        let registry: TemplateRegistry = serde_json::from_str(
            r#"{"gpu": {"utilization": {"expr": "gpu_util{$selector}", "units": ["percent"]}}}"#,
        )
        .unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unit_checks() {
        let registry = TemplateRegistry::default();
        assert!(registry.check_unit("node", "cpuUsagePercent", "percent").is_ok());
        assert!(registry.check_unit("node", "cpuUsagePercent", "").is_ok());
        assert!(registry.check_unit("node", "cpuUsagePercent", "GB").is_err());
        assert!(registry.check_unit("node", "statusCondition", "").is_ok());
        assert!(registry.check_unit("node", "statusCondition", "percent").is_err());
    }

    #[test]
    fn whitespace_is_insignificant_outside_strings() {
        assert!(expressions_match(
            r#"kube_node_status_condition{condition=~"Ready", status=~"true"}"#,
            r#"kube_node_status_condition{ condition =~ "Ready",status=~"true" }"#,
        ));
        assert!(!expressions_match(r#"m{a=~"x y"}"#, r#"m{a=~"xy"}"#));
    }

    #[test]
    fn comparison_round_trip() {
        let stored = with_comparison("up{}", CompareOp::GreaterThanOrEqual, "5");
        assert_eq!(stored, "up{} >= 5");
        assert_eq!(strip_comparison(&stored, CompareOp::GreaterThanOrEqual, "5"), "up{}");
        assert_eq!(strip_comparison("up{}  ==0 ", CompareOp::Equal, "0"), "up{}");
        assert_eq!(strip_comparison("up{} > 1", CompareOp::Equal, "0"), "up{} > 1");
    }
}
