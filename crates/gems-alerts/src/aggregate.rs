//! Groups native rule entries into logical alerts with ordered levels.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::codec;
use crate::error::{AlertError, Result};
use crate::native::{NativeRule, RuleSet};
use crate::template::{TemplateRegistry, expressions_match, strip_comparison, with_comparison};
use crate::types::{AlertLevel, QueryParams, Severity};

/// The rule entries sharing one `(namespace, alert name)`.
#[derive(Debug)]
pub struct AlertGroup<'a> {
    /// Namespace of the alert.
    pub namespace: String,
    /// Alert name.
    pub name: String,
    /// Index of the first rule group holding an entry.
    pub group_index: usize,
    /// Entries in declaration order.
    pub entries: Vec<&'a NativeRule>,
    /// First entry that could not even be identified.
    poisoned: Option<AlertError>,
}

/// A stored expression that differs from the one the template produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionMismatch {
    /// Namespace of the alert.
    pub namespace: String,
    /// Alert name.
    pub name: String,
    /// Severity of the differing entry.
    pub severity: Severity,
    /// Expression the template produces, if the template is known.
    pub expected: Option<String>,
    /// Expression found in the rule entry.
    pub stored: String,
}

/// The result of aggregating one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedAlert {
    /// Namespace of the alert.
    pub namespace: String,
    /// Alert name.
    pub name: String,
    /// Index of the first contributing rule group.
    pub group_index: usize,
    /// Shared pending duration.
    pub for_duration: String,
    /// Levels sorted ascending by severity.
    pub levels: Vec<AlertLevel>,
    /// Shared query parameters.
    pub params: QueryParams,
    /// Expression without comparison.
    pub expr: String,
    /// Entries whose stored expression was not the templated one.
    pub mismatches: Vec<ExpressionMismatch>,
}

/// Groups the alerting entries of a rule set by `(namespace, alert name)`.
///
/// Groups are returned in order of first appearance. Recording rules are
/// skipped. Entries without an alert-name label poison the group named by
/// their `alert` field.
#[must_use]
pub fn group_entries(rule_set: &RuleSet) -> Vec<AlertGroup<'_>> {
    let mut groups: Vec<AlertGroup<'_>> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for (group_index, group) in rule_set.groups.iter().enumerate() {
        for rule in group.rules.iter().filter(|r| r.is_alerting()) {
            let namespace = rule.namespace_or(&rule_set.namespace).to_string();
            let (name, poison) = match rule.alert_name() {
                Ok(name) => (name.to_string(), None),
                Err(e) => (rule.alert.clone(), Some(e)),
            };

            let slot = *index
                .entry((namespace.clone(), name.clone()))
                .or_insert_with(|| {
                    groups.push(AlertGroup {
                        namespace,
                        name,
                        group_index,
                        entries: Vec::new(),
                        poisoned: None,
                    });
                    groups.len() - 1
                });

            let target = &mut groups[slot];
            target.entries.push(rule);
            if target.poisoned.is_none() {
                target.poisoned = poison;
            }
        }
    }

    groups
}

/// Aggregates one group into an alert.
///
/// # Errors
///
/// - `AlertError::Decode` if an entry lacks a label or has a bad payload
/// - `AlertError::InconsistentQuery` if entries disagree on shared fields
/// - `AlertError::AmbiguousSeverity` if two entries share a severity
pub fn aggregate(
    group: AlertGroup<'_>,
    templates: &TemplateRegistry,
    verify_expressions: bool,
) -> Result<AggregatedAlert> {
    if let Some(err) = group.poisoned {
        return Err(err);
    }

    let mut shared: Option<(QueryParams, &str)> = None;
    let mut levels = Vec::with_capacity(group.entries.len());

    for rule in group.entries.iter().copied() {
        let decoded = codec::decode(rule.payload()?)?;
        let severity = rule.severity()?;

        if let Some((params, for_duration)) = &shared {
            if let Some(field) = first_difference(params, &decoded.params) {
                return Err(AlertError::InconsistentQuery {
                    alert: group.name.clone(),
                    reason: format!("{field} differs between levels"),
                });
            }
            if *for_duration != rule.for_duration {
                return Err(AlertError::InconsistentQuery {
                    alert: group.name.clone(),
                    reason: "for duration differs between levels".to_string(),
                });
            }
        } else {
            shared = Some((decoded.params.clone(), rule.for_duration.as_str()));
        }

        if levels.iter().any(|l: &AlertLevel| l.severity == severity) {
            return Err(AlertError::AmbiguousSeverity {
                alert: group.name.clone(),
                severity: severity.to_string(),
            });
        }
        levels.push(AlertLevel::new(decoded.compare_op, decoded.compare_value, severity));
    }

    let Some((params, for_duration)) = shared else {
        return Err(AlertError::decode(format!("alert {} has no rule entries", group.name)));
    };
    let for_duration = for_duration.to_string();

    // Entries and levels are pushed in lockstep, so sort them together.
    let mut pairs: Vec<(AlertLevel, &NativeRule)> = levels.into_iter().zip(group.entries).collect();
    pairs.sort_by_key(|(level, _)| level.severity);

    let canonical = match templates.build(&params.resource, &params.rule_type, &params.label_pairs) {
        Ok(expr) => Some(expr),
        Err(e) => {
            debug!(alert = %group.name, error = %e, "expression is not verifiable");
            None
        }
    };

    let mut mismatches = Vec::new();
    let mut expr = canonical.clone();
    for (index, (level, rule)) in pairs.iter().enumerate() {
        let matched = match &canonical {
            Some(c) if verify_expressions => expressions_match(
                &rule.expr,
                &with_comparison(c, level.compare_op, &level.compare_value),
            ),
            Some(_) => true,
            None => false,
        };
        if matched {
            continue;
        }

        warn!(
            namespace = %group.namespace,
            alert = %group.name,
            severity = %level.severity,
            stored = %rule.expr,
            "stored expression differs from template"
        );
        // Only the lowest severity's stored text replaces the template.
        if index == 0 {
            expr = Some(
                strip_comparison(&rule.expr, level.compare_op, &level.compare_value).to_string(),
            );
        }
        mismatches.push(ExpressionMismatch {
            namespace: group.namespace.clone(),
            name: group.name.clone(),
            severity: level.severity,
            expected: canonical
                .as_deref()
                .map(|c| with_comparison(c, level.compare_op, &level.compare_value)),
            stored: rule.expr.clone(),
        });
    }

    Ok(AggregatedAlert {
        namespace: group.namespace,
        name: group.name,
        group_index: group.group_index,
        for_duration,
        levels: pairs.into_iter().map(|(level, _)| level).collect(),
        params,
        expr: expr.unwrap_or_default(),
        mismatches,
    })
}

fn first_difference(a: &QueryParams, b: &QueryParams) -> Option<&'static str> {
    if a.resource != b.resource {
        Some("resource")
    } else if a.rule_type != b.rule_type {
        Some("rule")
    } else if a.unit != b.unit {
        Some("unit")
    } else if a.label_pairs != b.label_pairs {
        Some("labelpairs")
    } else {
        None
    }
}
