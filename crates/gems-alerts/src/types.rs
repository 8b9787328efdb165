//! Core domain types for the alert rule compiler.
//!
//! This module provides the normalized model served to the API layer:
//! - [`Severity`]: ordered alert urgency
//! - [`CompareOp`]: threshold comparison operators
//! - [`QueryParams`]: the structured query a rule is generated from
//! - [`AlertLevel`]: one threshold of an alert
//! - [`AlertRule`]: a logical alert aggregated over all its levels
//!
//! It also holds the wire constants shared with the native resources.

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AlertError, Result};

/// Label carrying the logical alert name.
pub const ALERT_NAME_LABEL: &str = "gems_alertname";

/// Label carrying the namespace the alert belongs to.
pub const ALERT_NAMESPACE_LABEL: &str = "gems_namespace";

/// Label carrying the severity of one rule entry.
pub const SEVERITY_LABEL: &str = "severity";

/// Annotation key holding the encoded query parameters.
pub const EXPR_JSON_ANNOTATION: &str = "gems_expr_json";

/// Receiver name reserved for "alert disabled".
pub const NULL_RECEIVER_NAME: &str = "null";

/// Namespace holding cluster-wide alerts.
pub const GLOBAL_ALERT_NAMESPACE: &str = "gemcloud-monitoring-system";

static DURATION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+y)?(\d+w)?(\d+d)?(\d+h)?(\d+m)?(\d+s)?(\d+ms)?$")
        .unwrap_or_else(|_| unreachable!())
});

/// The severity of one alert level.
///
/// Variants are declared in ascending rank, so the derived ordering is the
/// display order of [`AlertRule::alert_levels`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Should be investigated.
    Warning,
    /// Something is broken.
    Error,
    /// Requires immediate attention.
    Critical,
}

impl Severity {
    /// All severities in ascending rank.
    pub const ALL: [Self; 3] = [Self::Warning, Self::Error, Self::Critical];

    /// Returns the severity as its label value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }

    /// Returns the rank of this severity (higher = more urgent).
    #[must_use]
    pub const fn rank(&self) -> u8 {
        match self {
            Self::Warning => 1,
            Self::Error => 2,
            Self::Critical => 3,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|sev| sev.as_str() == s)
            .ok_or_else(|| AlertError::decode(format!("unknown severity {s:?}")))
    }
}

/// Comparison operators applied to a query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    /// Equal (==).
    #[serde(rename = "==")]
    Equal,
    /// Not equal (!=).
    #[serde(rename = "!=")]
    NotEqual,
    /// Greater than (>).
    #[serde(rename = ">")]
    GreaterThan,
    /// Greater than or equal (>=).
    #[serde(rename = ">=")]
    GreaterThanOrEqual,
    /// Less than (<).
    #[serde(rename = "<")]
    LessThan,
    /// Less than or equal (<=).
    #[serde(rename = "<=")]
    LessThanOrEqual,
}

impl CompareOp {
    /// All operators.
    pub const ALL: [Self; 6] = [
        Self::Equal,
        Self::NotEqual,
        Self::GreaterThan,
        Self::GreaterThanOrEqual,
        Self::LessThan,
        Self::LessThanOrEqual,
    ];

    /// Returns the operator as it appears in an expression.
    #[must_use]
    pub const fn as_symbol(&self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_symbol())
    }
}

impl FromStr for CompareOp {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_symbol() == s)
            .ok_or_else(|| AlertError::decode(format!("unknown compare operator {s:?}")))
    }
}

/// The structured query an alert expression is generated from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParams {
    /// Monitored resource kind, e.g. `node`.
    pub resource: String,
    /// Rule type within the resource, e.g. `statusCondition`.
    #[serde(rename = "rule")]
    pub rule_type: String,
    /// Display unit of the compared value; may be empty.
    #[serde(default)]
    pub unit: String,
    /// Label filters applied to the metric.
    #[serde(rename = "labelpairs", default)]
    pub label_pairs: BTreeMap<String, String>,
}

impl QueryParams {
    /// Creates query params without unit or label filters.
    pub fn new(resource: impl Into<String>, rule_type: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            rule_type: rule_type.into(),
            ..Self::default()
        }
    }

    /// Sets the unit.
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Adds a label filter.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.label_pairs.insert(key.into(), value.into());
        self
    }
}

/// One threshold of an alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertLevel {
    /// How the query result is compared.
    pub compare_op: CompareOp,
    /// The value compared against, kept verbatim.
    pub compare_value: String,
    /// The severity raised when the comparison holds.
    pub severity: Severity,
}

impl AlertLevel {
    /// Creates a new alert level.
    pub fn new(compare_op: CompareOp, compare_value: impl Into<String>, severity: Severity) -> Self {
        Self {
            compare_op,
            compare_value: compare_value.into(),
            severity,
        }
    }
}

/// A named notification destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertReceiver {
    /// The receiver name referenced from the routing tree.
    pub name: String,
}

impl AlertReceiver {
    /// Creates a receiver reference.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// References to the native objects an alert was compiled from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertOrigin {
    /// `namespace/name` of the rule set holding the group.
    pub rule_set: String,
    /// Index of the first rule group contributing to the alert.
    pub group_index: usize,
    /// Index paths of the nested routes that resolved the receivers.
    pub route_paths: Vec<Vec<usize>>,
    /// Id of the silence muting the alert, if any.
    pub silence_id: Option<String>,
}

/// A logical alert aggregated from all of its native rule entries.
///
/// Recomputed on every read; the native objects stay authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    /// Namespace of the alert.
    pub namespace: String,
    /// Alert name, unique within the namespace.
    pub name: String,
    /// How long the condition must hold before firing, e.g. `1m`.
    #[serde(rename = "for")]
    pub for_duration: String,
    /// Thresholds sorted ascending by severity rank.
    pub alert_levels: Vec<AlertLevel>,
    /// Receivers notified; empty iff the alert is closed.
    #[serde(default)]
    pub receivers: Vec<AlertReceiver>,
    /// Whether notifications are routed anywhere.
    pub is_open: bool,
    /// Whether an active silence covers the alert.
    #[serde(default)]
    pub mute: bool,
    /// The structured query shared by all levels.
    #[serde(flatten)]
    pub query_params: QueryParams,
    /// The templated expression without its comparison.
    #[serde(default)]
    pub expr: String,
    /// Source references, never serialized with the alert.
    #[serde(skip)]
    pub origin: Option<AlertOrigin>,
}

impl AlertRule {
    /// Maximum allowed length for alert names.
    pub const MAX_NAME_LENGTH: usize = 253;

    /// Returns the labels identifying this alert to routes and silences.
    #[must_use]
    pub fn identity_labels(&self) -> BTreeMap<String, String> {
        identity_labels(&self.namespace, &self.name)
    }

    /// Returns a copy with origin references stripped.
    #[must_use]
    pub fn without_origin(mut self) -> Self {
        self.origin = None;
        self
    }

    /// Returns the most urgent level.
    #[must_use]
    pub fn highest_level(&self) -> Option<&AlertLevel> {
        self.alert_levels.iter().max_by_key(|level| level.severity)
    }

    /// Checks the invariants required before writing the alert back.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidRule` if:
    /// - The name or namespace is empty, or the name is too long
    /// - There are no levels, or two levels share a severity
    /// - The `for` duration is not a Prometheus duration
    /// - The receivers disagree with `is_open`, or a receiver is listed twice
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(AlertError::invalid("alert name cannot be empty"));
        }
        if self.name.len() > Self::MAX_NAME_LENGTH {
            return Err(AlertError::invalid(format!(
                "alert name exceeds maximum length of {} characters",
                Self::MAX_NAME_LENGTH
            )));
        }
        if self.namespace.is_empty() {
            return Err(AlertError::invalid("alert namespace cannot be empty"));
        }
        if self.alert_levels.is_empty() {
            return Err(AlertError::invalid("alert needs at least one level"));
        }

        let mut seen = HashSet::new();
        for level in &self.alert_levels {
            if !seen.insert(level.severity) {
                return Err(AlertError::invalid(format!(
                    "severity {} is used by more than one level",
                    level.severity
                )));
            }
            if level.compare_value.trim().is_empty() {
                return Err(AlertError::invalid("compare value cannot be empty"));
            }
        }

        if !is_valid_duration(&self.for_duration) {
            return Err(AlertError::invalid(format!(
                "invalid for duration {:?}",
                self.for_duration
            )));
        }

        if self.is_open && self.receivers.is_empty() {
            return Err(AlertError::invalid("open alert needs at least one receiver"));
        }
        if !self.is_open && !self.receivers.is_empty() {
            return Err(AlertError::invalid("closed alert cannot have receivers"));
        }
        if self.receivers.iter().any(|r| r.name == NULL_RECEIVER_NAME || r.name.is_empty()) {
            return Err(AlertError::invalid(format!(
                "receiver name cannot be empty or {NULL_RECEIVER_NAME:?}"
            )));
        }
        let mut names = HashSet::new();
        for receiver in &self.receivers {
            if !names.insert(receiver.name.as_str()) {
                return Err(AlertError::invalid(format!(
                    "receiver {} is listed more than once",
                    receiver.name
                )));
            }
        }

        Ok(())
    }
}

/// Builds the label set identifying an alert.
#[must_use]
pub fn identity_labels(namespace: &str, name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (ALERT_NAME_LABEL.to_string(), name.to_string()),
        (ALERT_NAMESPACE_LABEL.to_string(), namespace.to_string()),
    ])
}

/// Returns true if `s` is a non-empty Prometheus duration like `1m` or `1h30m`.
#[must_use]
pub fn is_valid_duration(s: &str) -> bool {
    !s.is_empty() && DURATION_REGEX.is_match(s)
}
