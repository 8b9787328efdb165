//! Native alerting resources as supplied by the cluster collaborator.
//!
//! These mirror the Prometheus operator `PrometheusRule` and
//! `AlertmanagerConfig` objects and the Alertmanager silence API, already
//! deserialized. The compiler only reads them; [`AlertSnapshot::upsert`]
//! edits a snapshot the caller then writes back.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AlertError, Result};
use crate::types::{
    ALERT_NAME_LABEL, ALERT_NAMESPACE_LABEL, EXPR_JSON_ANNOTATION, NULL_RECEIVER_NAME,
    SEVERITY_LABEL, Severity,
};

/// A set of rule groups stored in one namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Object name.
    pub name: String,
    /// Object namespace.
    pub namespace: String,
    /// Rule groups in declaration order.
    #[serde(default)]
    pub groups: Vec<RuleGroup>,
}

/// A named group of rule entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleGroup {
    /// Group name; equal to the alert name for groups we generate.
    pub name: String,
    /// Rule entries.
    #[serde(default)]
    pub rules: Vec<NativeRule>,
}

/// One alerting (or recording) rule entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeRule {
    /// Alert name; empty for recording rules.
    #[serde(default)]
    pub alert: String,
    /// The full expression including its comparison.
    pub expr: String,
    /// Pending duration.
    #[serde(rename = "for", default)]
    pub for_duration: String,
    /// Rule labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Rule annotations.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl NativeRule {
    /// Returns true if this entry defines an alert rather than a recording.
    #[must_use]
    pub fn is_alerting(&self) -> bool {
        !self.alert.is_empty()
    }

    /// Returns the logical alert name label.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::Decode` if the label is missing or empty.
    pub fn alert_name(&self) -> Result<&str> {
        self.required_label(ALERT_NAME_LABEL)
    }

    /// Returns the namespace label, falling back to `default`.
    #[must_use]
    pub fn namespace_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.labels
            .get(ALERT_NAMESPACE_LABEL)
            .map(String::as_str)
            .filter(|ns| !ns.is_empty())
            .unwrap_or(default)
    }

    /// Returns the parsed severity label.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::Decode` if the label is missing or unknown.
    pub fn severity(&self) -> Result<Severity> {
        self.required_label(SEVERITY_LABEL)?.parse()
    }

    /// Returns the raw query-param payload annotation.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::Decode` if the annotation is missing.
    pub fn payload(&self) -> Result<&str> {
        self.annotations
            .get(EXPR_JSON_ANNOTATION)
            .map(String::as_str)
            .ok_or_else(|| AlertError::decode(format!("missing annotation {EXPR_JSON_ANNOTATION}")))
    }

    fn required_label(&self, key: &str) -> Result<&str> {
        match self.labels.get(key) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(AlertError::decode(format!("missing label {key}"))),
        }
    }
}

/// How a matcher compares a label value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchType {
    /// Exact equality.
    #[default]
    #[serde(rename = "=")]
    Equal,
    /// Exact inequality.
    #[serde(rename = "!=")]
    NotEqual,
    /// Anchored regular expression.
    #[serde(rename = "=~")]
    Regex,
    /// Negated anchored regular expression.
    #[serde(rename = "!~")]
    NotRegex,
}

/// A single label constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Matcher {
    /// Label name.
    pub name: String,
    /// Expected value or pattern.
    #[serde(default)]
    pub value: String,
    /// Comparison kind.
    #[serde(default)]
    pub match_type: MatchType,
}

impl Matcher {
    /// Creates an equality matcher.
    pub fn equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            match_type: MatchType::Equal,
        }
    }

    /// Creates a regex matcher.
    pub fn regex(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: pattern.into(),
            match_type: MatchType::Regex,
        }
    }

    /// Compiles the pattern of a regex matcher once for repeated use.
    #[must_use]
    pub fn compile(&self) -> CompiledMatcher {
        let regex = match self.match_type {
            MatchType::Equal | MatchType::NotEqual => None,
            MatchType::Regex | MatchType::NotRegex => {
                Regex::new(&format!("^(?:{})$", self.value)).ok()
            }
        };
        CompiledMatcher {
            matcher: self.clone(),
            regex,
        }
    }

    /// Checks the matcher against a label set. Absent labels read as empty.
    ///
    /// An invalid regex never matches. Compiles the pattern on every call;
    /// use [`Matcher::compile`] when matching many label sets.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.compile().matches(labels)
    }
}

/// A [`Matcher`] with its regex, if any, compiled.
#[derive(Debug, Clone)]
pub struct CompiledMatcher {
    matcher: Matcher,
    regex: Option<Regex>,
}

impl CompiledMatcher {
    /// Returns the matcher this was compiled from.
    #[must_use]
    pub const fn source(&self) -> &Matcher {
        &self.matcher
    }

    /// Checks the matcher against a label set. Absent labels read as empty.
    ///
    /// An invalid regex never matches, negated or not.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let actual = labels.get(&self.matcher.name).map_or("", String::as_str);
        match self.matcher.match_type {
            MatchType::Equal => actual == self.matcher.value,
            MatchType::NotEqual => actual != self.matcher.value,
            MatchType::Regex => self.regex.as_ref().is_some_and(|re| re.is_match(actual)),
            MatchType::NotRegex => self.regex.as_ref().is_some_and(|re| !re.is_match(actual)),
        }
    }
}

// Equality ignores the compiled regex.
impl PartialEq for CompiledMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.matcher == other.matcher
    }
}

impl Eq for CompiledMatcher {}

/// A notification route as stored in the routing config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Receiver name; nested routes inherit the parent's when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    /// AND-combined matchers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matchers: Vec<Matcher>,
    /// Nested routes in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
    /// Keep matching later siblings after this route matched.
    #[serde(default, rename = "continue", skip_serializing_if = "std::ops::Not::not")]
    pub continue_matching: bool,
}

/// A receiver declared in the routing config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receiver {
    /// Receiver name.
    pub name: String,
    /// Opaque receiver settings (webhook, email, ...).
    #[serde(flatten)]
    pub config: BTreeMap<String, serde_json::Value>,
}

impl Receiver {
    /// The receiver every config declares for disabled alerts.
    #[must_use]
    pub fn null() -> Self {
        Self {
            name: NULL_RECEIVER_NAME.to_string(),
            config: BTreeMap::new(),
        }
    }
}

/// Mutes target alerts while a matching source alert fires.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InhibitRule {
    /// Matchers selecting the inhibiting alerts.
    #[serde(default)]
    pub source_match: Vec<Matcher>,
    /// Matchers selecting the inhibited alerts.
    #[serde(default)]
    pub target_match: Vec<Matcher>,
    /// Labels that must be equal on source and target.
    #[serde(default)]
    pub equal: Vec<String>,
}

/// The notification routing config of a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingConfig {
    /// Object name.
    pub name: String,
    /// Object namespace.
    pub namespace: String,
    /// Root route.
    pub route: Route,
    /// Declared receivers.
    #[serde(default)]
    pub receivers: Vec<Receiver>,
    /// Inhibit rules.
    #[serde(default)]
    pub inhibit_rules: Vec<InhibitRule>,
}

impl RoutingConfig {
    /// Creates a config routing everything to the sentinel receiver.
    pub fn disabled(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            route: Route {
                receiver: Some(NULL_RECEIVER_NAME.to_string()),
                ..Route::default()
            },
            receivers: vec![Receiver::null()],
            inhibit_rules: Vec::new(),
        }
    }
}

/// Lifecycle state reported for a silence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SilenceState {
    /// In effect.
    #[default]
    Active,
    /// Not started yet.
    Pending,
    /// Ended or deleted.
    Expired,
}

/// Status block of a silence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SilenceStatus {
    /// Reported state.
    pub state: SilenceState,
}

/// A time-windowed suppression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Silence {
    /// Silence id.
    #[serde(default)]
    pub id: String,
    /// AND-combined label matchers.
    pub matchers: Vec<Matcher>,
    /// Start of the window, inclusive.
    pub starts_at: DateTime<Utc>,
    /// End of the window, exclusive.
    pub ends_at: DateTime<Utc>,
    /// Reported status.
    #[serde(default)]
    pub status: SilenceStatus,
    /// Who created the silence.
    #[serde(default)]
    pub created_by: String,
    /// Why the silence exists.
    #[serde(default)]
    pub comment: String,
}

/// Everything the compiler reads in one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSnapshot {
    /// Rule groups.
    #[serde(default)]
    pub rules: RuleSet,
    /// Routing tree; alerts are closed when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<RoutingConfig>,
    /// Silences known at read time.
    #[serde(default)]
    pub silences: Vec<Silence>,
}
