//! Error types for the gems-alerts crate.

use std::fmt;

use thiserror::Error;

/// Errors that can occur while compiling alert rules.
#[derive(Debug, Error)]
pub enum AlertError {
    /// A rule entry or its annotation payload could not be decoded.
    #[error("decode error: {reason}")]
    Decode {
        /// What could not be decoded.
        reason: String,
    },

    /// No expression template is registered for the rule type.
    #[error("unknown template: resource {resource:?} has no rule type {rule_type:?}")]
    UnknownTemplate {
        /// The resource the template was looked up for.
        resource: String,
        /// The rule type that was not found.
        rule_type: String,
    },

    /// Rule entries aggregated into one alert disagree on shared fields.
    #[error("inconsistent query in alert {alert}: {reason}")]
    InconsistentQuery {
        /// The alert name.
        alert: String,
        /// Which field differed.
        reason: String,
    },

    /// Two rule entries of one alert carry the same severity.
    #[error("ambiguous severity in alert {alert}: {severity} appears more than once")]
    AmbiguousSeverity {
        /// The alert name.
        alert: String,
        /// The duplicated severity.
        severity: String,
    },

    /// The routing tree could not be resolved for an alert.
    #[error("route resolution failed for alert {alert}: {reason}")]
    RouteResolution {
        /// The alert name.
        alert: String,
        /// Why resolution failed.
        reason: String,
    },

    /// The stored snapshot changed since it was read.
    #[error("conflict: expected version {expected}, found {actual}")]
    Conflict {
        /// The version the write was based on.
        expected: String,
        /// The version currently stored.
        actual: String,
    },

    /// A domain alert rule failed validation.
    #[error("invalid alert rule: {reason}")]
    InvalidRule {
        /// The reason the rule is invalid.
        reason: String,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl AlertError {
    /// Returns true if retrying after a fresh read may succeed.
    ///
    /// Every other error is a deterministic function of the input snapshot.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub(crate) fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for AlertError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for alert operations.
pub type Result<T> = std::result::Result<T, AlertError>;

/// A failure scoped to a single logical alert during forward compilation.
#[derive(Debug, Error)]
#[error("alert {namespace}/{name}: {source}")]
pub struct GroupError {
    /// Namespace of the failing alert.
    pub namespace: String,
    /// Name of the failing alert.
    pub name: String,
    /// The underlying error.
    #[source]
    pub source: AlertError,
}

/// All per-alert failures collected from one forward compilation.
#[derive(Debug, Default)]
pub struct AggregateError {
    errors: Vec<GroupError>,
}

impl AggregateError {
    /// Records another per-alert failure.
    pub fn push(&mut self, error: GroupError) {
        self.errors.push(error);
    }

    /// Returns the collected failures in the order they occurred.
    #[must_use]
    pub fn errors(&self) -> &[GroupError] {
        &self.errors
    }

    /// Returns true if nothing failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of failed alerts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} alert(s) failed to compile", self.errors.len())?;
        for err in &self.errors {
            write!(f, "; {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}
