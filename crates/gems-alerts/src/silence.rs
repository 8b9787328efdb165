//! Decides whether silences mute an alert at a given time.
//!
//! A silence without matchers mutes nothing.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::native::{CompiledMatcher, Matcher, Silence, SilenceState};

impl Silence {
    /// Checks if the silence is in effect at `at`.
    ///
    /// The window is `[starts_at, ends_at)` and expired silences never apply.
    #[must_use]
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.status.state != SilenceState::Expired && at >= self.starts_at && at < self.ends_at
    }

    /// Checks if the silence mutes an alert with `labels` at `at`.
    #[must_use]
    pub fn mutes(&self, labels: &BTreeMap<String, String>, at: DateTime<Utc>) -> bool {
        !self.matchers.is_empty()
            && self.is_active_at(at)
            && self.matchers.iter().all(|m| m.matches(labels))
    }
}

/// Silences with their matchers compiled, for checking many alerts.
#[derive(Debug, Clone)]
pub struct SilenceSet<'a> {
    entries: Vec<(&'a Silence, Vec<CompiledMatcher>)>,
}

impl<'a> SilenceSet<'a> {
    /// Compiles the matchers of every silence that can ever mute.
    #[must_use]
    pub fn new(silences: &'a [Silence]) -> Self {
        let entries = silences
            .iter()
            .filter(|s| !s.matchers.is_empty() && s.status.state != SilenceState::Expired)
            .map(|s| (s, s.matchers.iter().map(Matcher::compile).collect()))
            .collect();
        Self { entries }
    }

    /// Returns the first silence muting an alert with `labels` at `at`.
    #[must_use]
    pub fn find_muting(&self, labels: &BTreeMap<String, String>, at: DateTime<Utc>) -> Option<&'a Silence> {
        self.entries
            .iter()
            .find(|(silence, matchers)| {
                silence.is_active_at(at) && matchers.iter().all(|m| m.matches(labels))
            })
            .map(|(silence, _)| *silence)
    }
}

/// Returns the first silence muting an alert with `labels` at `at`.
#[must_use]
pub fn find_muting<'a>(
    silences: &'a [Silence],
    labels: &BTreeMap<String, String>,
    at: DateTime<Utc>,
) -> Option<&'a Silence> {
    SilenceSet::new(silences).find_muting(labels, at)
}
