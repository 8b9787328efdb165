//! Forward compilation: native snapshot to domain alerts.
//!
//! The compiler is a pure function of the snapshot, the options and the
//! evaluation time. Failures are scoped to one alert; the other alerts of
//! the snapshot are still returned.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::aggregate::{AlertGroup, ExpressionMismatch, aggregate, group_entries};
use crate::config::CompilerOptions;
use crate::error::{AggregateError, GroupError, Result};
use crate::native::AlertSnapshot;
use crate::route::{Resolution, RouteTree};
use crate::silence::SilenceSet;
use crate::types::{AlertOrigin, AlertReceiver, AlertRule, identity_labels};

/// The result of one forward compilation.
#[derive(Debug, Default)]
pub struct CompileOutput {
    /// Alerts that compiled, in rule-group order.
    pub alerts: Vec<AlertRule>,
    /// Alerts that failed, if any.
    pub error: Option<AggregateError>,
    /// Stored expressions that differ from their templates.
    pub mismatches: Vec<ExpressionMismatch>,
}

impl CompileOutput {
    /// Returns the alerts only if every alert compiled.
    ///
    /// # Errors
    ///
    /// Returns the aggregate error if any alert failed.
    pub fn into_result(self) -> std::result::Result<Vec<AlertRule>, AggregateError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.alerts),
        }
    }
}

/// Compiles one snapshot into domain alerts.
#[derive(Debug)]
pub struct AlertCompiler<'a> {
    snapshot: &'a AlertSnapshot,
    options: &'a CompilerOptions,
    now: DateTime<Utc>,
}

impl<'a> AlertCompiler<'a> {
    /// Creates a compiler evaluating silences at the current time.
    #[must_use]
    pub fn new(snapshot: &'a AlertSnapshot, options: &'a CompilerOptions) -> Self {
        Self {
            snapshot,
            options,
            now: Utc::now(),
        }
    }

    /// Evaluates silences at `now` instead of the current time.
    #[must_use]
    pub const fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Compiles every alert of the snapshot.
    ///
    /// With `contain_origin` false, [`AlertRule::origin`] is `None` on every
    /// result.
    #[must_use]
    pub fn to_alerts(&self, contain_origin: bool) -> CompileOutput {
        let tree = self
            .snapshot
            .routing
            .as_ref()
            .map(|cfg| RouteTree::new(&cfg.route, self.options.max_route_depth));
        let silences = SilenceSet::new(&self.snapshot.silences);

        let mut output = CompileOutput::default();
        let mut errors = AggregateError::default();

        for group in group_entries(&self.snapshot.rules) {
            let namespace = group.namespace.clone();
            let name = group.name.clone();
            match self.compile_group(group, tree.as_ref(), &silences, contain_origin) {
                Ok((alert, mismatches)) => {
                    debug!(
                        namespace = %alert.namespace,
                        alert = %alert.name,
                        levels = alert.alert_levels.len(),
                        is_open = alert.is_open,
                        mute = alert.mute,
                        "compiled alert"
                    );
                    output.alerts.push(alert);
                    output.mismatches.extend(mismatches);
                }
                Err(source) => {
                    warn!(namespace = %namespace, alert = %name, error = %source, "failed to compile alert");
                    errors.push(GroupError {
                        namespace,
                        name,
                        source,
                    });
                }
            }
        }

        if !errors.is_empty() {
            output.error = Some(errors);
        }
        output
    }

    fn compile_group(
        &self,
        group: AlertGroup<'_>,
        tree: Option<&RouteTree>,
        silences: &SilenceSet<'_>,
        contain_origin: bool,
    ) -> Result<(AlertRule, Vec<ExpressionMismatch>)> {
        let aggregated = aggregate(group, &self.options.templates, self.options.verify_expressions)?;
        let labels = identity_labels(&aggregated.namespace, &aggregated.name);

        let resolution = match tree {
            Some(tree) => tree.resolve(&aggregated.name, &labels)?,
            None => Resolution::default(),
        };
        let silence = silences.find_muting(&labels, self.now);

        let origin = contain_origin.then(|| AlertOrigin {
            rule_set: format!(
                "{}/{}",
                self.snapshot.rules.namespace, self.snapshot.rules.name
            ),
            group_index: aggregated.group_index,
            route_paths: resolution.open_paths(),
            silence_id: silence.map(|s| s.id.clone()),
        });

        let alert = AlertRule {
            namespace: aggregated.namespace,
            name: aggregated.name,
            for_duration: aggregated.for_duration,
            alert_levels: aggregated.levels,
            receivers: resolution
                .receivers()
                .into_iter()
                .map(AlertReceiver::new)
                .collect(),
            is_open: resolution.is_open(),
            mute: silence.is_some(),
            query_params: aggregated.params,
            expr: aggregated.expr,
            origin,
        };
        Ok((alert, aggregated.mismatches))
    }
}
