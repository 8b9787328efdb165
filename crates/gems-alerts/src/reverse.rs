//! Reverse compilation: domain alert to native rule entries and routes.
//!
//! The output describes the desired end state for one alert. Applying it to
//! a snapshot replaces whatever the snapshot held for the same
//! `(namespace, name)`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::codec::{self, EncodedQuery};
use crate::error::{AlertError, Result};
use crate::native::{
    AlertSnapshot, InhibitRule, MatchType, Matcher, NativeRule, Receiver, Route, RoutingConfig,
    RuleGroup,
};
use crate::template::{TemplateRegistry, with_comparison};
use crate::types::{
    ALERT_NAME_LABEL, ALERT_NAMESPACE_LABEL, AlertRule, EXPR_JSON_ANNOTATION, NULL_RECEIVER_NAME,
    SEVERITY_LABEL, Severity,
};

/// Name given to a routing config created by [`AlertSnapshot::upsert`].
pub const DEFAULT_ROUTING_NAME: &str = "gemcloud-alert-routing";

/// Name given to a rule set created by [`AlertSnapshot::upsert`].
pub const DEFAULT_RULE_SET_NAME: &str = "gemcloud-alert-rules";

/// Native objects realizing one alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeAlert {
    /// Namespace of the alert.
    pub namespace: String,
    /// Alert name.
    pub name: String,
    /// One rule entry per level, in severity order.
    pub group: RuleGroup,
    /// Routes matching the alert; the sentinel route when closed.
    pub routes: Vec<Route>,
    /// Higher severities inhibiting lower ones.
    pub inhibit_rules: Vec<InhibitRule>,
}

/// Compiles a domain alert into native objects.
///
/// # Errors
///
/// - `AlertError::InvalidRule` if the alert fails [`AlertRule::validate`] or
///   its unit is not accepted by the template
/// - `AlertError::UnknownTemplate` if the rule type is not registered
pub fn to_native(alert: &AlertRule, templates: &TemplateRegistry) -> Result<NativeAlert> {
    alert.validate()?;
    let params = &alert.query_params;
    templates.check_unit(&params.resource, &params.rule_type, &params.unit)?;
    let expr = templates.build(&params.resource, &params.rule_type, &params.label_pairs)?;

    let mut levels = alert.alert_levels.clone();
    levels.sort_by_key(|level| level.severity);

    let rules = levels
        .iter()
        .map(|level| {
            let payload = codec::encode(&EncodedQuery {
                params: params.clone(),
                compare_op: level.compare_op,
                compare_value: level.compare_value.clone(),
            })?;
            Ok(NativeRule {
                alert: alert.name.clone(),
                expr: with_comparison(&expr, level.compare_op, &level.compare_value),
                for_duration: alert.for_duration.clone(),
                labels: BTreeMap::from([
                    (ALERT_NAME_LABEL.to_string(), alert.name.clone()),
                    (ALERT_NAMESPACE_LABEL.to_string(), alert.namespace.clone()),
                    (SEVERITY_LABEL.to_string(), level.severity.to_string()),
                ]),
                annotations: BTreeMap::from([(EXPR_JSON_ANNOTATION.to_string(), payload)]),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let receivers: Vec<&str> = if alert.is_open {
        alert.receivers.iter().map(|r| r.name.as_str()).collect()
    } else {
        vec![NULL_RECEIVER_NAME]
    };
    let last = receivers.len().saturating_sub(1);
    let routes = receivers
        .iter()
        .enumerate()
        .map(|(i, receiver)| Route {
            receiver: Some((*receiver).to_string()),
            matchers: identity_matchers(&alert.namespace, &alert.name),
            routes: Vec::new(),
            continue_matching: i < last,
        })
        .collect();

    let inhibit_rules = levels
        .windows(2)
        .map(|pair| InhibitRule {
            source_match: severity_matchers(&alert.namespace, &alert.name, pair[1].severity),
            target_match: severity_matchers(&alert.namespace, &alert.name, pair[0].severity),
            equal: vec![ALERT_NAME_LABEL.to_string(), ALERT_NAMESPACE_LABEL.to_string()],
        })
        .collect();

    Ok(NativeAlert {
        namespace: alert.namespace.clone(),
        name: alert.name.clone(),
        group: RuleGroup {
            name: alert.name.clone(),
            rules,
        },
        routes,
        inhibit_rules,
    })
}

fn identity_matchers(namespace: &str, name: &str) -> Vec<Matcher> {
    vec![
        Matcher::equal(ALERT_NAME_LABEL, name),
        Matcher::equal(ALERT_NAMESPACE_LABEL, namespace),
    ]
}

fn severity_matchers(namespace: &str, name: &str, severity: Severity) -> Vec<Matcher> {
    let mut matchers = identity_matchers(namespace, name);
    matchers.push(Matcher::equal(SEVERITY_LABEL, severity.as_str()));
    matchers
}

/// Returns true if the matchers pin exactly this alert identity.
fn is_identity(matchers: &[Matcher], namespace: &str, name: &str) -> bool {
    let wanted = identity_matchers(namespace, name);
    wanted.iter().all(|w| matchers.contains(w))
}

/// Removes every element matching `pred`; true if any was removed.
fn remove_matching<T>(items: &mut Vec<T>, pred: impl Fn(&T) -> bool) -> bool {
    let before = items.len();
    items.retain(|item| !pred(item));
    items.len() != before
}

/// Returns true if the route pins some alert identity by equality.
fn is_alert_route(route: &Route) -> bool {
    [ALERT_NAME_LABEL, ALERT_NAMESPACE_LABEL].iter().all(|label| {
        route
            .matchers
            .iter()
            .any(|m| m.name == *label && m.match_type == MatchType::Equal)
    })
}

impl AlertSnapshot {
    /// Replaces everything the snapshot holds for the alert with `native`.
    ///
    /// The rule group is appended. The routes go before the first sibling
    /// that is not an alert route, so broader routes declared without
    /// `continue` cannot shadow them. Creates the rule set namespace and the
    /// routing config when missing.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::InvalidRule` if the alert belongs to another
    /// namespace than the snapshot, or routes to an undeclared receiver.
    pub fn upsert(&mut self, native: NativeAlert) -> Result<()> {
        self.upsert_at(native, None, None)
    }

    /// Replaces the alert in place, keeping its position when it existed.
    ///
    /// # Errors
    ///
    /// Same as [`AlertSnapshot::upsert`].
    pub fn upsert_in_place(&mut self, native: NativeAlert) -> Result<()> {
        let group_slot = self.group_position(&native.namespace, &native.name);
        let route_slot = self.routing.as_ref().and_then(|r| {
            r.route
                .routes
                .iter()
                .position(|route| is_identity(&route.matchers, &native.namespace, &native.name))
        });
        self.upsert_at(native, group_slot, route_slot)
    }

    fn upsert_at(
        &mut self,
        native: NativeAlert,
        group_slot: Option<usize>,
        route_slot: Option<usize>,
    ) -> Result<()> {
        if !self.rules.namespace.is_empty() && self.rules.namespace != native.namespace {
            return Err(AlertError::invalid(format!(
                "alert namespace {} does not match snapshot namespace {}",
                native.namespace, self.rules.namespace
            )));
        }

        let declared = |name: &str| {
            name == NULL_RECEIVER_NAME
                || self
                    .routing
                    .as_ref()
                    .is_some_and(|r| r.receivers.iter().any(|d| d.name == name))
        };
        for route in &native.routes {
            let name = route.receiver.as_deref().unwrap_or_default();
            if !declared(name) {
                return Err(AlertError::invalid(format!("receiver {name:?} is not declared")));
            }
        }

        if self.rules.namespace.is_empty() {
            self.rules.namespace.clone_from(&native.namespace);
        }
        if self.rules.name.is_empty() {
            self.rules.name = DEFAULT_RULE_SET_NAME.to_string();
        }
        let routing = self
            .routing
            .get_or_insert_with(|| RoutingConfig::disabled(DEFAULT_ROUTING_NAME, &native.namespace));
        if !routing.receivers.iter().any(|r| r.name == NULL_RECEIVER_NAME) {
            routing.receivers.push(Receiver::null());
        }

        self.remove_alert(&native.namespace, &native.name);

        // remove_alert leaves the routing config in place.
        if let Some(routing) = self.routing.as_mut() {
            let routes = &mut routing.route.routes;
            let first_broad = routes.iter().position(|r| !is_alert_route(r));
            let slot = route_slot
                .or(first_broad)
                .map_or(routes.len(), |slot| slot.min(routes.len()));
            for (offset, route) in native.routes.into_iter().enumerate() {
                routes.insert(slot + offset, route);
            }
            routing.inhibit_rules.extend(native.inhibit_rules);
        }
        let slot = group_slot.map_or(self.rules.groups.len(), |slot| slot.min(self.rules.groups.len()));
        self.rules.groups.insert(slot, native.group);
        Ok(())
    }

    /// Removes the rule entries, routes and inhibit rules of an alert.
    ///
    /// Returns true if anything was removed.
    pub fn remove_alert(&mut self, namespace: &str, name: &str) -> bool {
        let home = self.rules.namespace.clone();
        let belongs = |rule: &NativeRule| {
            rule.is_alerting()
                && rule.namespace_or(&home) == namespace
                && rule.alert_name().is_ok_and(|n| n == name)
        };

        let mut removed = false;
        let mut kept = Vec::with_capacity(self.rules.groups.len());
        for mut group in self.rules.groups.drain(..) {
            let before = group.rules.len();
            group.rules.retain(|rule| !belongs(rule));
            let touched = group.rules.len() != before;
            removed |= touched;
            if !(touched && group.rules.is_empty()) {
                kept.push(group);
            }
        }
        self.rules.groups = kept;

        if let Some(routing) = self.routing.as_mut() {
            removed |= remove_matching(&mut routing.route.routes, |route| {
                is_identity(&route.matchers, namespace, name)
            });
            removed |= remove_matching(&mut routing.inhibit_rules, |rule| {
                is_identity(&rule.source_match, namespace, name)
            });
        }

        removed
    }

    fn group_position(&self, namespace: &str, name: &str) -> Option<usize> {
        self.rules.groups.iter().position(|group| {
            group.rules.iter().any(|rule| {
                rule.namespace_or(&self.rules.namespace) == namespace
                    && rule.alert_name().is_ok_and(|n| n == name)
            })
        })
    }
}
