//! Resolves which receivers a routing tree assigns to an alert.
//!
//! Nested routes are evaluated in declaration order and the first match
//! wins, unless that route sets `continue`, in which case later siblings are
//! tried as well. A matching route whose children all miss resolves to its
//! own receiver, inherited from the parent when unset.

use std::collections::BTreeMap;

use crate::error::{AlertError, Result};
use crate::native::{CompiledMatcher, Matcher, Route};
use crate::types::NULL_RECEIVER_NAME;

/// Default bound on how deep resolution may descend.
pub const DEFAULT_MAX_ROUTE_DEPTH: usize = 16;

/// A receiver as seen by the router.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReceiverRef {
    /// A real notification destination.
    Named(String),
    /// The sentinel: the alert is disabled.
    Disabled,
}

impl ReceiverRef {
    /// Classifies a receiver name from the native config.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        if name == NULL_RECEIVER_NAME {
            Self::Disabled
        } else {
            Self::Named(name.to_string())
        }
    }

    /// Returns the receiver name as stored natively.
    #[must_use]
    pub fn as_name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Disabled => NULL_RECEIVER_NAME,
        }
    }
}

/// A route in typed form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteNode {
    /// A route without nested routes.
    Leaf {
        /// AND-combined matchers.
        matchers: Vec<CompiledMatcher>,
        /// Own receiver, if set.
        receiver: Option<ReceiverRef>,
        /// Whether later siblings are tried after a match.
        continue_matching: bool,
    },
    /// A route with nested routes.
    Branch {
        /// AND-combined matchers.
        matchers: Vec<CompiledMatcher>,
        /// Nested routes in declaration order.
        children: Vec<RouteNode>,
        /// Receiver used when no child matches.
        fallback: Option<ReceiverRef>,
        /// Whether later siblings are tried after a match.
        continue_matching: bool,
    },
}

impl RouteNode {
    /// Converts a native route, compiling its matchers.
    #[must_use]
    pub fn from_native(route: &Route) -> Self {
        let matchers = route.matchers.iter().map(Matcher::compile).collect();
        let receiver = route.receiver.as_deref().map(ReceiverRef::from_name);
        let continue_matching = route.continue_matching;
        if route.routes.is_empty() {
            Self::Leaf {
                matchers,
                receiver,
                continue_matching,
            }
        } else {
            Self::Branch {
                matchers,
                children: route.routes.iter().map(Self::from_native).collect(),
                fallback: receiver,
                continue_matching,
            }
        }
    }

    /// Returns the matchers of this route.
    #[must_use]
    pub fn matchers(&self) -> &[CompiledMatcher] {
        match self {
            Self::Leaf { matchers, .. } | Self::Branch { matchers, .. } => matchers,
        }
    }

    /// Returns the receiver set on this route itself.
    #[must_use]
    pub fn receiver(&self) -> Option<&ReceiverRef> {
        match self {
            Self::Leaf { receiver, .. } => receiver.as_ref(),
            Self::Branch { fallback, .. } => fallback.as_ref(),
        }
    }

    /// Returns true if later siblings are tried after this route matched.
    #[must_use]
    pub const fn continues(&self) -> bool {
        match self {
            Self::Leaf {
                continue_matching, ..
            }
            | Self::Branch {
                continue_matching, ..
            } => *continue_matching,
        }
    }

    /// Returns the nested routes.
    #[must_use]
    pub fn children(&self) -> &[RouteNode] {
        match self {
            Self::Leaf { .. } => &[],
            Self::Branch { children, .. } => children,
        }
    }

    /// Checks all matchers against a label set.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.matchers().iter().all(|m| m.matches(labels))
    }
}

/// One receiver reached during resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    /// The receiver.
    pub receiver: ReceiverRef,
    /// Child indices from the root to the deciding route; empty for the root.
    pub path: Vec<usize>,
}

/// The outcome of resolving one alert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Every receiver reached, in walk order.
    pub matches: Vec<RouteMatch>,
}

impl Resolution {
    /// Returns the distinct non-sentinel receiver names in walk order.
    #[must_use]
    pub fn receivers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for m in &self.matches {
            if let ReceiverRef::Named(name) = &m.receiver {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Returns true if at least one real receiver was reached.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.matches
            .iter()
            .any(|m| matches!(m.receiver, ReceiverRef::Named(_)))
    }

    /// Returns the paths of the routes that contributed real receivers.
    #[must_use]
    pub fn open_paths(&self) -> Vec<Vec<usize>> {
        self.matches
            .iter()
            .filter(|m| matches!(m.receiver, ReceiverRef::Named(_)))
            .map(|m| m.path.clone())
            .collect()
    }
}

/// A routing tree ready for resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTree {
    root: RouteNode,
    max_depth: usize,
}

impl RouteTree {
    /// Builds a tree from the native root route.
    #[must_use]
    pub fn new(root: &Route, max_depth: usize) -> Self {
        Self {
            root: RouteNode::from_native(root),
            max_depth,
        }
    }

    /// Returns the root node.
    #[must_use]
    pub const fn root(&self) -> &RouteNode {
        &self.root
    }

    /// Resolves the receivers for an alert identified by `labels`.
    ///
    /// The root always matches; its matchers are ignored.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::RouteResolution` if the matching path is deeper
    /// than the configured bound or no receiver is set along it.
    pub fn resolve(&self, alert: &str, labels: &BTreeMap<String, String>) -> Result<Resolution> {
        let mut walk = Walk {
            alert,
            labels,
            max_depth: self.max_depth,
            path: Vec::new(),
            out: Vec::new(),
        };
        let root_receiver = self.root.receiver();
        if !walk.children(self.root.children(), root_receiver, 1)? {
            walk.emit(root_receiver)?;
        }
        Ok(Resolution { matches: walk.out })
    }
}

struct Walk<'a> {
    alert: &'a str,
    labels: &'a BTreeMap<String, String>,
    max_depth: usize,
    path: Vec<usize>,
    out: Vec<RouteMatch>,
}

impl Walk<'_> {
    /// Walks siblings; returns whether any matched.
    fn children(
        &mut self,
        children: &[RouteNode],
        inherited: Option<&ReceiverRef>,
        depth: usize,
    ) -> Result<bool> {
        if children.is_empty() {
            return Ok(false);
        }
        if depth > self.max_depth {
            return Err(AlertError::RouteResolution {
                alert: self.alert.to_string(),
                reason: format!("routing tree deeper than {} levels", self.max_depth),
            });
        }

        let mut matched = false;
        for (i, child) in children.iter().enumerate() {
            if !child.matches(self.labels) {
                continue;
            }
            matched = true;
            let receiver = child.receiver().or(inherited);
            self.path.push(i);
            if !self.children(child.children(), receiver, depth + 1)? {
                self.emit(receiver)?;
            }
            self.path.pop();
            if !child.continues() {
                break;
            }
        }
        Ok(matched)
    }

    fn emit(&mut self, receiver: Option<&ReceiverRef>) -> Result<()> {
        let receiver = receiver.ok_or_else(|| AlertError::RouteResolution {
            alert: self.alert.to_string(),
            reason: "no receiver set on the matching route or its ancestors".to_string(),
        })?;
        self.out.push(RouteMatch {
            receiver: receiver.clone(),
            path: self.path.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ALERT_NAME_LABEL, ALERT_NAMESPACE_LABEL, identity_labels};

    const NS: &str = "gemcloud-monitoring-system";

    fn route_for(name: &str, receiver: &str) -> Route {
        Route {
            receiver: Some(receiver.to_string()),
            matchers: vec![
                Matcher::equal(ALERT_NAME_LABEL, name),
                Matcher::equal(ALERT_NAMESPACE_LABEL, NS),
            ],
            ..Route::default()
        }
    }

    fn root(routes: Vec<Route>) -> Route {
        Route {
            receiver: Some(NULL_RECEIVER_NAME.to_string()),
            routes,
            ..Route::default()
        }
    }

    fn resolve(root: &Route, name: &str) -> Result<Resolution> {
        RouteTree::new(root, DEFAULT_MAX_ROUTE_DEPTH).resolve(name, &identity_labels(NS, name))
    }

    #[test]
    fn nested_route_assigns_receiver() {
        let tree = root(vec![route_for("alert-1", "receiver-1")]);
        let res = resolve(&tree, "alert-1").unwrap();
        assert!(res.is_open());
        assert_eq!(res.receivers(), vec!["receiver-1"]);
        assert_eq!(res.open_paths(), vec![vec![0]]);
    }

    #[test]
    fn unmatched_alert_falls_back_to_root() {
        let tree = root(vec![route_for("alert-1", "receiver-1")]);
        let res = resolve(&tree, "alert-2").unwrap();
        assert!(!res.is_open());
        assert!(res.receivers().is_empty());
        assert_eq!(res.matches[0].receiver, ReceiverRef::Disabled);
    }

    #[test]
    fn sentinel_on_nested_route_disables() {
        let tree = root(vec![route_for("alert-1", NULL_RECEIVER_NAME)]);
        let res = resolve(&tree, "alert-1").unwrap();
        assert!(!res.is_open());
        assert!(res.receivers().is_empty());
    }

    #[test]
    fn first_match_wins() {
        let tree = root(vec![
            route_for("alert-1", "first"),
            route_for("alert-1", "second"),
        ]);
        assert_eq!(resolve(&tree, "alert-1").unwrap().receivers(), vec!["first"]);
    }

    #[test]
    fn continue_collects_later_siblings() {
        let mut first = route_for("alert-1", "first");
        first.continue_matching = true;
        let tree = root(vec![first, route_for("alert-1", "second")]);
        assert_eq!(
            resolve(&tree, "alert-1").unwrap().receivers(),
            vec!["first", "second"]
        );
    }

    #[test]
    fn branch_without_matching_child_uses_own_receiver() {
        let branch = Route {
            receiver: Some("team".to_string()),
            matchers: vec![Matcher::equal(ALERT_NAMESPACE_LABEL, NS)],
            routes: vec![route_for("other", "other-receiver")],
            continue_matching: false,
        };
        let tree = root(vec![branch]);
        let res = resolve(&tree, "alert-1").unwrap();
        assert_eq!(res.receivers(), vec!["team"]);
        assert_eq!(res.open_paths(), vec![vec![0]]);
    }

    #[test]
    fn child_inherits_parent_receiver() {
        let mut child = route_for("alert-1", "x");
        child.receiver = None;
        let branch = Route {
            receiver: Some("team".to_string()),
            routes: vec![child],
            ..Route::default()
        };
        let tree = root(vec![branch]);
        let res = resolve(&tree, "alert-1").unwrap();
        assert_eq!(res.receivers(), vec!["team"]);
        assert_eq!(res.open_paths(), vec![vec![0, 0]]);
    }

    #[test]
    fn missing_receiver_everywhere_is_an_error() {
        let tree = Route::default();
        assert!(matches!(
            resolve(&tree, "alert-1"),
            Err(AlertError::RouteResolution { .. })
        ));
    }

    #[test]
    fn depth_bound_is_scoped_to_matching_alert() {
        let mut deep = route_for("deep", "deep-receiver");
        for _ in 0..5 {
            deep = Route {
                matchers: vec![Matcher::equal(ALERT_NAME_LABEL, "deep")],
                routes: vec![deep],
                ..Route::default()
            };
        }
        let tree = RouteTree::new(&root(vec![deep, route_for("shallow", "r")]), 3);

        let err = tree.resolve("deep", &identity_labels(NS, "deep")).unwrap_err();
        assert!(matches!(err, AlertError::RouteResolution { .. }));

        let ok = tree
            .resolve("shallow", &identity_labels(NS, "shallow"))
            .unwrap();
        assert_eq!(ok.receivers(), vec!["r"]);
    }

    #[test]
    fn receiver_ref_round_trips_names() {
        assert_eq!(ReceiverRef::from_name(NULL_RECEIVER_NAME), ReceiverRef::Disabled);
        assert_eq!(ReceiverRef::from_name("r").as_name(), "r");
        assert_eq!(ReceiverRef::Disabled.as_name(), NULL_RECEIVER_NAME);
    }
}
