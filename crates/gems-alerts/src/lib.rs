//! Bidirectional compiler between GEMS alert rules and Prometheus/Alertmanager
//! native resources.
//!
//! `gems-alerts` turns a snapshot of native rule groups, a routing tree and
//! silences into high-level alert rules, and turns an alert rule back into
//! the native objects that realize it.
//!
//! # Features
//!
//! - **Forward compilation**: [`AlertCompiler::to_alerts`] aggregates the
//!   per-severity rule entries of each alert into one [`AlertRule`]
//! - **Reverse compilation**: [`to_native`] expands an alert into rule
//!   entries, routes and inhibit rules
//! - **Routing**: alerts resolve against the routing tree; routes to the
//!   `null` receiver mean the alert is closed
//! - **Silences**: an active silence whose matchers cover the alert mutes it
//! - **Versioned writes**: [`apply_alert`] runs a conflict-checked
//!   read-modify-write cycle against a [`SnapshotStore`]
//!
//! # Example
//!
//! ```rust
//! use gems_alerts::{
//!     AlertCompiler, AlertLevel, AlertRule, AlertSnapshot, CompareOp, CompilerOptions,
//!     QueryParams, Severity, to_native,
//! };
//!
//! let alert = AlertRule {
//!     namespace: "gemcloud-monitoring-system".to_string(),
//!     name: "node-not-ready".to_string(),
//!     for_duration: "1m".to_string(),
//!     alert_levels: vec![AlertLevel::new(CompareOp::Equal, "0", Severity::Critical)],
//!     receivers: Vec::new(),
//!     is_open: false,
//!     mute: false,
//!     query_params: QueryParams::new("node", "statusCondition")
//!         .with_label("condition", "Ready")
//!         .with_label("status", "true"),
//!     expr: String::new(),
//!     origin: None,
//! };
//!
//! let options = CompilerOptions::default();
//! let mut snapshot = AlertSnapshot::default();
//! snapshot.upsert(to_native(&alert, &options.templates).unwrap()).unwrap();
//!
//! let compiled = AlertCompiler::new(&snapshot, &options)
//!     .to_alerts(false)
//!     .into_result()
//!     .unwrap();
//! assert_eq!(compiled[0].expr, r#"kube_node_status_condition{condition=~"Ready", status=~"true"}"#);
//! assert!(!compiled[0].is_open);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod aggregate;
pub mod codec;
pub mod compiler;
pub mod config;
pub mod error;
pub mod native;
pub mod reverse;
pub mod route;
pub mod silence;
pub mod store;
pub mod template;
pub mod types;

// Re-export main types at crate root
pub use aggregate::ExpressionMismatch;
pub use compiler::{AlertCompiler, CompileOutput};
pub use config::{CompilerConfig, CompilerOptions};
pub use error::{AggregateError, AlertError, GroupError, Result};
pub use native::{
    AlertSnapshot, CompiledMatcher, InhibitRule, MatchType, Matcher, NativeRule, Receiver, Route,
    RoutingConfig, RuleGroup, RuleSet, Silence, SilenceState, SilenceStatus,
};
pub use reverse::{NativeAlert, to_native};
pub use route::{Resolution, RouteTree};
pub use silence::SilenceSet;
pub use store::{MemorySnapshotStore, SnapshotStore, Versioned, apply_alert, delete_alert};
pub use template::{RuleTemplate, TemplateRegistry};
pub use types::{
    AlertLevel, AlertOrigin, AlertReceiver, AlertRule, CompareOp, QueryParams, Severity,
};
