//! End-to-end scenarios for forward and reverse compilation.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use gems_alerts::types::{
    ALERT_NAME_LABEL, ALERT_NAMESPACE_LABEL, EXPR_JSON_ANNOTATION, GLOBAL_ALERT_NAMESPACE,
    NULL_RECEIVER_NAME, SEVERITY_LABEL,
};
use gems_alerts::{
    AlertCompiler, AlertError, AlertLevel, AlertReceiver, AlertRule, AlertSnapshot, CompareOp,
    CompilerOptions, Matcher, NativeRule, QueryParams, Receiver, Route, RoutingConfig, RuleGroup,
    RuleSet, Severity, Silence, SilenceStatus, to_native,
};
use proptest::prelude::*;

const STATUS_EXPR: &str = r#"kube_node_status_condition{condition=~"Ready", status=~"true"}"#;
const STATUS_PAYLOAD: &str = r#"{"resource":"node","rule":"statusCondition","unit":"","labelpairs":{"condition":"Ready","status":"true"},"compareOp":"==","compareValue":"0"}"#;

// ==================== Helper Functions ====================

fn status_rule(alert: &str, severity: &str) -> NativeRule {
    NativeRule {
        alert: alert.to_string(),
        expr: format!("{STATUS_EXPR} == 0"),
        for_duration: "1m".to_string(),
        labels: BTreeMap::from([
            (ALERT_NAME_LABEL.to_string(), alert.to_string()),
            (ALERT_NAMESPACE_LABEL.to_string(), GLOBAL_ALERT_NAMESPACE.to_string()),
            (SEVERITY_LABEL.to_string(), severity.to_string()),
        ]),
        annotations: BTreeMap::from([(
            EXPR_JSON_ANNOTATION.to_string(),
            STATUS_PAYLOAD.to_string(),
        )]),
    }
}

fn routing(nested_receiver: &str) -> RoutingConfig {
    let mut routing = RoutingConfig::disabled("alert-routing", GLOBAL_ALERT_NAMESPACE);
    routing.receivers.push(Receiver {
        name: "receiver-1".to_string(),
        config: BTreeMap::new(),
    });
    routing.route.routes.push(Route {
        receiver: Some(nested_receiver.to_string()),
        matchers: vec![
            Matcher::equal(ALERT_NAME_LABEL, "alert-1"),
            Matcher::equal(ALERT_NAMESPACE_LABEL, GLOBAL_ALERT_NAMESPACE),
        ],
        ..Route::default()
    });
    routing
}

fn scenario(nested_receiver: &str) -> AlertSnapshot {
    AlertSnapshot {
        rules: RuleSet {
            name: "alert-rules".to_string(),
            namespace: GLOBAL_ALERT_NAMESPACE.to_string(),
            groups: vec![RuleGroup {
                name: "alert-1".to_string(),
                rules: vec![status_rule("alert-1", "error")],
            }],
        },
        routing: Some(routing(nested_receiver)),
        silences: Vec::new(),
    }
}

fn silence(starts_in: Duration, ends_in: Duration) -> Silence {
    let now = Utc::now();
    Silence {
        id: "silence-1".to_string(),
        matchers: vec![
            Matcher::equal(ALERT_NAME_LABEL, "alert-1"),
            Matcher::equal(ALERT_NAMESPACE_LABEL, GLOBAL_ALERT_NAMESPACE),
        ],
        starts_at: now + starts_in,
        ends_at: now + ends_in,
        status: SilenceStatus::default(),
        created_by: "admin".to_string(),
        comment: "maintenance".to_string(),
    }
}

fn compile(snapshot: &AlertSnapshot) -> Vec<AlertRule> {
    let options = CompilerOptions::default();
    AlertCompiler::new(snapshot, &options)
        .to_alerts(false)
        .into_result()
        .expect("scenario compiles")
}

fn round_trip(alert: &AlertRule, receivers: &[&str]) -> AlertRule {
    let options = CompilerOptions::default();
    let mut snapshot = AlertSnapshot::default();
    let mut routing = RoutingConfig::disabled("alert-routing", &alert.namespace);
    for name in receivers {
        routing.receivers.push(Receiver {
            name: (*name).to_string(),
            config: BTreeMap::new(),
        });
    }
    snapshot.routing = Some(routing);
    snapshot
        .upsert(to_native(alert, &options.templates).expect("reverse compiles"))
        .expect("upsert succeeds");

    let mut alerts = AlertCompiler::new(&snapshot, &options)
        .to_alerts(true)
        .into_result()
        .expect("forward compiles");
    assert_eq!(alerts.len(), 1);
    alerts.remove(0).without_origin()
}

// ==================== Forward Compilation Tests ====================

#[test]
fn test_single_level_alert_routed_to_receiver() {
    let alerts = compile(&scenario("receiver-1"));

    let expected = AlertRule {
        namespace: GLOBAL_ALERT_NAMESPACE.to_string(),
        name: "alert-1".to_string(),
        for_duration: "1m".to_string(),
        alert_levels: vec![AlertLevel::new(CompareOp::Equal, "0", Severity::Error)],
        receivers: vec![AlertReceiver::new("receiver-1")],
        is_open: true,
        mute: false,
        query_params: QueryParams::new("node", "statusCondition")
            .with_label("condition", "Ready")
            .with_label("status", "true"),
        expr: STATUS_EXPR.to_string(),
        origin: None,
    };
    assert_eq!(alerts, vec![expected]);
}

#[test]
fn test_sentinel_receiver_closes_alert() {
    let alerts = compile(&scenario(NULL_RECEIVER_NAME));
    assert_eq!(alerts.len(), 1);
    assert!(!alerts[0].is_open);
    assert!(alerts[0].receivers.is_empty());
}

#[test]
fn test_active_silence_mutes() {
    let mut snapshot = scenario("receiver-1");
    snapshot
        .silences
        .push(silence(-Duration::hours(1), Duration::hours(1)));
    assert!(compile(&snapshot)[0].mute);
}

#[test]
fn test_ended_silence_has_no_effect() {
    let mut snapshot = scenario("receiver-1");
    snapshot
        .silences
        .push(silence(-Duration::hours(2), -Duration::hours(1)));
    assert!(!compile(&snapshot)[0].mute);
}

#[test]
fn test_ambiguous_severity_excludes_only_that_alert() {
    let mut snapshot = scenario("receiver-1");
    snapshot.rules.groups.push(RuleGroup {
        name: "alert-2".to_string(),
        rules: vec![status_rule("alert-2", "error"), status_rule("alert-2", "error")],
    });

    let options = CompilerOptions::default();
    let output = AlertCompiler::new(&snapshot, &options).to_alerts(false);
    assert_eq!(output.alerts.len(), 1);
    assert_eq!(output.alerts[0].name, "alert-1");

    let error = output.error.expect("alert-2 fails");
    assert_eq!(error.len(), 1);
    assert_eq!(error.errors()[0].name, "alert-2");
    assert!(matches!(
        error.errors()[0].source,
        AlertError::AmbiguousSeverity { .. }
    ));
}

#[test]
fn test_levels_sorted_by_severity() {
    let mut snapshot = scenario("receiver-1");
    snapshot.rules.groups[0].rules = vec![
        status_rule("alert-1", "critical"),
        status_rule("alert-1", "warning"),
        status_rule("alert-1", "error"),
    ];
    let severities: Vec<_> = compile(&snapshot)[0]
        .alert_levels
        .iter()
        .map(|l| l.severity)
        .collect();
    assert_eq!(
        severities,
        vec![Severity::Warning, Severity::Error, Severity::Critical]
    );
}

#[test]
fn test_snapshot_parses_from_json() {
    let json = serde_json::json!({
        "rules": {
            "name": "alert-rules",
            "namespace": GLOBAL_ALERT_NAMESPACE,
            "groups": [{
                "name": "alert-1",
                "rules": [{
                    "alert": "alert-1",
                    "expr": format!("{STATUS_EXPR} == 0"),
                    "for": "1m",
                    "labels": {
                        "gems_alertname": "alert-1",
                        "gems_namespace": GLOBAL_ALERT_NAMESPACE,
                        "severity": "error"
                    },
                    "annotations": { "gems_expr_json": STATUS_PAYLOAD }
                }]
            }]
        },
        "routing": {
            "name": "alert-routing",
            "namespace": GLOBAL_ALERT_NAMESPACE,
            "route": {
                "receiver": "null",
                "routes": [{
                    "receiver": "receiver-1",
                    "matchers": [
                        { "name": "gems_alertname", "value": "alert-1", "matchType": "=" },
                        { "name": "gems_namespace", "value": GLOBAL_ALERT_NAMESPACE }
                    ]
                }]
            },
            "receivers": [{ "name": "null" }, { "name": "receiver-1", "webhookConfigs": [] }]
        }
    });
    let snapshot: AlertSnapshot = serde_json::from_value(json).expect("valid snapshot");
    assert_eq!(compile(&snapshot), compile(&scenario("receiver-1")));
}

// ==================== Round Trip Tests ====================

#[test]
fn test_reverse_then_forward_reproduces_alert() {
    let alert = AlertRule {
        namespace: GLOBAL_ALERT_NAMESPACE.to_string(),
        name: "container-memory".to_string(),
        for_duration: "5m".to_string(),
        alert_levels: vec![
            AlertLevel::new(CompareOp::GreaterThanOrEqual, "512", Severity::Warning),
            AlertLevel::new(CompareOp::GreaterThanOrEqual, "1024", Severity::Critical),
        ],
        receivers: vec![AlertReceiver::new("ops"), AlertReceiver::new("oncall")],
        is_open: true,
        mute: false,
        query_params: QueryParams::new("container", "memoryUsageBytes")
            .with_unit("MB")
            .with_label("namespace", "default")
            .with_label("pod", "web-.*"),
        expr: r#"gems_container_memory_usage_bytes{namespace=~"default", pod=~"web-.*"}"#
            .to_string(),
        origin: None,
    };
    assert_eq!(round_trip(&alert, &["ops", "oncall"]), alert);
}

#[test]
fn test_repeated_receiver_is_rejected_before_compiling() {
    let alert = AlertRule {
        namespace: GLOBAL_ALERT_NAMESPACE.to_string(),
        name: "alert-1".to_string(),
        for_duration: "1m".to_string(),
        alert_levels: vec![AlertLevel::new(CompareOp::Equal, "0", Severity::Error)],
        receivers: vec![AlertReceiver::new("ops"), AlertReceiver::new("ops")],
        is_open: true,
        mute: false,
        query_params: QueryParams::new("node", "statusCondition")
            .with_label("condition", "Ready")
            .with_label("status", "true"),
        expr: STATUS_EXPR.to_string(),
        origin: None,
    };
    let result = to_native(&alert, &CompilerOptions::default().templates);
    assert!(matches!(result, Err(AlertError::InvalidRule { .. })));
}

#[test]
fn test_closed_alert_round_trips() {
    let alert = AlertRule {
        namespace: GLOBAL_ALERT_NAMESPACE.to_string(),
        name: "alert-1".to_string(),
        for_duration: "1m".to_string(),
        alert_levels: vec![AlertLevel::new(CompareOp::Equal, "0", Severity::Error)],
        receivers: Vec::new(),
        is_open: false,
        mute: false,
        query_params: QueryParams::new("node", "statusCondition")
            .with_label("condition", "Ready")
            .with_label("status", "true"),
        expr: STATUS_EXPR.to_string(),
        origin: None,
    };
    assert_eq!(round_trip(&alert, &[]), alert);
}

fn level_strategy() -> impl Strategy<Value = Vec<AlertLevel>> {
    (
        proptest::sample::subsequence(Severity::ALL.to_vec(), 1..=3),
        proptest::sample::select(CompareOp::ALL.to_vec()),
        1u32..10_000,
    )
        .prop_map(|(severities, op, base)| {
            severities
                .into_iter()
                .enumerate()
                .map(|(i, severity)| {
                    AlertLevel::new(op, (base + u32::try_from(i).unwrap_or(0)).to_string(), severity)
                })
                .collect()
        })
}

const RECEIVER_POOL: [&str; 3] = ["ops", "oncall", "team"];

fn receiver_strategy() -> impl Strategy<Value = Vec<&'static str>> {
    proptest::sample::subsequence(RECEIVER_POOL.to_vec(), 1..=3)
}

proptest! {
    #[test]
    fn prop_round_trip_any_levels(
        levels in level_strategy(),
        receivers in receiver_strategy(),
        open in any::<bool>(),
    ) {
        let alert = AlertRule {
            namespace: GLOBAL_ALERT_NAMESPACE.to_string(),
            name: "pvc-usage".to_string(),
            for_duration: "10m".to_string(),
            alert_levels: levels,
            receivers: if open {
                receivers.iter().copied().map(AlertReceiver::new).collect()
            } else {
                Vec::new()
            },
            is_open: open,
            mute: false,
            query_params: QueryParams::new("pvc", "volumeUsagePercent")
                .with_unit("percent")
                .with_label("persistentvolumeclaim", "data-0"),
            expr: r#"gems_pvc_usage_percent{persistentvolumeclaim=~"data-0"}"#.to_string(),
            origin: None,
        };
        prop_assert_eq!(round_trip(&alert, &RECEIVER_POOL), alert);
    }
}
