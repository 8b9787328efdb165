//! Versioned snapshot storage and the read-modify-write cycle around it.
//!
//! Writes carry the version they were based on. A store rejects a write
//! whose version is stale with [`AlertError::Conflict`], so concurrent
//! editors of one namespace never silently overwrite each other. Conflicts
//! are returned to the caller as is; re-reading and retrying is its call.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::CompilerOptions;
use crate::error::{AlertError, Result};
use crate::native::AlertSnapshot;
use crate::reverse::to_native;
use crate::types::AlertRule;

/// Version reported for a namespace that was never written.
pub const INITIAL_VERSION: &str = "0";

/// A value together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    /// Opaque version token.
    pub version: String,
    /// The stored value.
    pub value: T,
}

/// Storage of one snapshot per namespace.
pub trait SnapshotStore: Send + Sync {
    /// Reads the snapshot of a namespace.
    ///
    /// A namespace that was never written yields an empty snapshot at
    /// [`INITIAL_VERSION`].
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn load(&self, namespace: &str) -> Result<Versioned<AlertSnapshot>>;

    /// Writes the snapshot if the stored version is still `expected_version`.
    ///
    /// Returns the new version.
    ///
    /// # Errors
    ///
    /// Returns `AlertError::Conflict` if the stored version moved on.
    fn save(&self, namespace: &str, snapshot: AlertSnapshot, expected_version: &str) -> Result<String>;
}

/// In-memory [`SnapshotStore`].
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    data: Arc<RwLock<HashMap<String, (u64, AlertSnapshot)>>>,
}

impl MemorySnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a namespace, bumping its version.
    pub fn insert(&self, namespace: impl Into<String>, snapshot: AlertSnapshot) {
        let mut data = self.data.write();
        let entry = data.entry(namespace.into()).or_insert((0, AlertSnapshot::default()));
        entry.0 += 1;
        entry.1 = snapshot;
    }

    /// Returns the number of namespaces stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if nothing was stored yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self, namespace: &str) -> Result<Versioned<AlertSnapshot>> {
        let data = self.data.read();
        Ok(data.get(namespace).map_or_else(
            || Versioned {
                version: INITIAL_VERSION.to_string(),
                value: AlertSnapshot::default(),
            },
            |(version, snapshot)| Versioned {
                version: version.to_string(),
                value: snapshot.clone(),
            },
        ))
    }

    #[allow(clippy::significant_drop_tightening)] // Compare and swap under one lock
    fn save(&self, namespace: &str, snapshot: AlertSnapshot, expected_version: &str) -> Result<String> {
        let mut data = self.data.write();
        let current = data.get(namespace).map_or(0, |(version, _)| *version);
        if current.to_string() != expected_version {
            return Err(AlertError::Conflict {
                expected: expected_version.to_string(),
                actual: current.to_string(),
            });
        }
        let next = current + 1;
        data.insert(namespace.to_string(), (next, snapshot));
        debug!(namespace, version = next, "saved snapshot");
        Ok(next.to_string())
    }
}

/// Runs one read-modify-write cycle.
///
/// `modify` returns false when the snapshot needs no write; the current
/// version is then returned unchanged.
fn update<S, F>(store: &S, namespace: &str, modify: F) -> Result<String>
where
    S: SnapshotStore + ?Sized,
    F: FnOnce(&mut AlertSnapshot) -> Result<bool>,
{
    let Versioned { version, mut value } = store.load(namespace)?;
    if !modify(&mut value)? {
        return Ok(version);
    }
    store.save(namespace, value, &version)
}

/// Compiles `alert` and writes it into its namespace's snapshot.
///
/// An existing alert with the same identity is replaced in place. Returns
/// the version written.
///
/// # Errors
///
/// - Any error of [`to_native`] or [`AlertSnapshot::upsert`]
/// - `AlertError::Conflict` if the snapshot changed between read and write
pub fn apply_alert<S>(store: &S, options: &CompilerOptions, alert: &AlertRule) -> Result<String>
where
    S: SnapshotStore + ?Sized,
{
    let native = to_native(alert, &options.templates)?;
    let levels = native.group.rules.len();
    let version = update(store, &alert.namespace, |snapshot| {
        snapshot.upsert_in_place(native)?;
        Ok(true)
    })?;
    info!(
        namespace = %alert.namespace,
        alert = %alert.name,
        levels,
        version = %version,
        "applied alert"
    );
    Ok(version)
}

/// Removes an alert from its namespace's snapshot.
///
/// Returns false, without writing, if the alert did not exist.
///
/// # Errors
///
/// Returns `AlertError::Conflict` if the snapshot changed between read and
/// write.
pub fn delete_alert<S>(store: &S, namespace: &str, name: &str) -> Result<bool>
where
    S: SnapshotStore + ?Sized,
{
    let mut removed = false;
    update(store, namespace, |snapshot| {
        removed = snapshot.remove_alert(namespace, name);
        Ok(removed)
    })?;
    if removed {
        info!(namespace, alert = name, "deleted alert");
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::AlertCompiler;
    use crate::native::{Receiver, RoutingConfig};
    use crate::types::{AlertLevel, AlertReceiver, CompareOp, GLOBAL_ALERT_NAMESPACE, QueryParams, Severity};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn alert(name: &str) -> AlertRule {
        AlertRule {
            namespace: GLOBAL_ALERT_NAMESPACE.to_string(),
            name: name.to_string(),
            for_duration: "5m".to_string(),
            alert_levels: vec![AlertLevel::new(CompareOp::GreaterThan, "85", Severity::Warning)],
            receivers: vec![AlertReceiver::new("ops")],
            is_open: true,
            mute: false,
            query_params: QueryParams::new("node", "memoryUsagePercent").with_unit("percent"),
            expr: String::new(),
            origin: None,
        }
    }

    fn seeded_store() -> MemorySnapshotStore {
        let mut routing = RoutingConfig::disabled("routing", GLOBAL_ALERT_NAMESPACE);
        routing.receivers.push(Receiver {
            name: "ops".to_string(),
            config: BTreeMap::new(),
        });
        let store = MemorySnapshotStore::new();
        store.insert(
            GLOBAL_ALERT_NAMESPACE,
            AlertSnapshot {
                routing: Some(routing),
                ..AlertSnapshot::default()
            },
        );
        store
    }

    mod memory_store_tests {
        use super::*;

        #[test]
        fn unknown_namespace_is_empty_at_initial_version() {
            let store = MemorySnapshotStore::new();
            let loaded = store.load("nowhere").unwrap();
            assert_eq!(loaded.version, INITIAL_VERSION);
            assert_eq!(loaded.value, AlertSnapshot::default());
            assert!(store.is_empty());
        }

        #[test]
        fn save_bumps_version() {
            let store = MemorySnapshotStore::new();
            let v1 = store.save("ns", AlertSnapshot::default(), INITIAL_VERSION).unwrap();
            let v2 = store.save("ns", AlertSnapshot::default(), &v1).unwrap();
            assert_eq!(v1, "1");
            assert_eq!(v2, "2");
            assert_eq!(store.len(), 1);
        }

        #[test]
        fn stale_version_conflicts() {
            let store = MemorySnapshotStore::new();
            store.save("ns", AlertSnapshot::default(), INITIAL_VERSION).unwrap();
            let err = store
                .save("ns", AlertSnapshot::default(), INITIAL_VERSION)
                .unwrap_err();
            assert!(matches!(err, AlertError::Conflict { .. }));
            assert!(err.is_retryable());
        }
    }

    mod apply_tests {
        use super::*;

        #[test]
        fn applied_alert_compiles_back() {
            let store = seeded_store();
            let options = CompilerOptions::default();
            apply_alert(&store, &options, &alert("memory")).unwrap();

            let snapshot = store.load(GLOBAL_ALERT_NAMESPACE).unwrap().value;
            let alerts = AlertCompiler::new(&snapshot, &options)
                .to_alerts(false)
                .into_result()
                .unwrap();
            assert_eq!(alerts.len(), 1);
            assert_eq!(alerts[0].receivers, vec![AlertReceiver::new("ops")]);
            assert_eq!(alerts[0].alert_levels, alert("memory").alert_levels);
        }

        #[test]
        fn reapplying_replaces() {
            let store = seeded_store();
            let options = CompilerOptions::default();
            apply_alert(&store, &options, &alert("memory")).unwrap();
            let mut edited = alert("memory");
            edited.alert_levels[0].compare_value = "95".to_string();
            apply_alert(&store, &options, &edited).unwrap();

            let snapshot = store.load(GLOBAL_ALERT_NAMESPACE).unwrap().value;
            assert_eq!(snapshot.rules.groups.len(), 1);
            assert!(snapshot.rules.groups[0].rules[0].expr.ends_with("> 95"));
        }

        #[test]
        fn invalid_alert_is_not_written() {
            let store = seeded_store();
            let before = store.load(GLOBAL_ALERT_NAMESPACE).unwrap();
            let mut bad = alert("memory");
            bad.alert_levels.clear();
            assert!(apply_alert(&store, &CompilerOptions::default(), &bad).is_err());
            assert_eq!(store.load(GLOBAL_ALERT_NAMESPACE).unwrap(), before);
        }

        #[test]
        fn delete_reports_absence() {
            let store = seeded_store();
            let options = CompilerOptions::default();
            apply_alert(&store, &options, &alert("memory")).unwrap();
            assert!(delete_alert(&store, GLOBAL_ALERT_NAMESPACE, "memory").unwrap());
            assert!(!delete_alert(&store, GLOBAL_ALERT_NAMESPACE, "memory").unwrap());
        }
    }

    mod conflict_tests {
        use super::*;

        /// Store whose next saves lose against a concurrent writer.
        struct RacingStore {
            inner: MemorySnapshotStore,
            races_left: AtomicUsize,
        }

        impl SnapshotStore for RacingStore {
            fn load(&self, namespace: &str) -> Result<Versioned<AlertSnapshot>> {
                self.inner.load(namespace)
            }

            fn save(&self, namespace: &str, snapshot: AlertSnapshot, expected_version: &str) -> Result<String> {
                if self.races_left.load(Ordering::SeqCst) > 0 {
                    self.races_left.fetch_sub(1, Ordering::SeqCst);
                    let current = self.inner.load(namespace)?;
                    self.inner.save(namespace, current.value, &current.version)?;
                }
                self.inner.save(namespace, snapshot, expected_version)
            }
        }

        #[test]
        fn conflict_surfaces_without_retry() {
            let store = RacingStore {
                inner: seeded_store(),
                races_left: AtomicUsize::new(1),
            };
            let err = apply_alert(&store, &CompilerOptions::default(), &alert("memory")).unwrap_err();
            assert!(matches!(err, AlertError::Conflict { .. }));
            assert!(err.is_retryable());

            // A fresh cycle after the race succeeds.
            let version = apply_alert(&store, &CompilerOptions::default(), &alert("memory")).unwrap();
            // seed, racing write, applied write
            assert_eq!(version, "3");
        }

        #[test]
        fn no_op_delete_does_not_write() {
            let store = RacingStore {
                inner: seeded_store(),
                races_left: AtomicUsize::new(1),
            };
            assert!(!delete_alert(&store, GLOBAL_ALERT_NAMESPACE, "missing").unwrap());
            assert_eq!(store.load(GLOBAL_ALERT_NAMESPACE).unwrap().version, "1");
        }
    }
}
