//! Process-wide registry of live [`HealthMonitor`]s, modeled on
//! bit-babbler's `BitB::Monitor` base class: a `std::list<Monitor*>`
//! guarded by a `pthread_mutex_t`, where each monitor adds itself on
//! construction and removes itself on destruction.
//!
//! The Rust translation holds `Weak` references instead of raw
//! pointers, so a dangling entry can never be observed: once the last
//! `Arc<HealthMonitor>` is dropped, `Weak::upgrade()` simply stops
//! returning the entry, and the monitor's own `Drop` impl prunes it on
//! its way out.
//!
//! Locking discipline: `ids`/`stats`/`raw_data` hold the registry
//! mutex for the entire walk, calling into each live monitor's own
//! mutex (via `report_json`/`raw_data_json`) nested inside it one at a
//! time, so no monitor can register or deregister mid-aggregation.
//! `HealthMonitor` never locks the registry while holding its own
//! lock, so this nesting order (registry, then monitor) is never
//! inverted.

use std::sync::{Arc, Mutex, OnceLock, Weak};

use crate::qa::monitor::HealthMonitor;

fn global() -> &'static Mutex<Vec<Weak<HealthMonitor>>> {
    static REGISTRY: OnceLock<Mutex<Vec<Weak<HealthMonitor>>>> = OnceLock::new();
    REGISTRY.get_or_init(Vec::new)
}

/// Add `monitor` to the registry. Called once, from `HealthMonitor::new`.
pub fn register(monitor: &Arc<HealthMonitor>) {
    let mut list = global().lock().unwrap();
    list.push(Arc::downgrade(monitor));
}

/// Remove the entry whose pointer identity matches `monitor`. Called
/// once, from `HealthMonitor`'s `Drop` impl. A monitor that was never
/// registered (there is no such path today, but the check costs
/// nothing) is silently ignored rather than panicking.
pub fn deregister(monitor: &HealthMonitor) {
    let target = monitor as *const HealthMonitor;
    let mut list = global().lock().unwrap();
    list.retain(|weak| weak.as_ptr() != target);
}

/// JSON array of the ids of every currently-live monitor. Holds the
/// registry mutex for the full walk, same as `stats`/`raw_data`.
pub fn ids() -> String {
    let list = global().lock().unwrap();
    let mut s = String::from("[");
    let mut first = true;
    for weak in list.iter() {
        let Some(m) = weak.upgrade() else { continue };
        if !first {
            s.push(',');
        }
        first = false;
        s.push('"');
        s.push_str(&m.id().replace('"', "\\\""));
        s.push('"');
    }
    s.push(']');
    s
}

/// JSON object mapping id -> report for every live monitor, optionally
/// restricted to a single `id`. The registry mutex stays held for the
/// whole aggregation; each monitor's own mutex is acquired nested
/// inside it via `report_json`.
pub fn stats(filter: Option<&str>) -> String {
    let list = global().lock().unwrap();
    let mut s = String::from("{");
    let mut first = true;
    for weak in list.iter() {
        let Some(m) = weak.upgrade() else { continue };
        if let Some(id) = filter {
            if m.id() != id {
                continue;
            }
        }
        if !first {
            s.push(',');
        }
        first = false;
        s.push('"');
        s.push_str(&m.id().replace('"', "\\\""));
        s.push_str("\":");
        s.push_str(&m.report_json());
    }
    s.push('}');
    s
}

/// JSON object mapping id -> raw histogram data for every live monitor,
/// optionally restricted to a single `id`. Same locking discipline as
/// `stats`.
pub fn raw_data(filter: Option<&str>) -> String {
    let list = global().lock().unwrap();
    let mut s = String::from("{");
    let mut first = true;
    for weak in list.iter() {
        let Some(m) = weak.upgrade() else { continue };
        if let Some(id) = filter {
            if m.id() != id {
                continue;
            }
        }
        if !first {
            s.push(',');
        }
        first = false;
        s.push('"');
        s.push_str(&m.id().replace('"', "\\\""));
        s.push_str("\":");
        s.push_str(&m.raw_data_json());
    }
    s.push('}');
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QaConfig;

    #[test]
    fn test_register_and_deregister_via_drop() {
        {
            let cfg = QaConfig::default();
            let m = HealthMonitor::new("registry-test-a", cfg.assume_ent8_ok, &cfg);
            assert!(ids().contains("registry-test-a"));
            drop(m);
        }
        assert!(!ids().contains("registry-test-a"));
    }

    #[test]
    fn test_stats_filter_by_id() {
        let _a = HealthMonitor::new("registry-test-b", true, &QaConfig::default());
        let _c = HealthMonitor::new("registry-test-c", true, &QaConfig::default());
        let filtered = stats(Some("registry-test-b"));
        assert!(filtered.contains("registry-test-b"));
        assert!(!filtered.contains("registry-test-c"));
    }

    #[test]
    fn test_stats_unknown_filter_is_empty_object() {
        let result = stats(Some("no-such-id-xyz"));
        assert_eq!(result, "{}");
    }

    #[test]
    fn test_dropped_weak_entries_are_pruned_not_just_skipped() {
        let id = "registry-test-prune";
        {
            let _m = HealthMonitor::new(id, true, &QaConfig::default());
        }
        // After drop, the entry must be gone from the backing Vec, not
        // merely unreachable via upgrade -- otherwise the registry would
        // grow without bound over a long-running process.
        let list = global().lock().unwrap();
        assert!(list.iter().all(|w| w.upgrade().map(|m| m.id().to_string()) != Some(id.to_string())));
    }
}
