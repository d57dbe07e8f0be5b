//! `HealthMonitor`: owns one instance of each analyzer for a named
//! source, maintains the 3-bit health state with hysteresis, and
//! exposes the JSON reporting interface. Grounded in bit-babbler's
//! `BitB::HealthMonitor` (`health-monitor.h`), translated from a
//! `pthread_mutex_t`-guarded class into a `Mutex`-guarded one.

use std::sync::{Arc, Mutex};

use crate::config::QaConfig;
use crate::qa::ent::{EntAnalyzer, EntStats, EntTolerances};
use crate::qa::fips::{Fips, FipsBlockResult, FIPS_BLOCK};
use crate::qa::registry;

/// A typed snapshot of one monitor's current counters and latest
/// results, for callers (the `check` subcommand's report tables) that
/// want structured data instead of parsing [`HealthMonitor::report_json`].
#[derive(Debug, Clone)]
pub struct MonitorSnapshot {
    pub bytes_analysed: u64,
    pub bytes_passed: u64,
    pub fips_ok: bool,
    pub ent8_ok: bool,
    pub ent16_ok: bool,
    pub fips_blocks_analysed: u64,
    pub fips_blocks_passed: u64,
    pub fips_last: Option<FipsBlockResult>,
    pub ent8_last: Option<EntStats>,
    pub ent16_last: Option<EntStats>,
}

struct Inner {
    bytes_analysed: u64,
    bytes_passed: u64,
    carry: [u8; FIPS_BLOCK],
    carry_len: usize,
    fips: Fips,
    ent8: EntAnalyzer,
    ent16: EntAnalyzer,
    fips_ok: bool,
    ent8_ok: bool,
    ent16_ok: bool,
}

/// A live health monitor for one named entropy source. Construct with
/// [`HealthMonitor::new`], which registers it with the process-wide
/// [`registry`]; it deregisters automatically on drop.
pub struct HealthMonitor {
    id: String,
    inner: Mutex<Inner>,
}

impl HealthMonitor {
    /// `assume_ent8_ok` mirrors bit-babbler's constructor default: Ent16
    /// needs 100M samples for its first verdict (~26 minutes at 1Mbit/s),
    /// so gating on it from a cold start would pessimistically deny
    /// service; FIPS is assumed bad until it actually passes via the more
    /// restrictive recovery margin, and the caller decides whether Ent8
    /// should default to ok or not.
    pub fn new(id: impl Into<String>, assume_ent8_ok: bool, config: &QaConfig) -> Arc<Self> {
        let monitor = Arc::new(Self {
            id: id.into(),
            inner: Mutex::new(Inner {
                bytes_analysed: 0,
                bytes_passed: 0,
                carry: [0u8; FIPS_BLOCK],
                carry_len: 0,
                fips: Fips::new(config.fips_recovery_margin),
                ent8: EntAnalyzer::ent8(
                    EntTolerances {
                        expected_mean: 127.5,
                        mean_tolerance: config.ent8_mean_tolerance,
                        pi_tolerance: config.ent8_pi_tolerance,
                        serial_corr_max: config.ent8_serial_corr_max,
                    },
                    config.ent8_recovery_margin,
                ),
                ent16: EntAnalyzer::ent16(
                    EntTolerances {
                        expected_mean: 32767.5,
                        mean_tolerance: config.ent16_mean_tolerance,
                        pi_tolerance: config.ent16_pi_tolerance,
                        serial_corr_max: config.ent16_serial_corr_max,
                    },
                    config.ent16_recovery_margin,
                ),
                fips_ok: false,
                ent8_ok: assume_ent8_ok,
                ent16_ok: true,
            }),
        });

        log::debug!(target: "mixrand::qa::monitor", "+ HealthMonitor({})", monitor.id);
        registry::register(&monitor);
        monitor
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Feed `buf` to all three analyzers and return whether the overall
    /// verdict (all three `OK`) currently holds. Bytes that don't fill a
    /// whole FIPS block are kept in the carry buffer for the next call.
    pub fn check(&self, buf: &[u8]) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let len = buf.len();

        inner.ent8.analyse(buf);
        inner.ent16.analyse(buf);

        if inner.ent8.have_results() {
            let ok = inner.ent8.is_ok(inner.ent8_ok);
            inner.ent8_ok = ok;
        }
        if inner.ent16.have_results() {
            let ok = inner.ent16.is_ok(inner.ent16_ok);
            inner.ent16_ok = ok;
        }

        let mut rest = buf;

        if inner.carry_len > 0 {
            let n = (FIPS_BLOCK - inner.carry_len).min(rest.len());
            let carry_len = inner.carry_len;
            inner.carry[carry_len..carry_len + n].copy_from_slice(&rest[..n]);
            inner.carry_len += n;
            rest = &rest[n..];

            if inner.carry_len == FIPS_BLOCK {
                let block = inner.carry;
                inner.fips.analyse(&block);
                let ok = inner.fips.is_ok(inner.fips_ok);
                inner.fips_ok = ok;
                inner.carry_len = 0;
            }
        }

        while rest.len() >= FIPS_BLOCK {
            let block: [u8; FIPS_BLOCK] = rest[..FIPS_BLOCK].try_into().unwrap();
            inner.fips.analyse(&block);
            let ok = inner.fips.is_ok(inner.fips_ok);
            inner.fips_ok = ok;
            rest = &rest[FIPS_BLOCK..];
        }

        if !rest.is_empty() {
            let n = rest.len();
            inner.carry[..n].copy_from_slice(rest);
            inner.carry_len = n;
        }

        inner.bytes_analysed += len as u64;

        let overall = inner.ent8_ok && inner.ent16_ok && inner.fips_ok;
        if overall {
            inner.bytes_passed += len as u64;
        }

        overall
    }

    /// A point-in-time copy of the monitor's counters and latest
    /// per-analyzer results.
    pub fn snapshot(&self) -> MonitorSnapshot {
        let inner = self.inner.lock().unwrap();
        MonitorSnapshot {
            bytes_analysed: inner.bytes_analysed,
            bytes_passed: inner.bytes_passed,
            fips_ok: inner.fips_ok,
            ent8_ok: inner.ent8_ok,
            ent16_ok: inner.ent16_ok,
            fips_blocks_analysed: inner.fips.blocks_analysed(),
            fips_blocks_passed: inner.fips.blocks_passed(),
            fips_last: inner.fips.last(),
            ent8_last: inner.ent8.last(),
            ent16_last: inner.ent16.last(),
        }
    }

    fn qa_results_as_json(inner: &Inner) -> String {
        format!(
            "\"QA\":{{\"BytesAnalysed\":{},\"BytesPassed\":{}}}",
            inner.bytes_analysed, inner.bytes_passed
        )
    }

    /// Snapshot of aggregate counters plus each analyzer's latest
    /// results, as JSON. Always succeeds; never blocks longer than the
    /// monitor's own mutex hold time.
    pub fn report_json(&self) -> String {
        let inner = self.inner.lock().unwrap();
        let mut report = String::from("{");
        report.push_str(&Self::qa_results_as_json(&inner));
        report.push(',');
        report.push_str(&inner.fips.results_as_json());

        if inner.ent8.have_results() {
            report.push(',');
            report.push_str(&inner.ent8.results_as_json());
        }
        if inner.ent16.have_results() {
            report.push(',');
            report.push_str(&inner.ent16.results_as_json());
        }
        report.push('}');
        report
    }

    /// Full symbol histograms for Ent8/Ent16, as a JSON object.
    pub fn raw_data_json(&self) -> String {
        let inner = self.inner.lock().unwrap();
        let mut s = String::from("{");
        let mut first = true;

        if inner.ent8.have_results() {
            s.push_str(&inner.ent8.as_json());
            first = false;
        }
        if inner.ent16.have_results() {
            if !first {
                s.push(',');
            }
            s.push_str(&inner.ent16.as_json());
        }
        s.push('}');
        s
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        log::debug!(target: "mixrand::qa::monitor", "- HealthMonitor({})", self.id);
        registry::deregister(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> QaConfig {
        QaConfig::default()
    }

    #[test]
    fn test_empty_check_is_noop() {
        let monitor = HealthMonitor::new("test-empty", true, &test_config());
        let before = monitor.report_json();
        let verdict = monitor.check(&[]);
        let after = monitor.report_json();
        assert_eq!(before, after);
        // An empty check returns the *current* verdict, which for a
        // fresh monitor with assume_ent8_ok=true is still gated false by
        // fips_ok=false.
        assert!(!verdict);
    }

    #[test]
    fn test_bytes_analysed_and_passed_invariant() {
        let monitor = HealthMonitor::new("test-invariant", true, &test_config());
        let data = vec![0u8; 10_000];
        let verdict = monitor.check(&data);
        let report = monitor.report_json();
        assert!(report.contains("\"BytesAnalysed\":10000"));
        if verdict {
            assert!(report.contains("\"BytesPassed\":10000"));
        } else {
            assert!(report.contains("\"BytesPassed\":0"));
        }
    }

    #[test]
    fn test_carry_len_invariant_across_many_small_writes() {
        use rand_chacha::ChaCha20Rng;
        use rand_core::{RngCore, SeedableRng};

        let monitor = HealthMonitor::new("test-carry", true, &test_config());
        let mut rng = ChaCha20Rng::seed_from_u64(9);

        for _ in 0..100 {
            let mut chunk = vec![0u8; 37];
            rng.fill_bytes(&mut chunk);
            monitor.check(&chunk);
            let carry_len = monitor.inner.lock().unwrap().carry_len;
            assert!(carry_len < FIPS_BLOCK);
        }
    }

    #[test]
    fn test_concatenation_equivalence_across_fips_boundary() {
        use rand_chacha::ChaCha20Rng;
        use rand_core::{RngCore, SeedableRng};

        let mut rng = ChaCha20Rng::seed_from_u64(21);
        let mut whole = vec![0u8; FIPS_BLOCK * 2];
        rng.fill_bytes(&mut whole);

        let m1 = HealthMonitor::new("split-a", true, &test_config());
        m1.check(&whole[..FIPS_BLOCK + 100]);
        m1.check(&whole[FIPS_BLOCK + 100..]);

        let m2 = HealthMonitor::new("split-b", true, &test_config());
        m2.check(&whole);

        let r1 = m1.inner.lock().unwrap();
        let r2 = m2.inner.lock().unwrap();
        assert_eq!(r1.bytes_analysed, r2.bytes_analysed);
        assert_eq!(r1.fips.have_results(), r2.fips.have_results());
    }

    #[test]
    fn test_all_zero_megabyte_stream_fails_overall() {
        let monitor = HealthMonitor::new("test-allzero", true, &test_config());
        let data = vec![0u8; 1024 * 1024];
        let verdict = monitor.check(&data);
        assert!(!verdict);
        let inner = monitor.inner.lock().unwrap();
        assert_eq!(inner.bytes_passed, 0);
    }

    #[test]
    fn test_snapshot_reflects_report_json() {
        let monitor = HealthMonitor::new("test-snapshot", true, &test_config());
        monitor.check(&vec![0xAAu8; 5000]);
        let snap = monitor.snapshot();
        assert_eq!(snap.bytes_analysed, 5000);
        assert_eq!(snap.bytes_passed, if snap.fips_ok && snap.ent8_ok && snap.ent16_ok { 5000 } else { 0 });
        assert!(snap.fips_last.is_some());
    }

    #[test]
    fn test_report_json_is_well_formed_braces() {
        let monitor = HealthMonitor::new("test-json-shape", true, &test_config());
        monitor.check(&vec![0xAAu8; 5000]);
        let report = monitor.report_json();
        assert!(report.starts_with('{') && report.ends_with('}'));
        assert!(report.contains("\"QA\""));
        assert!(report.contains("\"FIPS\""));
    }
}
