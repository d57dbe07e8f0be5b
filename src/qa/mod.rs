//! The entropy QA pipeline: three independent statistical batteries
//! (`fips`, `ent`'s Ent8/Ent16 instances), the chi-squared helper they
//! share (`chisq`), the per-source `HealthMonitor` that composes them
//! with hysteresis (`monitor`), the process-wide `MonitorRegistry`
//! (`registry`), and the gated consumer loop (`gate`) that two concrete
//! hosts (a device characteriser and a UDP responder) drive.

pub mod chisq;
pub mod ent;
pub mod fips;
pub mod gate;
pub mod monitor;
pub mod registry;

/// Three-level hysteresis health state shared by `Fips` and `EntAnalyzer`.
/// `Unknown` (the cold-start state) gates identically to `Fail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Unknown,
    Ok,
    Fail,
}
