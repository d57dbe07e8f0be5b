use std::path::Path;

use serde::Deserialize;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CpuRngPreference {
    Rdseed,
    Rdrand,
    Xstore,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CpuRngConfig {
    pub enable_rdseed: bool,
    pub enable_rdrand: bool,
    pub enable_xstore: bool,
    pub rdrand_retries: u32,
    pub rdseed_retries: u32,
    pub xstore_quality: u32,
    pub prefer: CpuRngPreference,
    pub fallback_mix_bytes: usize,
    pub oversample: u32,
}

impl Default for CpuRngConfig {
    fn default() -> Self {
        Self {
            enable_rdseed: true,
            enable_rdrand: true,
            enable_xstore: true,
            rdrand_retries: 10,
            rdseed_retries: 10,
            xstore_quality: 3,
            prefer: CpuRngPreference::Rdseed,
            fallback_mix_bytes: 32,
            oversample: 2,
        }
    }
}

impl CpuRngConfig {
    /// Clamp fields to valid ranges.
    pub fn validate(&mut self) {
        self.rdrand_retries = self.rdrand_retries.clamp(1, 100);
        self.rdseed_retries = self.rdseed_retries.clamp(1, 100);
        self.xstore_quality = self.xstore_quality.clamp(0, 3);
        self.fallback_mix_bytes = self.fallback_mix_bytes.clamp(0, 1024);
        self.oversample = self.oversample.clamp(1, 16);
    }
}

/// Default for `QaConfig::assume_ent8_ok`. Ent16 needs 100M samples for
/// its first verdict (~26 minutes at 1Mbit/s), so a cold-started
/// monitor assumes Ent8 passes until its own first window closes,
/// rather than pessimistically denying service. See spec §3.
fn default_assume_ent8_ok() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QaConfig {
    pub fips_recovery_margin: u32,
    pub ent8_recovery_margin: u32,
    pub ent16_recovery_margin: u32,
    pub ent8_mean_tolerance: f64,
    pub ent8_pi_tolerance: f64,
    pub ent8_serial_corr_max: f64,
    pub ent16_mean_tolerance: f64,
    pub ent16_pi_tolerance: f64,
    pub ent16_serial_corr_max: f64,
    pub control_socket: Option<String>,
    #[serde(default = "default_assume_ent8_ok")]
    pub assume_ent8_ok: bool,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            fips_recovery_margin: 2,
            ent8_recovery_margin: 2,
            ent16_recovery_margin: 2,
            ent8_mean_tolerance: 0.5,
            ent8_pi_tolerance: 0.01,
            ent8_serial_corr_max: 0.02,
            ent16_mean_tolerance: 64.0,
            ent16_pi_tolerance: 0.005,
            ent16_serial_corr_max: 0.01,
            control_socket: None,
            assume_ent8_ok: default_assume_ent8_ok(),
        }
    }
}

impl QaConfig {
    /// Clamp fields to valid ranges. Recovery margins below 2 defeat the
    /// point of hysteresis: a margin of 1 would let a single passing
    /// block flip a failed monitor straight back to ok.
    pub fn validate(&mut self) {
        self.fips_recovery_margin = self.fips_recovery_margin.clamp(2, 8);
        self.ent8_recovery_margin = self.ent8_recovery_margin.clamp(2, 8);
        self.ent16_recovery_margin = self.ent16_recovery_margin.clamp(2, 8);
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cpu_rng: CpuRngConfig,
    pub qa: QaConfig,
}

/// Load configuration from a TOML file.
///
/// - If `explicit_path` is `Some` and the file is missing, returns an error.
/// - If `explicit_path` is `None`, tries `/etc/mixrand.toml`; if missing, returns defaults.
pub fn load_config(explicit_path: Option<&Path>) -> Result<Config, Error> {
    let path = match explicit_path {
        Some(p) => {
            if !p.exists() {
                return Err(Error::InvalidArgs(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            p.to_path_buf()
        }
        None => {
            let default = Path::new("/etc/mixrand.toml");
            if !default.exists() {
                return Ok(Config::default());
            }
            default.to_path_buf()
        }
    };

    let contents = std::fs::read_to_string(&path).map_err(|e| {
        Error::InvalidArgs(format!("failed to read config {}: {}", path.display(), e))
    })?;

    let config: Config = toml::from_str(&contents).map_err(|e| {
        Error::InvalidArgs(format!("failed to parse config {}: {}", path.display(), e))
    })?;

    Ok(config)
}
