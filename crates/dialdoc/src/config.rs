//! Configuration management for dialdoc.
//!
//! Loads settings from /etc/dialdoc/config.toml (or `--config`) or uses
//! defaults. Every field has a serde default, so a partial file is fine.
//! Command-line flags are applied on top by the binary.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use dialdoc_shared::DialdocError;

/// WAN connection settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Connection (peer) name to dial and inspect
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub credentials_file: Option<PathBuf>,

    /// Abort the full workflow when no credentials can be resolved
    #[serde(default)]
    pub require_credentials: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Adapter to test instead of auto-selection
    #[serde(default)]
    pub target: Option<String>,

    #[serde(default)]
    pub skip_wifi_toggle: bool,
}

/// Probe targets, counts and thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_dns_names")]
    pub dns_names: Vec<String>,

    #[serde(default = "default_ping_targets")]
    pub ping_targets: Vec<String>,

    #[serde(default = "default_ping_count")]
    pub ping_count: u32,

    /// Per-operation timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Samples for packet loss / jitter measurement (full workflow)
    #[serde(default = "default_loss_samples")]
    pub loss_samples: u32,

    /// Loss percentage at or above which the check warns
    #[serde(default = "default_loss_warn")]
    pub loss_warn_percent: f64,

    /// Loss percentage at or above which the check fails
    #[serde(default = "default_loss_fail")]
    pub loss_fail_percent: f64,

    #[serde(default = "default_jitter_warn")]
    pub jitter_warn_ms: f64,

    #[serde(default = "default_traceroute_target")]
    pub traceroute_target: String,

    #[serde(default = "default_traceroute_hops")]
    pub traceroute_max_hops: u32,

    /// Upper bound on concurrent probes inside one stage
    #[serde(default = "default_max_parallel")]
    pub max_parallel_probes: usize,
}

fn default_dns_names() -> Vec<String> {
    vec!["example.com".to_string(), "wikipedia.org".to_string()]
}

fn default_ping_targets() -> Vec<String> {
    vec!["1.1.1.1".to_string(), "8.8.8.8".to_string(), "9.9.9.9".to_string()]
}

fn default_ping_count() -> u32 {
    4
}

fn default_timeout_secs() -> u64 {
    3
}

fn default_loss_samples() -> u32 {
    20
}

fn default_loss_warn() -> f64 {
    1.0
}

fn default_loss_fail() -> f64 {
    20.0
}

fn default_jitter_warn() -> f64 {
    30.0
}

fn default_traceroute_target() -> String {
    "1.1.1.1".to_string()
}

fn default_traceroute_hops() -> u32 {
    15
}

fn default_max_parallel() -> usize {
    4
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            dns_names: default_dns_names(),
            ping_targets: default_ping_targets(),
            ping_count: default_ping_count(),
            timeout_secs: default_timeout_secs(),
            loss_samples: default_loss_samples(),
            loss_warn_percent: default_loss_warn(),
            loss_fail_percent: default_loss_fail(),
            jitter_warn_ms: default_jitter_warn(),
            traceroute_target: default_traceroute_target(),
            traceroute_max_hops: default_traceroute_hops(),
            max_parallel_probes: default_max_parallel(),
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Repeated sampling over a short window (full workflow, opt-in)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_stability_samples")]
    pub samples: u32,

    #[serde(default = "default_stability_interval")]
    pub interval_ms: u64,
}

fn default_stability_samples() -> u32 {
    30
}

fn default_stability_interval() -> u64 {
    1_000
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            samples: default_stability_samples(),
            interval_ms: default_stability_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Lower the PPP default-route metric when another route wins
    #[serde(default = "default_tune_metric")]
    pub tune_route_metric: bool,

    #[serde(default = "default_ppp_metric")]
    pub ppp_route_metric: u32,
}

fn default_tune_metric() -> bool {
    true
}

fn default_ppp_metric() -> u32 {
    5
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            tune_route_metric: default_tune_metric(),
            ppp_route_metric: default_ppp_metric(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateConfig {
    /// Override for the state directory (toggle records)
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Complete configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DialdocConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub adapters: AdapterConfig,
    #[serde(default)]
    pub probes: ProbeConfig,
    #[serde(default)]
    pub stability: StabilityConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub state: StateConfig,
}

impl DialdocConfig {
    /// Load from `path`. A missing file yields defaults; a malformed one
    /// is an error.
    pub fn load(path: &Path) -> Result<Self, DialdocError> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config = Self::parse(&content)
            .map_err(|e| DialdocError::Config(format!("{}: {}", path.display(), e)))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Toggle record directory: config override or the default state dir
    pub fn toggle_record_dir(&self) -> PathBuf {
        match &self.state.dir {
            Some(dir) => dir.join(dialdoc_shared::TOGGLE_RECORD_DIR),
            None => crate::paths::toggle_record_dir(),
        }
    }
}
