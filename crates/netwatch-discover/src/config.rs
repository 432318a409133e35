//! Configuration for the netwatch-discover engine.

use std::time::Duration;

use netwatch_core::Credential;
use serde::Deserialize;

use crate::error::{DiscoverError, Result};

/// Top-level discover configuration.
///
/// Loaded from `netwatch.toml` `[discover]` section or
/// `NETWATCH_DISCOVER__` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverConfig {
    /// Path to the nmap binary (default: "nmap").
    #[serde(default = "default_nmap_path")]
    pub nmap_path: String,

    /// Path to the net-snmp `snmpget` binary.
    #[serde(default = "default_snmpget_path")]
    pub snmpget_path: String,

    /// CIDR to scan. When unset the subnet of the default route is used.
    #[serde(default)]
    pub target: Option<String>,

    /// CIDR used when subnet detection fails.
    #[serde(default = "default_fallback_cidr")]
    pub fallback_cidr: String,

    /// Seconds between scheduled cycles.
    #[serde(default = "default_interval")]
    pub scan_interval_secs: u64,

    /// Maximum concurrent port/OS probes.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_probes: usize,

    /// Root directory for snapshots (`scans/`, `exports/`).
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    #[serde(default = "default_community")]
    pub snmp_community: String,

    /// Per-OID query timeout.
    #[serde(default = "default_snmp_timeout")]
    pub snmp_timeout_secs: u64,

    /// Connect timeout for each default-credential attempt.
    #[serde(default = "default_login_timeout")]
    pub login_timeout_secs: u64,

    /// Connect timeout for operator-submitted credentials.
    #[serde(default = "default_manual_login_timeout")]
    pub manual_login_timeout_secs: u64,

    /// Pause after enabling a device's SNMP agent.
    #[serde(default = "default_snmp_settle")]
    pub snmp_settle_secs: u64,

    /// Overall limit for streaming a configuration export.
    #[serde(default = "default_export_timeout")]
    pub export_timeout_secs: u64,

    #[serde(default = "default_export_poll")]
    pub export_poll_millis: u64,

    /// Base URL of the MAC vendor API; the MAC is appended.
    #[serde(default = "default_vendor_api_url")]
    pub vendor_api_url: String,

    #[serde(default = "default_vendor_timeout")]
    pub vendor_timeout_secs: u64,

    /// Default credentials, tried in order.
    #[serde(default = "default_credentials")]
    pub default_credentials: Vec<Credential>,
}

impl DiscoverConfig {
    /// Load the `[discover]` table from `{file_prefix}.toml` (optional) and
    /// `NETWATCH_DISCOVER__*` environment variables. Defaults apply when
    /// neither provides the table.
    pub fn load(file_prefix: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("NETWATCH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| DiscoverError::Config(e.to_string()))?;

        match cfg.get::<DiscoverConfig>("discover") {
            Ok(c) => Ok(c),
            Err(config::ConfigError::NotFound(_)) => Ok(DiscoverConfig::default()),
            Err(e) => Err(DiscoverError::Config(e.to_string())),
        }
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn snmp_timeout(&self) -> Duration {
        Duration::from_secs(self.snmp_timeout_secs)
    }

    pub fn vendor_timeout(&self) -> Duration {
        Duration::from_secs(self.vendor_timeout_secs)
    }
}

/// The two nmap invocations a cycle makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    /// Liveness only, bounded retries and per-host timeout.
    Sweep,
    /// Fast port scan of the top 100 ports plus OS fingerprint.
    Probe,
}

impl ScanPhase {
    /// Return the nmap flags for this phase.
    pub fn nmap_flags(&self) -> Vec<&'static str> {
        match self {
            Self::Sweep => vec!["-sn", "--max-retries", "2", "--host-timeout", "5s"],
            Self::Probe => vec!["-T4", "-F", "-O"],
        }
    }
}

fn default_nmap_path() -> String {
    "nmap".to_string()
}

fn default_snmpget_path() -> String {
    "snmpget".to_string()
}

fn default_fallback_cidr() -> String {
    "192.168.1.0/24".to_string()
}

fn default_interval() -> u64 {
    60
}

fn default_max_concurrent() -> usize {
    10
}

fn default_output_dir() -> String {
    "./output".to_string()
}

fn default_community() -> String {
    "public".to_string()
}

fn default_snmp_timeout() -> u64 {
    2
}

fn default_login_timeout() -> u64 {
    5
}

fn default_manual_login_timeout() -> u64 {
    10
}

fn default_snmp_settle() -> u64 {
    2
}

fn default_export_timeout() -> u64 {
    15
}

fn default_export_poll() -> u64 {
    300
}

fn default_vendor_api_url() -> String {
    "https://api.macvendors.com/".to_string()
}

fn default_vendor_timeout() -> u64 {
    3
}

fn default_credentials() -> Vec<Credential> {
    vec![
        Credential::new("admin", "admin"),
        Credential::new("admin", ""),
        Credential::new("root", "admin"),
        Credential::new("root", "root"),
        Credential::new("admin", "password"),
    ]
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            nmap_path: default_nmap_path(),
            snmpget_path: default_snmpget_path(),
            target: None,
            fallback_cidr: default_fallback_cidr(),
            scan_interval_secs: default_interval(),
            max_concurrent_probes: default_max_concurrent(),
            output_dir: default_output_dir(),
            snmp_community: default_community(),
            snmp_timeout_secs: default_snmp_timeout(),
            login_timeout_secs: default_login_timeout(),
            manual_login_timeout_secs: default_manual_login_timeout(),
            snmp_settle_secs: default_snmp_settle(),
            export_timeout_secs: default_export_timeout(),
            export_poll_millis: default_export_poll(),
            vendor_api_url: default_vendor_api_url(),
            vendor_timeout_secs: default_vendor_timeout(),
            default_credentials: default_credentials(),
        }
    }
}
