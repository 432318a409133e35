//! Core domain types for the Netwatch device cache.
//!
//! A [`Device`] is the unit of state kept per live host. Its telemetry fields
//! (`snmp`, `export`) default to empty rather than absent so the cache merge
//! can decide field by field whether fresh data replaces what was harvested
//! earlier.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Label → value map produced by the SNMP collector.
pub type SnmpData = BTreeMap<String, String>;

/// Placeholder used for fields that could not be resolved.
pub const NOT_AVAILABLE: &str = "N/A";

/// Vendor string used when a MAC address cannot be resolved.
pub const UNKNOWN_VENDOR: &str = "Unknown";

/// OS name used when fingerprinting fails or yields nothing.
pub const UNKNOWN_OS: &str = "Unknown";

pub const SSH_PORT: u16 = 22;
pub const TELNET_PORT: u16 = 23;

// ── Login classification ──────────────────────────────────────────

/// Outcome of credential bootstrap for a host.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SshStatus {
    #[default]
    NotAttempted,
    /// Operator credentials accepted for a login that has not finished yet.
    Submitted,
    AutoLoginOk,
    ManualLoginOk,
    AuthFailed,
    ConnectionFailed,
}

impl SshStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::AuthFailed | Self::ConnectionFailed)
    }
}

impl std::fmt::Display for SshStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::NotAttempted => "not attempted",
            Self::Submitted => "submitted",
            Self::AutoLoginOk => "auto-login ok",
            Self::ManualLoginOk => "manual login ok",
            Self::AuthFailed => "authentication failed",
            Self::ConnectionFailed => "connection failed",
        };
        f.write_str(label)
    }
}

// ── Credentials ───────────────────────────────────────────────────

/// A username/password pair tried against a login port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Credential {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    /// Log-safe rendering: the password is never printed, only whether one was set.
    pub fn redacted(&self) -> String {
        if self.password.is_empty() {
            format!("{}/(empty)", self.username)
        } else {
            format!("{}/****", self.username)
        }
    }
}

/// Durable memo of a login classification for one IP.
///
/// Hosts with a record are skipped by automatic bootstrap until the record
/// is cleared by a disconnect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialRecord {
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    pub status: SshStatus,
    pub updated_at: DateTime<Utc>,
}

impl CredentialRecord {
    pub fn new(credential: &Credential, status: SshStatus) -> Self {
        Self {
            username: credential.username.clone(),
            password: credential.password.clone(),
            status,
            updated_at: Utc::now(),
        }
    }

    /// A record for a host where no credential worked.
    pub fn failed(status: SshStatus) -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            status,
            updated_at: Utc::now(),
        }
    }

    pub fn credential(&self) -> Credential {
        Credential::new(&self.username, &self.password)
    }
}

// ── Devices ───────────────────────────────────────────────────────

/// Bare host identity produced by the liveness sweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceSkeleton {
    pub ip: String,
    pub mac: String,
    pub vendor: String,
    pub hostname: String,
}

/// One entry of the device cache, keyed by `ip`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    pub ip: String,
    pub mac: String,
    pub vendor: String,
    pub hostname: String,
    pub ports: BTreeSet<u16>,
    pub os: String,
    pub os_accuracy: String,
    /// Neither SSH (22) nor telnet (23) is open.
    pub ssh_telnet_missing: bool,
    #[serde(default)]
    pub snmp: SnmpData,
    #[serde(default)]
    pub export: String,
    /// Mirror of `snmp["sysUpTime"]`, empty when unknown.
    #[serde(default)]
    pub uptime: String,
    #[serde(default)]
    pub ssh_status: SshStatus,
    pub last_seen: DateTime<Utc>,
}

impl Device {
    /// A device with no probe data yet: no ports, unknown OS.
    pub fn from_skeleton(skeleton: DeviceSkeleton, seen_at: DateTime<Utc>) -> Self {
        Self {
            ip: skeleton.ip,
            mac: skeleton.mac,
            vendor: skeleton.vendor,
            hostname: skeleton.hostname,
            ports: BTreeSet::new(),
            os: UNKNOWN_OS.to_string(),
            os_accuracy: "0%".to_string(),
            ssh_telnet_missing: true,
            snmp: SnmpData::new(),
            export: String::new(),
            uptime: String::new(),
            ssh_status: SshStatus::NotAttempted,
            last_seen: seen_at,
        }
    }

    /// Replace the open port set and recompute `ssh_telnet_missing`.
    pub fn set_ports(&mut self, ports: BTreeSet<u16>) {
        self.ssh_telnet_missing = !ports.contains(&SSH_PORT) && !ports.contains(&TELNET_PORT);
        self.ports = ports;
    }

    pub fn has_login_port(&self) -> bool {
        !self.ssh_telnet_missing
    }

    /// Port to log in on: 22 when open, else 23 when open.
    pub fn login_port(&self) -> Option<u16> {
        if self.ports.contains(&SSH_PORT) {
            Some(SSH_PORT)
        } else if self.ports.contains(&TELNET_PORT) {
            Some(TELNET_PORT)
        } else {
            None
        }
    }

    pub fn set_snmp(&mut self, snmp: SnmpData) {
        self.snmp = snmp;
        self.refresh_uptime();
    }

    pub fn refresh_uptime(&mut self) {
        self.uptime = self
            .snmp
            .get("sysUpTime")
            .filter(|v| v.as_str() != NOT_AVAILABLE)
            .cloned()
            .unwrap_or_default();
    }

    pub fn kind(&self) -> DeviceKind {
        DeviceKind::classify(&self.vendor, &self.os)
    }
}

// ── Device families ───────────────────────────────────────────────

/// Device family inferred from vendor and OS strings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    MikroTik,
    Cisco,
    Linux,
    Unknown,
}

impl DeviceKind {
    pub fn classify(vendor: &str, os: &str) -> Self {
        let vendor = vendor.to_lowercase();
        let os = os.to_lowercase();
        if vendor.contains("mikrotik") || vendor.contains("routerboard") || os.contains("mikrotik")
        {
            Self::MikroTik
        } else if vendor.contains("cisco") || os.contains("cisco") {
            Self::Cisco
        } else if os.contains("linux") {
            Self::Linux
        } else {
            Self::Unknown
        }
    }

    /// Command that turns on the device's SNMP agent, if it has one we manage.
    pub fn snmp_enable_command(&self) -> Option<&'static str> {
        match self {
            Self::MikroTik => Some("/snmp set enabled=yes"),
            _ => None,
        }
    }

    /// Command that prints the running configuration.
    pub fn export_command(&self) -> Option<&'static str> {
        match self {
            Self::MikroTik => Some("export"),
            Self::Cisco => Some("show running-config"),
            Self::Linux | Self::Unknown => None,
        }
    }
}
