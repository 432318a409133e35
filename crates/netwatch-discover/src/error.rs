//! Error types for the netwatch-discover crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("Nmap not found at path: {path}")]
    NmapNotFound { path: String },

    #[error("Nmap exited with code {code}: {stderr}")]
    NmapFailed { code: i32, stderr: String },

    #[error("Failed to parse nmap XML output: {0}")]
    XmlParse(String),

    #[error("Host {0} missing from nmap output")]
    HostMissing(String),

    #[error("Subnet detection failed: {0}")]
    SubnetDetection(String),

    #[error("SNMP query failed: {0}")]
    Snmp(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Vendor lookup failed: {0}")]
    VendorLookup(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Device {0} is not in the cache")]
    UnknownDevice(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DiscoverError>;
