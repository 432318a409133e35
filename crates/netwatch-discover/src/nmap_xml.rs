//! Nmap XML output deserialization.
//!
//! Both the liveness sweep and the per-host probe run nmap with `-oX -`.
//! Only the elements the engine reads are modelled; `quick-xml` skips the rest.

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::error::{DiscoverError, Result};

/// Root element: `<nmaprun>`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename = "nmaprun")]
pub struct NmapRun {
    #[serde(rename = "host", default)]
    pub hosts: Vec<NmapHost>,
}

/// A single host from scan results.
#[derive(Debug, Clone, Deserialize)]
pub struct NmapHost {
    pub status: Option<HostStatus>,
    #[serde(rename = "address", default)]
    pub addresses: Vec<Address>,
    pub hostnames: Option<Hostnames>,
    pub ports: Option<Ports>,
    pub os: Option<OsMatches>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostStatus {
    #[serde(rename = "@state")]
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Address {
    #[serde(rename = "@addr")]
    pub addr: String,
    #[serde(rename = "@addrtype")]
    pub addr_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hostnames {
    #[serde(rename = "hostname", default)]
    pub hostnames: Vec<Hostname>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hostname {
    #[serde(rename = "@name")]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ports {
    #[serde(rename = "port", default)]
    pub ports: Vec<NmapPort>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NmapPort {
    #[serde(rename = "@protocol")]
    pub protocol: String,
    #[serde(rename = "@portid")]
    pub port_id: u16,
    pub state: PortState,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortState {
    #[serde(rename = "@state")]
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsMatches {
    #[serde(rename = "osmatch", default)]
    pub matches: Vec<OsMatch>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsMatch {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@accuracy")]
    pub accuracy: Option<String>,
}

impl NmapRun {
    /// Find a host entry by its IPv4 address.
    pub fn host(&self, ip: &str) -> Option<&NmapHost> {
        self.hosts.iter().find(|h| h.ipv4() == Some(ip))
    }
}

impl NmapHost {
    /// Extract the IPv4 address, if present.
    pub fn ipv4(&self) -> Option<&str> {
        self.addresses
            .iter()
            .find(|a| a.addr_type == "ipv4")
            .map(|a| a.addr.as_str())
    }

    /// Extract the MAC address, if present. Nmap only reports it for
    /// hosts on the local segment when run with raw-socket privileges.
    pub fn mac(&self) -> Option<&str> {
        self.addresses
            .iter()
            .find(|a| a.addr_type == "mac")
            .map(|a| a.addr.as_str())
    }

    /// Extract the first non-empty hostname, if present.
    pub fn hostname(&self) -> Option<&str> {
        self.hostnames
            .as_ref()
            .and_then(|hn| hn.hostnames.iter().find(|h| !h.name.is_empty()))
            .map(|h| h.name.as_str())
    }

    /// Check if the host is up.
    pub fn is_up(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.state == "up")
    }

    /// TCP ports reported as open.
    pub fn open_tcp_ports(&self) -> BTreeSet<u16> {
        self.ports
            .iter()
            .flat_map(|p| p.ports.iter())
            .filter(|p| p.protocol == "tcp" && p.state.state == "open")
            .map(|p| p.port_id)
            .collect()
    }

    /// The best OS match (nmap lists matches by descending accuracy).
    pub fn best_os(&self) -> Option<&OsMatch> {
        self.os.as_ref().and_then(|os| os.matches.first())
    }
}

/// Parse nmap XML bytes into a structured `NmapRun`.
pub fn parse_nmap_xml(xml: &[u8]) -> Result<NmapRun> {
    quick_xml::de::from_reader(xml).map_err(|e| DiscoverError::XmlParse(format!("{e}")))
}
