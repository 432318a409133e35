//! netwatch-discover: Network discovery and credential-bootstrap engine.
//!
//! Sweeps the local subnet with nmap, probes ports and OS per host, tries
//! default credentials on SSH/telnet devices, harvests SNMP and
//! configuration exports after login, and keeps the result in a shared
//! device cache that presentation layers poll through [`Netwatch`].

pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod handle;
pub mod nmap_xml;
pub mod persist;
pub mod pipeline;
pub mod probe;
pub mod scanner;
pub mod scheduler;
pub mod session;
pub mod snmp;
pub mod subnet;
pub mod vendor;

#[cfg(test)]
pub(crate) mod testing;

pub use handle::Netwatch;
pub use pipeline::{Capabilities, Pipeline};
pub use scheduler::{ScanState, TriggerAck};
