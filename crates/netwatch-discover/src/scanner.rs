//! Host scanning capability and its nmap-backed implementation.
//!
//! Executes nmap as a child process via `tokio::process::Command` and
//! parses the XML output into typed Rust structs. The orchestration code
//! only sees the [`HostScanner`] trait so it can run against fakes.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Instant;

use tokio::process::Command;

use crate::config::ScanPhase;
use crate::error::{DiscoverError, Result};
use crate::nmap_xml::{self, NmapHost, NmapRun};

/// A host that answered the liveness sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepHost {
    pub ip: String,
    pub mac: Option<String>,
    pub hostname: Option<String>,
}

/// Best OS fingerprint for a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsGuess {
    pub name: String,
    /// Confidence in percent, as reported by the scanner.
    pub accuracy: u8,
}

/// Port and OS findings for one host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    pub open_ports: BTreeSet<u16>,
    pub os: Option<OsGuess>,
}

/// Liveness, port, and OS scanning keyed by CIDR or IP.
pub trait HostScanner: Send + Sync + 'static {
    /// Liveness-only sweep of a subnet.
    fn sweep(&self, cidr: &str) -> impl Future<Output = Result<Vec<SweepHost>>> + Send;

    /// Fast port scan plus OS fingerprint of a single host.
    fn probe(&self, ip: &str) -> impl Future<Output = Result<ProbeReport>> + Send;
}

/// Wrapper around the nmap binary.
pub struct NmapScanner {
    nmap_path: String,
}

impl NmapScanner {
    pub fn new(nmap_path: &str) -> Self {
        Self {
            nmap_path: nmap_path.to_string(),
        }
    }

    /// Verify nmap is installed and accessible.
    pub async fn verify_installation(&self) -> Result<String> {
        let output = Command::new(&self.nmap_path)
            .arg("--version")
            .output()
            .await
            .map_err(|_| DiscoverError::NmapNotFound {
                path: self.nmap_path.clone(),
            })?;

        String::from_utf8(output.stdout).map_err(|e| DiscoverError::XmlParse(e.to_string()))
    }

    /// Run nmap for one phase against `target` and parse its XML output.
    async fn run(&self, target: &str, phase: ScanPhase) -> Result<NmapRun> {
        let start = Instant::now();

        let output = Command::new(&self.nmap_path)
            .args(phase.nmap_flags())
            .arg("-oX")
            .arg("-")
            .arg("--noninteractive")
            .arg(target)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    DiscoverError::NmapNotFound {
                        path: self.nmap_path.clone(),
                    }
                }
                _ => DiscoverError::Io(e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(DiscoverError::NmapFailed {
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        let run = nmap_xml::parse_nmap_xml(&output.stdout)?;

        tracing::debug!(
            target = %target,
            phase = ?phase,
            hosts = run.hosts.len(),
            duration_ms = start.elapsed().as_millis(),
            "Nmap run complete"
        );

        Ok(run)
    }
}

impl HostScanner for NmapScanner {
    async fn sweep(&self, cidr: &str) -> Result<Vec<SweepHost>> {
        let run = self.run(cidr, ScanPhase::Sweep).await?;
        Ok(sweep_hosts(&run))
    }

    async fn probe(&self, ip: &str) -> Result<ProbeReport> {
        let run = self.run(ip, ScanPhase::Probe).await?;
        let host = run
            .host(ip)
            .filter(|h| h.is_up())
            .ok_or_else(|| DiscoverError::HostMissing(ip.to_string()))?;
        Ok(probe_report(host))
    }
}

/// Live hosts from a sweep run, in nmap's order.
pub fn sweep_hosts(run: &NmapRun) -> Vec<SweepHost> {
    run.hosts
        .iter()
        .filter(|h| h.is_up())
        .filter_map(|h| {
            Some(SweepHost {
                ip: h.ipv4()?.to_string(),
                mac: h.mac().map(String::from),
                hostname: h.hostname().map(String::from),
            })
        })
        .collect()
}

fn probe_report(host: &NmapHost) -> ProbeReport {
    ProbeReport {
        open_ports: host.open_tcp_ports(),
        os: host.best_os().map(|m| OsGuess {
            name: m.name.clone(),
            accuracy: m
                .accuracy
                .as_deref()
                .and_then(|a| a.trim().parse().ok())
                .unwrap_or(0),
        }),
    }
}
