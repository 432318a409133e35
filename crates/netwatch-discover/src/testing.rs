//! In-memory capability fakes for unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use netwatch_core::types::{NOT_AVAILABLE, UNKNOWN_VENDOR};
use netwatch_core::{Credential, Device, DeviceSkeleton};

use crate::error::{DiscoverError, Result};
use crate::scanner::{HostScanner, ProbeReport, SweepHost};
use crate::session::{LoginError, RemoteSession, SessionConnector, StreamChunk};
use crate::snmp::SnmpClient;
use crate::vendor::VendorLookup;

pub fn skeleton(ip: &str) -> DeviceSkeleton {
    DeviceSkeleton {
        ip: ip.to_string(),
        mac: NOT_AVAILABLE.to_string(),
        vendor: UNKNOWN_VENDOR.to_string(),
        hostname: NOT_AVAILABLE.to_string(),
    }
}

/// A probed device with the given open ports.
pub fn device(ip: &str, ports: &[u16]) -> Device {
    let mut device = Device::from_skeleton(skeleton(ip), Utc::now());
    device.set_ports(ports.iter().copied().collect());
    device
}

// ── Scanner ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeScanner {
    hosts: Mutex<Vec<SweepHost>>,
    unavailable: bool,
    probes: HashMap<String, ProbeReport>,
    failing_probes: HashSet<String>,
    probe_delay: Option<Duration>,
    sweeps: AtomicUsize,
    active_probes: AtomicUsize,
    max_active_probes: AtomicUsize,
}

impl FakeScanner {
    pub fn new(hosts: Vec<SweepHost>) -> Self {
        Self {
            hosts: Mutex::new(hosts),
            ..Default::default()
        }
    }

    /// A scanner whose binary is missing.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }

    pub fn with_probe(mut self, ip: &str, report: ProbeReport) -> Self {
        self.probes.insert(ip.to_string(), report);
        self
    }

    pub fn with_failing_probe(mut self, ip: &str) -> Self {
        self.failing_probes.insert(ip.to_string());
        self
    }

    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = Some(delay);
        self
    }

    /// Replace the hosts answering later sweeps.
    pub fn set_hosts(&self, hosts: Vec<SweepHost>) {
        *self.hosts.lock().unwrap() = hosts;
    }

    pub fn sweeps(&self) -> usize {
        self.sweeps.load(Ordering::SeqCst)
    }

    pub fn max_active_probes(&self) -> usize {
        self.max_active_probes.load(Ordering::SeqCst)
    }
}

impl HostScanner for FakeScanner {
    async fn sweep(&self, _cidr: &str) -> Result<Vec<SweepHost>> {
        if self.unavailable {
            return Err(DiscoverError::NmapNotFound {
                path: "nmap".to_string(),
            });
        }
        self.sweeps.fetch_add(1, Ordering::SeqCst);
        Ok(self.hosts.lock().unwrap().clone())
    }

    async fn probe(&self, ip: &str) -> Result<ProbeReport> {
        let now = self.active_probes.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_probes.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.probe_delay {
            tokio::time::sleep(delay).await;
        }
        self.active_probes.fetch_sub(1, Ordering::SeqCst);

        if self.failing_probes.contains(ip) {
            return Err(DiscoverError::HostMissing(ip.to_string()));
        }
        Ok(self.probes.get(ip).cloned().unwrap_or_default())
    }
}

// ── Vendors ───────────────────────────────────────────────────────

pub struct FakeVendors {
    known: HashMap<String, String>,
}

impl FakeVendors {
    pub fn new(known: &[(&str, &str)]) -> Self {
        Self {
            known: known
                .iter()
                .map(|(mac, vendor)| (mac.to_string(), vendor.to_string()))
                .collect(),
        }
    }
}

impl VendorLookup for FakeVendors {
    async fn lookup(&self, mac: &str) -> String {
        self.known
            .get(mac)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_VENDOR.to_string())
    }
}

// ── SNMP ──────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeSnmp {
    values: HashMap<(String, String), String>,
    hanging: bool,
}

impl FakeSnmp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `oid` on `ip` with `<oid> = {typed_value}`.
    pub fn with_value(mut self, ip: &str, oid: &str, typed_value: &str) -> Self {
        self.values
            .insert((ip.to_string(), oid.to_string()), typed_value.to_string());
        self
    }

    /// Every query blocks forever.
    pub fn hanging(mut self) -> Self {
        self.hanging = true;
        self
    }
}

impl SnmpClient for FakeSnmp {
    async fn get(&self, ip: &str, oid: &str, _community: &str, _timeout: Duration) -> Result<String> {
        if self.hanging {
            std::future::pending::<()>().await;
        }
        match self.values.get(&(ip.to_string(), oid.to_string())) {
            Some(value) => Ok(format!("{oid} = {value}")),
            None => Err(DiscoverError::Snmp(format!("Timeout: No Response from {ip}"))),
        }
    }
}

// ── Sessions ──────────────────────────────────────────────────────

#[derive(Default)]
struct ConnectorScript {
    accepted: HashMap<String, Credential>,
    unreachable: HashSet<String>,
    export_chunks: HashMap<String, Vec<String>>,
    endless_exports: HashSet<String>,
    broken_exports: HashSet<String>,
    failing_commands: HashSet<String>,
}

/// Scripted session connector recording every attempt and command.
#[derive(Clone, Default)]
pub struct FakeConnector {
    script: Arc<ConnectorScript>,
    attempts: Arc<Mutex<Vec<(String, u16, Credential)>>>,
    commands: Arc<Mutex<Vec<(String, String)>>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn script_mut(&mut self) -> &mut ConnectorScript {
        Arc::get_mut(&mut self.script).expect("script is only edited before sharing")
    }

    /// `credential` is the only one `ip` accepts.
    pub fn accept(mut self, ip: &str, credential: Credential) -> Self {
        self.script_mut().accepted.insert(ip.to_string(), credential);
        self
    }

    pub fn unreachable(mut self, ip: &str) -> Self {
        self.script_mut().unreachable.insert(ip.to_string());
        self
    }

    /// Stream `chunks` as the output of any long-running command on `ip`.
    pub fn with_export(mut self, ip: &str, chunks: &[&str]) -> Self {
        self.script_mut()
            .export_chunks
            .insert(ip.to_string(), chunks.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Long-running commands on `ip` never signal completion.
    pub fn with_endless_export(mut self, ip: &str) -> Self {
        self.script_mut().endless_exports.insert(ip.to_string());
        self
    }

    /// Stream `chunks`, then fail the read instead of finishing.
    pub fn with_broken_export(mut self, ip: &str, chunks: &[&str]) -> Self {
        self = self.with_export(ip, chunks);
        self.script_mut().broken_exports.insert(ip.to_string());
        self
    }

    pub fn failing_command(mut self, command: &str) -> Self {
        self.script_mut().failing_commands.insert(command.to_string());
        self
    }

    pub fn attempts(&self) -> Vec<(String, u16, Credential)> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempts_for(&self, ip: &str) -> Vec<Credential> {
        self.attempts()
            .into_iter()
            .filter(|(attempt_ip, _, _)| attempt_ip == ip)
            .map(|(_, _, credential)| credential)
            .collect()
    }

    pub fn commands_for(&self, ip: &str) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|(command_ip, _)| command_ip == ip)
            .map(|(_, command)| command.clone())
            .collect()
    }
}

impl SessionConnector for FakeConnector {
    type Session = FakeSession;

    async fn connect(
        &self,
        ip: &str,
        port: u16,
        credential: &Credential,
        _timeout: Duration,
    ) -> std::result::Result<FakeSession, LoginError> {
        self.attempts
            .lock()
            .unwrap()
            .push((ip.to_string(), port, credential.clone()));

        if self.script.unreachable.contains(ip) {
            return Err(LoginError::Connection(format!("{ip}:{port} timed out")));
        }
        if self.script.accepted.get(ip) != Some(credential) {
            return Err(LoginError::Auth);
        }
        Ok(FakeSession {
            ip: ip.to_string(),
            script: self.script.clone(),
            commands: self.commands.clone(),
            pending: VecDeque::new(),
            streaming: false,
        })
    }
}

pub struct FakeSession {
    ip: String,
    script: Arc<ConnectorScript>,
    commands: Arc<Mutex<Vec<(String, String)>>>,
    pending: VecDeque<String>,
    streaming: bool,
}

impl FakeSession {
    fn record(&self, command: &str) -> Result<()> {
        self.commands
            .lock()
            .unwrap()
            .push((self.ip.clone(), command.to_string()));
        if self.script.failing_commands.contains(command) {
            return Err(DiscoverError::Session(format!("{command}: bad command name")));
        }
        Ok(())
    }
}

impl RemoteSession for FakeSession {
    async fn exec(&mut self, command: &str) -> Result<String> {
        self.record(command)?;
        Ok(String::new())
    }

    async fn start(&mut self, command: &str) -> Result<()> {
        self.record(command)?;
        self.pending = self
            .script
            .export_chunks
            .get(&self.ip)
            .cloned()
            .unwrap_or_default()
            .into();
        self.streaming = true;
        Ok(())
    }

    async fn read_available(&mut self) -> Result<StreamChunk> {
        if self.script.endless_exports.contains(&self.ip) {
            return Ok(StreamChunk {
                data: "# ...\n".to_string(),
                finished: false,
            });
        }
        let broken = self.script.broken_exports.contains(&self.ip);
        match self.pending.pop_front() {
            Some(data) => Ok(StreamChunk {
                data,
                finished: self.pending.is_empty() && !broken,
            }),
            None if self.streaming && broken => {
                Err(DiscoverError::Session("channel reset by peer".to_string()))
            }
            None => Ok(StreamChunk {
                data: String::new(),
                finished: true,
            }),
        }
    }

    async fn close(self) {}
}
