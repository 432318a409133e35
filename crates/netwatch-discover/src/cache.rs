//! The shared device cache and credential memo.
//!
//! Devices and credential records live behind one `RwLock`, so the periodic
//! merge and out-of-cycle login updates serialize on the same lock and a
//! reader always sees a complete cache.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use netwatch_core::{CredentialRecord, Device, SnmpData, SshStatus};
use tokio::sync::RwLock;

use crate::persist::SnapshotWriter;

/// Outcome of merging one cycle into the cache.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub total: u32,
    /// IPs not present before this merge.
    pub added: Vec<String>,
    pub retained: u32,
    /// IPs present before but missing from this cycle.
    pub dropped: Vec<String>,
}

#[derive(Debug, Default)]
struct CacheState {
    devices: Vec<Device>,
    credentials: HashMap<String, CredentialRecord>,
}

/// Cloneable handle to the process-wide device cache.
#[derive(Debug, Clone, Default)]
pub struct DeviceCache {
    state: Arc<RwLock<CacheState>>,
}

impl DeviceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every cached device, in scan order.
    pub async fn devices(&self) -> Vec<Device> {
        self.state.read().await.devices.clone()
    }

    pub async fn device(&self, ip: &str) -> Option<Device> {
        self.state
            .read()
            .await
            .devices
            .iter()
            .find(|d| d.ip == ip)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.devices.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Replace the cache with `fresh`, carrying telemetry forward.
    pub async fn merge(&self, fresh: Vec<Device>) -> MergeSummary {
        let mut state = self.state.write().await;
        let (merged, summary) = merge_devices(&state.devices, fresh, &state.credentials);
        state.devices = merged;
        summary
    }

    // ── Credential memo ──────────────────────────────────────────

    pub async fn credential(&self, ip: &str) -> Option<CredentialRecord> {
        self.state.read().await.credentials.get(ip).cloned()
    }

    pub async fn has_credential(&self, ip: &str) -> bool {
        self.state.read().await.credentials.contains_key(ip)
    }

    /// IPs that already carry a classification.
    pub async fn classified_ips(&self) -> HashSet<String> {
        self.state.read().await.credentials.keys().cloned().collect()
    }

    /// Store a classification, overwriting any earlier one, and mirror its
    /// status onto the cached device.
    pub async fn store_credential(&self, ip: &str, record: CredentialRecord) {
        let mut state = self.state.write().await;
        if let Some(device) = state.devices.iter_mut().find(|d| d.ip == ip) {
            device.ssh_status = record.status;
        }
        state.credentials.insert(ip.to_string(), record);
    }

    /// Store a classification only if `ip` has none yet.
    ///
    /// The check and the insert happen under one write guard, so a manual
    /// login that lands while a cycle is working never gets overwritten by
    /// that cycle. Returns whether `record` was stored.
    pub async fn store_credential_if_unclassified(&self, ip: &str, record: CredentialRecord) -> bool {
        let mut state = self.state.write().await;
        if state.credentials.contains_key(ip) {
            return false;
        }
        if let Some(device) = state.devices.iter_mut().find(|d| d.ip == ip) {
            device.ssh_status = record.status;
        }
        state.credentials.insert(ip.to_string(), record);
        true
    }

    /// Clear the classification for `ip` so later cycles retry it.
    ///
    /// Returns whether a record existed.
    pub async fn disconnect(&self, ip: &str) -> bool {
        let mut state = self.state.write().await;
        if let Some(device) = state.devices.iter_mut().find(|d| d.ip == ip) {
            device.ssh_status = SshStatus::NotAttempted;
        }
        state.credentials.remove(ip).is_some()
    }

    /// Attach harvested telemetry to a cached device. Empty values never
    /// replace populated ones.
    ///
    /// Returns the updated device, or `None` when `ip` is not cached.
    pub async fn record_telemetry(&self, ip: &str, snmp: SnmpData, export: String) -> Option<Device> {
        let mut state = self.state.write().await;
        let device = state.devices.iter_mut().find(|d| d.ip == ip)?;
        if !snmp.is_empty() {
            device.set_snmp(snmp);
        }
        if !export.is_empty() {
            device.export = export;
        }
        Some(device.clone())
    }

    /// Write the full-cache snapshot.
    ///
    /// The read guard is held for the duration of the write, so no mutation
    /// can land between reading the list and writing it, and writes complete
    /// in the same order as the mutations they follow.
    pub async fn write_snapshot(&self, writer: &SnapshotWriter) {
        let state = self.state.read().await;
        writer.write_cache_logged(&state.devices);
    }
}

/// Build the next cache from `previous` and a fresh scan.
///
/// Hosts missing from `fresh` are dropped. For hosts seen again, empty
/// `snmp`/`export` inherit the previous values, and `ssh_status` follows the
/// credential record when one exists. Duplicate IPs in `fresh` keep the
/// first entry.
pub fn merge_devices(
    previous: &[Device],
    fresh: Vec<Device>,
    credentials: &HashMap<String, CredentialRecord>,
) -> (Vec<Device>, MergeSummary) {
    let previous_by_ip: HashMap<&str, &Device> =
        previous.iter().map(|d| (d.ip.as_str(), d)).collect();

    let mut summary = MergeSummary::default();
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(fresh.len());

    for mut device in fresh {
        if !seen.insert(device.ip.clone()) {
            continue;
        }

        match previous_by_ip.get(device.ip.as_str()) {
            Some(prev) => {
                summary.retained += 1;
                if device.snmp.is_empty() && !prev.snmp.is_empty() {
                    device.snmp = prev.snmp.clone();
                }
                if device.export.is_empty() && !prev.export.is_empty() {
                    device.export = prev.export.clone();
                }
            }
            None => summary.added.push(device.ip.clone()),
        }

        if let Some(record) = credentials.get(&device.ip) {
            device.ssh_status = record.status;
        }
        device.refresh_uptime();
        merged.push(device);
    }

    summary.dropped = previous
        .iter()
        .filter(|d| !seen.contains(&d.ip))
        .map(|d| d.ip.clone())
        .collect();
    summary.total = merged.len() as u32;

    (merged, summary)
}
