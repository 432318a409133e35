//! Snapshot persistence for the presentation layer.
//!
//! Every artifact is a single file overwritten on each write:
//! ```text
//! {output_dir}/
//!   scans/
//!     scan_results.json          full device list
//!     snmp_data_{ip}.json        {"snmp": {...}, "export": "..."}
//!   exports/
//!     export_output_{ip}.txt     raw configuration export
//! ```
//! Files are written to a sibling temporary and renamed into place, so a
//! reader sees either the previous snapshot or the new one. Nothing here is
//! read back on restart.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use netwatch_core::{Device, SnmpData};
use serde::Serialize;

use crate::error::Result;

#[derive(Serialize)]
struct DeviceSnapshot<'a> {
    snmp: &'a SnmpData,
    export: &'a str,
}

/// Writes snapshots under a root directory.
///
/// Clones share one lock around the full-cache snapshot, so writers from
/// the scan loop and from operator requests never interleave.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    root: PathBuf,
    cache_lock: Arc<Mutex<()>>,
}

impl SnapshotWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn cache_path(&self) -> PathBuf {
        self.root.join("scans").join("scan_results.json")
    }

    pub fn device_snapshot_path(&self, ip: &str) -> PathBuf {
        self.root.join("scans").join(format!("snmp_data_{ip}.json"))
    }

    pub fn export_path(&self, ip: &str) -> PathBuf {
        self.root
            .join("exports")
            .join(format!("export_output_{ip}.txt"))
    }

    /// Write the full device list.
    pub fn write_cache(&self, devices: &[Device]) -> Result<()> {
        let json = serde_json::to_string_pretty(devices)?;
        let path = self.cache_path();
        // The guarded value carries no state, so a poisoned lock is still usable.
        let _guard = self.cache_lock.lock().unwrap_or_else(|e| e.into_inner());
        write_file(&path, json.as_bytes())?;
        tracing::debug!(path = %path.display(), devices = devices.len(), "Cache snapshot written");
        Ok(())
    }

    /// Write one device's SNMP map together with its export text.
    pub fn write_device_snapshot(&self, ip: &str, snmp: &SnmpData, export: &str) -> Result<()> {
        let json = serde_json::to_string_pretty(&DeviceSnapshot { snmp, export })?;
        write_file(&self.device_snapshot_path(ip), json.as_bytes())
    }

    /// Write the raw export. Empty exports are skipped.
    pub fn write_export(&self, ip: &str, export: &str) -> Result<()> {
        if export.is_empty() {
            return Ok(());
        }
        write_file(&self.export_path(ip), export.as_bytes())
    }

    /// [`write_cache`](Self::write_cache) with failures logged instead of returned.
    pub fn write_cache_logged(&self, devices: &[Device]) {
        if let Err(e) = self.write_cache(devices) {
            tracing::warn!(path = %self.cache_path().display(), error = %e, "Failed to write cache snapshot");
        }
    }
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut staged = tempfile::NamedTempFile::new_in(parent)?;
    staged.write_all(contents)?;
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}
