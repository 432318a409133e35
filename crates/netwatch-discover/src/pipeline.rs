//! One discovery cycle, end to end.
//!
//! subnet → liveness sweep → port/OS probe → snapshot → credential bootstrap
//! → cache merge → snapshot → events.
//!
//! No stage can fail the cycle: every per-host or per-capability failure has
//! already been turned into a classification value by the time it reaches
//! the merge.

use std::sync::Arc;
use std::time::{Duration, Instant};

use netwatch_core::events::EventPayload;
use uuid::Uuid;

use crate::bootstrap::CredentialBootstrapper;
use crate::cache::DeviceCache;
use crate::config::DiscoverConfig;
use crate::discovery::discover_hosts;
use crate::events::EventBus;
use crate::persist::SnapshotWriter;
use crate::probe::probe_all;
use crate::scanner::HostScanner;
use crate::scheduler::ScanCycle;
use crate::session::SessionConnector;
use crate::snmp::SnmpClient;
use crate::subnet;
use crate::vendor::VendorLookup;

/// The pluggable capabilities a pipeline drives.
pub struct Capabilities<S, V, C, N> {
    pub scanner: S,
    pub vendors: V,
    pub connector: C,
    pub snmp: N,
}

/// Summary of a finished cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub cidr: String,
    pub devices: u32,
    pub added: u32,
    pub dropped: u32,
    pub duration: Duration,
}

pub struct Pipeline<S, V, C, N> {
    config: DiscoverConfig,
    scanner: Arc<S>,
    vendors: V,
    bootstrapper: CredentialBootstrapper<C, N>,
    cache: DeviceCache,
    writer: SnapshotWriter,
    events: EventBus,
}

impl<S, V, C, N> Pipeline<S, V, C, N>
where
    S: HostScanner,
    V: VendorLookup,
    C: SessionConnector,
    N: SnmpClient,
{
    pub fn new(config: DiscoverConfig, capabilities: Capabilities<S, V, C, N>) -> Self {
        let cache = DeviceCache::new();
        let writer = SnapshotWriter::new(&config.output_dir);
        let events = EventBus::default();
        let bootstrapper = CredentialBootstrapper::new(
            capabilities.connector,
            capabilities.snmp,
            &config,
            cache.clone(),
            writer.clone(),
            events.clone(),
        );

        Self {
            scanner: Arc::new(capabilities.scanner),
            vendors: capabilities.vendors,
            bootstrapper,
            cache,
            writer,
            events,
            config,
        }
    }

    pub fn cache(&self) -> &DeviceCache {
        &self.cache
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn writer(&self) -> &SnapshotWriter {
        &self.writer
    }

    pub fn bootstrapper(&self) -> &CredentialBootstrapper<C, N> {
        &self.bootstrapper
    }

    pub fn vendors(&self) -> &V {
        &self.vendors
    }

    pub fn config(&self) -> &DiscoverConfig {
        &self.config
    }

    /// The configured target, or the detected local subnet.
    pub async fn resolve_cidr(&self) -> String {
        match &self.config.target {
            Some(target) => target.clone(),
            None => subnet::detect_subnet(&self.config.fallback_cidr).await,
        }
    }

    /// Execute a single cycle and publish its outcome.
    pub async fn run_cycle(&self) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        let start = Instant::now();
        let cidr = self.resolve_cidr().await;

        tracing::info!(cycle_id = %cycle_id, cidr = %cidr, "Scan cycle started");
        self.events.publish(EventPayload::CycleStarted {
            cycle_id,
            cidr: cidr.clone(),
        });

        let skeletons = discover_hosts(self.scanner.as_ref(), &self.vendors, &cidr).await;
        let mut devices = probe_all(
            self.scanner.clone(),
            skeletons,
            self.config.max_concurrent_probes,
        )
        .await;
        self.writer.write_cache_logged(&devices);

        self.bootstrapper.attempt_logins(&mut devices).await;

        let summary = self.cache.merge(devices).await;
        self.cache.write_snapshot(&self.writer).await;
        let snapshot = self.cache.devices().await;

        for device in snapshot.iter().filter(|d| summary.added.contains(&d.ip)) {
            self.events.publish(EventPayload::HostDiscovered {
                ip: device.ip.clone(),
                mac: device.mac.clone(),
                vendor: device.vendor.clone(),
            });
        }
        for ip in &summary.dropped {
            self.events.publish(EventPayload::HostVanished { ip: ip.clone() });
        }

        let report = CycleReport {
            cycle_id,
            cidr,
            devices: summary.total,
            added: summary.added.len() as u32,
            dropped: summary.dropped.len() as u32,
            duration: start.elapsed(),
        };

        tracing::info!(
            cycle_id = %cycle_id,
            cidr = %report.cidr,
            devices = report.devices,
            added = report.added,
            retained = summary.retained,
            dropped = report.dropped,
            duration_ms = report.duration.as_millis(),
            "Scan cycle complete"
        );
        self.events.publish(EventPayload::CycleCompleted {
            cycle_id,
            devices: report.devices,
            added: report.added,
            dropped: report.dropped,
            duration_ms: report.duration.as_millis() as u64,
        });

        report
    }
}

impl<S, V, C, N> ScanCycle for Pipeline<S, V, C, N>
where
    S: HostScanner,
    V: VendorLookup,
    C: SessionConnector,
    N: SnmpClient,
{
    async fn run_cycle(&self) -> CycleReport {
        Pipeline::run_cycle(self).await
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use netwatch_core::{Credential, SshStatus};

    use super::*;
    use crate::scanner::{OsGuess, ProbeReport, SweepHost};
    use crate::testing::{FakeConnector, FakeScanner, FakeSnmp, FakeVendors};

    fn host(ip: &str, mac: &str) -> SweepHost {
        SweepHost {
            ip: ip.to_string(),
            mac: Some(mac.to_string()),
            hostname: None,
        }
    }

    fn pipeline(
        scanner: FakeScanner,
        connector: FakeConnector,
        dir: &tempfile::TempDir,
    ) -> Pipeline<FakeScanner, FakeVendors, FakeConnector, FakeSnmp> {
        let config = DiscoverConfig {
            target: Some("192.168.1.0/24".to_string()),
            output_dir: dir.path().display().to_string(),
            snmp_settle_secs: 0,
            ..DiscoverConfig::default()
        };
        Pipeline::new(
            config,
            Capabilities {
                scanner,
                vendors: FakeVendors::new(&[("CC:2D:E0:00:00:01", "Routerboard.com")]),
                connector,
                snmp: FakeSnmp::new(),
            },
        )
    }

    #[tokio::test]
    async fn test_cycle_populates_cache_and_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = FakeScanner::new(vec![
            host("192.168.1.1", "CC:2D:E0:00:00:01"),
            host("192.168.1.20", "00:11:22:33:44:55"),
        ])
        .with_probe(
            "192.168.1.1",
            ProbeReport {
                open_ports: [22, 8291].into_iter().collect(),
                os: Some(OsGuess {
                    name: "MikroTik RouterOS 6.X".to_string(),
                    accuracy: 97,
                }),
            },
        );
        let connector = FakeConnector::new().accept("192.168.1.1", Credential::new("admin", ""));
        let pipeline = pipeline(scanner, connector, &dir);
        let mut rx = pipeline.events().subscribe();

        let report = pipeline.run_cycle().await;
        assert_eq!(report.devices, 2);
        assert_eq!(report.added, 2);
        assert_eq!(report.cidr, "192.168.1.0/24");

        let router = pipeline.cache().device("192.168.1.1").await.unwrap();
        assert_eq!(router.vendor, "Routerboard.com");
        assert_eq!(router.ssh_status, SshStatus::AutoLoginOk);
        assert_eq!(router.snmp.len(), 10);

        let other = pipeline.cache().device("192.168.1.20").await.unwrap();
        assert_eq!(other.ssh_status, SshStatus::NotAttempted);
        assert!(other.ssh_telnet_missing);

        let json = fs::read_to_string(dir.path().join("scans/scan_results.json")).unwrap();
        assert!(json.contains("\"auto_login_ok\""));
        assert!(dir.path().join("scans/snmp_data_192.168.1.1.json").exists());

        let first = rx.recv().await.unwrap();
        assert!(matches!(first.payload, EventPayload::CycleStarted { .. }));
    }

    #[tokio::test]
    async fn test_vanished_hosts_leave_and_telemetry_carries() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = FakeScanner::new(vec![
            host("192.168.1.1", "CC:2D:E0:00:00:01"),
            host("192.168.1.30", "00:11:22:33:44:66"),
        ])
        .with_probe(
            "192.168.1.1",
            ProbeReport {
                open_ports: [22].into_iter().collect(),
                os: None,
            },
        );
        let connector = FakeConnector::new().accept("192.168.1.1", Credential::new("admin", "admin"));
        let pipeline = pipeline(scanner, connector.clone(), &dir);

        pipeline.run_cycle().await;
        let harvested = pipeline.cache().device("192.168.1.1").await.unwrap().snmp;
        assert_eq!(harvested.len(), 10);

        pipeline.scanner.set_hosts(vec![host("192.168.1.1", "CC:2D:E0:00:00:01")]);
        let report = pipeline.run_cycle().await;

        assert_eq!(report.dropped, 1);
        assert!(pipeline.cache().device("192.168.1.30").await.is_none());
        let router = pipeline.cache().device("192.168.1.1").await.unwrap();
        assert_eq!(router.snmp, harvested);
        assert_eq!(router.ssh_status, SshStatus::AutoLoginOk);
        assert_eq!(pipeline.scanner.sweeps(), 2);
        // Classified hosts are not retried.
        assert_eq!(connector.attempts_for("192.168.1.1").len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_scanner_empties_cache() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(FakeScanner::unavailable(), FakeConnector::new(), &dir);

        let report = pipeline.run_cycle().await;
        assert_eq!(report.devices, 0);
        assert!(pipeline.cache().is_empty().await);
        assert_eq!(
            fs::read_to_string(dir.path().join("scans/scan_results.json"))
                .unwrap()
                .trim(),
            "[]"
        );
    }
}
