//! Public handle consumed by presentation collaborators.

use std::sync::Arc;

use netwatch_core::events::DiscoveryEvent;
use netwatch_core::{Credential, Device, SshStatus};
use tokio::sync::broadcast;

use crate::config::DiscoverConfig;
use crate::error::Result;
use crate::pipeline::{Capabilities, Pipeline};
use crate::scanner::HostScanner;
use crate::scheduler::{RescanScheduler, RescanTrigger, ScanState, TriggerAck};
use crate::session::SessionConnector;
use crate::snmp::SnmpClient;
use crate::subnet;
use crate::vendor::VendorLookup;

/// Cloneable entry point to a running engine.
///
/// The scheduler returned by [`Netwatch::new`] keeps running for as long as
/// at least one handle is alive.
pub struct Netwatch<S, V, C, N> {
    pipeline: Arc<Pipeline<S, V, C, N>>,
    trigger: RescanTrigger,
}

impl<S, V, C, N> Clone for Netwatch<S, V, C, N> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
            trigger: self.trigger.clone(),
        }
    }
}

impl<S, V, C, N> Netwatch<S, V, C, N>
where
    S: HostScanner,
    V: VendorLookup,
    C: SessionConnector,
    N: SnmpClient,
{
    /// Build the engine. The caller spawns the returned scheduler's `run()`.
    pub fn new(
        config: DiscoverConfig,
        capabilities: Capabilities<S, V, C, N>,
    ) -> (Self, RescanScheduler<Pipeline<S, V, C, N>>) {
        let interval = config.scan_interval();
        let pipeline = Arc::new(Pipeline::new(config, capabilities));
        let (scheduler, trigger) = RescanScheduler::new(pipeline.clone(), interval);
        (Self { pipeline, trigger }, scheduler)
    }

    /// Request a cycle, subject to the single-flight policy.
    pub fn trigger_rescan(&self) -> TriggerAck {
        let ack = self.trigger.trigger();
        tracing::debug!(ack = ?ack, "Rescan requested");
        ack
    }

    pub fn scan_state(&self) -> ScanState {
        self.trigger.state()
    }

    /// Snapshot of the device cache.
    pub async fn devices(&self) -> Vec<Device> {
        self.pipeline.cache().devices().await
    }

    /// Log in to a cached device with operator credentials and harvest it.
    pub async fn submit_credentials(
        &self,
        ip: &str,
        username: &str,
        password: &str,
    ) -> Result<SshStatus> {
        self.pipeline
            .bootstrapper()
            .manual_login(ip, Credential::new(username, password))
            .await
    }

    /// Forget the login classification for `ip`. Returns whether one existed.
    pub async fn disconnect(&self, ip: &str) -> bool {
        let existed = self.pipeline.cache().disconnect(ip).await;
        tracing::info!(ip = %ip, existed, "Credential record cleared");
        if existed {
            self.pipeline
                .cache()
                .write_snapshot(self.pipeline.writer())
                .await;
        }
        existed
    }

    pub async fn detect_subnet(&self) -> String {
        subnet::detect_subnet(&self.pipeline.config().fallback_cidr).await
    }

    pub async fn lookup_vendor(&self, mac: &str) -> String {
        self.pipeline.vendors().lookup(mac).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.pipeline.events().subscribe()
    }
}
