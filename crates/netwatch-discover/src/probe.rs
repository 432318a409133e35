//! Bounded-concurrency port/OS probing.
//!
//! One tokio task per host, gated by a semaphore. A failed probe only
//! affects its own host, which keeps the skeleton defaults (no ports,
//! unknown OS, 0% accuracy).

use std::sync::Arc;

use chrono::Utc;
use netwatch_core::{Device, DeviceSkeleton};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::scanner::HostScanner;

/// Probe every skeleton and return devices in input order.
pub async fn probe_all<S: HostScanner>(
    scanner: Arc<S>,
    skeletons: Vec<DeviceSkeleton>,
    max_concurrent: usize,
) -> Vec<Device> {
    let seen_at = Utc::now();
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut slots: Vec<Device> = skeletons
        .into_iter()
        .map(|s| Device::from_skeleton(s, seen_at))
        .collect();

    let mut tasks = JoinSet::new();
    for (index, device) in slots.iter().enumerate() {
        let scanner = scanner.clone();
        let semaphore = semaphore.clone();
        let ip = device.ip.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            (index, scanner.probe(&ip).await)
        });
    }

    let mut failed = 0usize;
    while let Some(joined) = tasks.join_next().await {
        let (index, result) = match joined {
            Ok(r) => r,
            Err(e) => {
                failed += 1;
                tracing::error!(error = %e, "Probe task aborted");
                continue;
            }
        };
        let device = &mut slots[index];
        match result {
            Ok(report) => {
                device.set_ports(report.open_ports);
                if let Some(os) = report.os {
                    device.os = os.name;
                    device.os_accuracy = format!("{}%", os.accuracy);
                }
            }
            Err(e) => {
                failed += 1;
                tracing::warn!(ip = %device.ip, error = %e, "Port/OS probe failed, using defaults");
            }
        }
    }

    tracing::info!(hosts = slots.len(), failed, "Port/OS probe complete");
    slots
}
