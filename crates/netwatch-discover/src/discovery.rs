//! Liveness sweep → device skeletons.

use netwatch_core::types::NOT_AVAILABLE;
use netwatch_core::DeviceSkeleton;

use crate::error::DiscoverError;
use crate::scanner::HostScanner;
use crate::vendor::VendorLookup;

/// Sweep `cidr` and resolve vendor and hostname for every live host.
///
/// Never fails. A missing scanner and a failed sweep both degrade to an
/// empty list, logged differently from a sweep that simply found nothing.
pub async fn discover_hosts<S, V>(scanner: &S, vendors: &V, cidr: &str) -> Vec<DeviceSkeleton>
where
    S: HostScanner,
    V: VendorLookup,
{
    let hosts = match scanner.sweep(cidr).await {
        Ok(hosts) => hosts,
        Err(DiscoverError::NmapNotFound { path }) => {
            tracing::error!(
                cidr = %cidr,
                nmap_path = %path,
                "Host scanner unavailable, discovery degraded to no devices"
            );
            return Vec::new();
        }
        Err(e) => {
            tracing::error!(cidr = %cidr, error = %e, "Liveness sweep failed");
            return Vec::new();
        }
    };

    if hosts.is_empty() {
        tracing::warn!(cidr = %cidr, "Liveness sweep ran but found no hosts");
        return Vec::new();
    }

    let mut skeletons = Vec::with_capacity(hosts.len());
    for host in hosts {
        let mac = host.mac.unwrap_or_else(|| NOT_AVAILABLE.to_string());
        let vendor = vendors.lookup(&mac).await;
        skeletons.push(DeviceSkeleton {
            ip: host.ip,
            mac,
            vendor,
            hostname: host.hostname.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        });
    }

    tracing::info!(cidr = %cidr, hosts = skeletons.len(), "Discovered live hosts");
    skeletons
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::SweepHost;
    use crate::testing::{FakeScanner, FakeVendors};

    #[tokio::test]
    async fn test_skeletons_resolve_vendor_and_defaults() {
        let scanner = FakeScanner::new(vec![
            SweepHost {
                ip: "192.168.1.1".to_string(),
                mac: Some("CC:2D:E0:11:22:33".to_string()),
                hostname: Some("router.lan".to_string()),
            },
            SweepHost {
                ip: "192.168.1.50".to_string(),
                mac: None,
                hostname: None,
            },
        ]);
        let vendors = FakeVendors::new(&[("CC:2D:E0:11:22:33", "Routerboard.com")]);

        let skeletons = discover_hosts(&scanner, &vendors, "192.168.1.0/24").await;
        assert_eq!(skeletons.len(), 2);
        assert_eq!(skeletons[0].vendor, "Routerboard.com");
        assert_eq!(skeletons[0].hostname, "router.lan");
        assert_eq!(skeletons[1].mac, "N/A");
        assert_eq!(skeletons[1].vendor, "Unknown");
        assert_eq!(skeletons[1].hostname, "N/A");
    }

    #[tokio::test]
    async fn test_unavailable_scanner_yields_empty() {
        let scanner = FakeScanner::unavailable();
        let vendors = FakeVendors::new(&[]);
        assert!(discover_hosts(&scanner, &vendors, "192.168.1.0/24").await.is_empty());
    }
}
