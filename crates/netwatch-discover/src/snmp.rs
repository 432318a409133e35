//! SNMP telemetry collection.
//!
//! A fixed registry of named OIDs is queried one by one against a device.
//! Each query has its own timeout and any failure only marks that label
//! `"N/A"`, so the returned map always carries every registry label.

use std::future::Future;
use std::time::Duration;

use netwatch_core::types::NOT_AVAILABLE;
use netwatch_core::SnmpData;
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::{DiscoverError, Result};

/// Label → OID registry (MIB-II system/interfaces plus MikroTik resource OIDs).
pub const OID_REGISTRY: [(&str, &str); 10] = [
    ("sysDescr", "1.3.6.1.2.1.1.1.0"),
    ("sysUpTime", "1.3.6.1.2.1.1.3.0"),
    ("sysName", "1.3.6.1.2.1.1.5.0"),
    ("cpuLoad", "1.3.6.1.4.1.14988.1.1.3.10.0"),
    ("freeMemory", "1.3.6.1.4.1.14988.1.1.3.8.0"),
    ("boardModel", "1.3.6.1.4.1.14988.1.1.7.1.1.0"),
    ("temperature", "1.3.6.1.4.1.14988.1.1.3.11.0"),
    ("interfaces", "1.3.6.1.2.1.2.2.1.2"),
    ("ifInOctets", "1.3.6.1.2.1.2.2.1.10"),
    ("ifOutOctets", "1.3.6.1.2.1.2.2.1.16"),
];

/// Single SNMP GET returning the raw response line
/// (`<OID> = <TYPE>: <value>`).
pub trait SnmpClient: Send + Sync + 'static {
    fn get(
        &self,
        ip: &str,
        oid: &str,
        community: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// `snmpget -v 2c` from net-snmp.
pub struct SnmpGetCommand {
    snmpget_path: String,
}

impl SnmpGetCommand {
    pub fn new(snmpget_path: &str) -> Self {
        Self {
            snmpget_path: snmpget_path.to_string(),
        }
    }
}

impl SnmpClient for SnmpGetCommand {
    async fn get(&self, ip: &str, oid: &str, community: &str, timeout: Duration) -> Result<String> {
        let output = Command::new(&self.snmpget_path)
            .args(["-v", "2c", "-r", "0", "-c", community])
            .arg("-t")
            .arg(timeout.as_secs().max(1).to_string())
            .arg(ip)
            .arg(oid)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(DiscoverError::Snmp(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Queries the OID registry against devices.
pub struct SnmpCollector<N> {
    client: N,
    community: String,
    query_timeout: Duration,
}

impl<N: SnmpClient> SnmpCollector<N> {
    pub fn new(client: N, community: &str, query_timeout: Duration) -> Self {
        Self {
            client,
            community: community.to_string(),
            query_timeout,
        }
    }

    /// Query every registry label against `ip`.
    pub async fn collect(&self, ip: &str) -> SnmpData {
        let mut data = SnmpData::new();

        for (label, oid) in OID_REGISTRY {
            // The client gets a little slack so its own timeout fires first.
            let query = self
                .client
                .get(ip, oid, &self.community, self.query_timeout);
            let value = match timeout(self.query_timeout + Duration::from_secs(1), query).await {
                Ok(Ok(raw)) => parse_snmp_value(&raw),
                Ok(Err(e)) => {
                    tracing::debug!(ip = %ip, label, error = %e, "SNMP query failed");
                    None
                }
                Err(_) => {
                    tracing::debug!(ip = %ip, label, "SNMP query timed out");
                    None
                }
            };
            data.insert(
                label.to_string(),
                value.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            );
        }

        let answered = answered_count(&data);
        tracing::info!(ip = %ip, answered, total = data.len(), "SNMP collection complete");
        data
    }
}

/// Number of labels that carry a real value.
pub fn answered_count(data: &SnmpData) -> usize {
    data.values()
        .filter(|v| !v.is_empty() && v.as_str() != NOT_AVAILABLE)
        .count()
}

/// Extract the bare value from `<OID> = <TYPE>: <value>`.
///
/// Returns `None` for output without ` = `. A leading all-caps type tag such
/// as `STRING:` or `Timeticks:` is stripped; values with no tag are kept as is.
pub fn parse_snmp_value(raw: &str) -> Option<String> {
    let (_, value) = raw.trim().split_once(" = ")?;
    let value = value.trim();

    let stripped = match value.split_once(':') {
        Some((tag, rest))
            if !tag.is_empty()
                && tag.chars().next().is_some_and(|c| c.is_ascii_uppercase())
                && tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
                && rest.starts_with(char::is_whitespace) =>
        {
            rest.trim()
        }
        _ => value,
    };

    Some(stripped.trim_matches('"').to_string())
}
