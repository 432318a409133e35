//! MAC address → vendor resolution.
//!
//! The production lookup queries the macvendors.com HTTP API. Resolved
//! vendors are memoized per OUI (first three octets) since every later cycle
//! sees the same devices again and the API is rate limited.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use netwatch_core::types::{NOT_AVAILABLE, UNKNOWN_VENDOR};
use tokio::sync::Mutex;

use crate::error::{DiscoverError, Result};

/// Resolves a MAC address to a vendor name. Never fails: unresolvable
/// addresses yield `"Unknown"`.
pub trait VendorLookup: Send + Sync + 'static {
    fn lookup(&self, mac: &str) -> impl Future<Output = String> + Send;
}

/// HTTP client for `https://api.macvendors.com/<mac>`.
pub struct MacVendorsClient {
    http: reqwest::Client,
    base_url: String,
    memo: Mutex<HashMap<String, String>>,
}

impl MacVendorsClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.to_string(),
            memo: Mutex::new(HashMap::new()),
        })
    }

    async fn fetch(&self, mac: &str) -> Result<String> {
        let url = format!("{}{}", self.base_url, mac);
        let response = self.http.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(DiscoverError::VendorLookup(format!(
                "HTTP {} for {mac}",
                response.status()
            )));
        }

        let vendor = response.text().await?.trim().to_string();
        if vendor.is_empty() {
            return Err(DiscoverError::VendorLookup(format!("empty body for {mac}")));
        }
        Ok(vendor)
    }
}

impl VendorLookup for MacVendorsClient {
    async fn lookup(&self, mac: &str) -> String {
        let Some(mac) = normalize_mac(mac) else {
            return UNKNOWN_VENDOR.to_string();
        };
        let oui = mac[..8].to_string();

        if let Some(hit) = self.memo.lock().await.get(&oui) {
            return hit.clone();
        }

        match self.fetch(&mac).await {
            Ok(vendor) => {
                self.memo.lock().await.insert(oui, vendor.clone());
                vendor
            }
            Err(e) => {
                tracing::debug!(mac = %mac, error = %e, "Vendor lookup failed");
                UNKNOWN_VENDOR.to_string()
            }
        }
    }
}

/// Canonical `AA:BB:CC:DD:EE:FF` form, or `None` for missing or malformed input.
pub fn normalize_mac(mac: &str) -> Option<String> {
    let mac = mac.trim();
    if mac.is_empty() || mac.eq_ignore_ascii_case(NOT_AVAILABLE) {
        return None;
    }

    let hex: String = mac.chars().filter(|c| c.is_ascii_hexdigit()).collect();
    let separators_ok = mac
        .chars()
        .all(|c| c.is_ascii_hexdigit() || matches!(c, ':' | '-' | '.'));
    if hex.len() != 12 || !separators_ok {
        return None;
    }

    let octets: Vec<String> = hex
        .to_uppercase()
        .as_bytes()
        .chunks(2)
        .map(|pair| String::from_utf8_lossy(pair).into_owned())
        .collect();
    Some(octets.join(":"))
}
