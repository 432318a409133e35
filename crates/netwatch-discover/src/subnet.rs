//! Local subnet detection from host routing state.
//!
//! Reads the default-route interface and its IPv4 address/prefix with
//! `ip -o -4`, returning the network in CIDR form. Detection never fails the
//! caller: any problem falls back to a configured CIDR.

use std::str::FromStr;

use ipnet::Ipv4Net;
use tokio::process::Command;

use crate::error::{DiscoverError, Result};

/// Detect the CIDR to scan, falling back to `fallback` on any failure.
pub async fn detect_subnet(fallback: &str) -> String {
    match detect_default_route_subnet().await {
        Ok(net) => {
            tracing::debug!(cidr = %net, "Detected local subnet");
            net.to_string()
        }
        Err(e) => {
            tracing::warn!(error = %e, fallback = %fallback, "Failed to auto-detect subnet");
            fallback.to_string()
        }
    }
}

async fn detect_default_route_subnet() -> Result<Ipv4Net> {
    let routes = ip_command(&["-o", "-4", "route", "show", "default"]).await?;
    let iface = parse_default_interface(&routes)
        .ok_or_else(|| DiscoverError::SubnetDetection("no default route".to_string()))?;

    let addrs = ip_command(&["-o", "-4", "addr", "show", "dev", &iface]).await?;
    parse_interface_network(&addrs).ok_or_else(|| {
        DiscoverError::SubnetDetection(format!("no IPv4 address with prefix on {iface}"))
    })
}

async fn ip_command(args: &[&str]) -> Result<String> {
    let output = Command::new("ip").args(args).output().await?;
    if !output.status.success() {
        return Err(DiscoverError::SubnetDetection(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Interface name of the first default route (`default via X dev <iface> ...`).
pub fn parse_default_interface(routes: &str) -> Option<String> {
    routes
        .lines()
        .filter(|line| line.trim_start().starts_with("default"))
        .find_map(|line| {
            let mut tokens = line.split_whitespace();
            tokens.find(|t| *t == "dev")?;
            tokens.next().map(String::from)
        })
}

/// Network of the first `inet a.b.c.d/len` entry, host bits cleared.
pub fn parse_interface_network(addrs: &str) -> Option<Ipv4Net> {
    addrs.lines().find_map(|line| {
        let mut tokens = line.split_whitespace();
        tokens.find(|t| *t == "inet")?;
        let net = Ipv4Net::from_str(tokens.next()?).ok()?;
        Some(net.trunc())
    })
}
