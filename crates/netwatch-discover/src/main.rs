//! CLI entry point for the netwatch-discover daemon.

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use netwatch_discover::config::DiscoverConfig;
use netwatch_discover::scanner::NmapScanner;
use netwatch_discover::session::Ssh2Connector;
use netwatch_discover::snmp::SnmpGetCommand;
use netwatch_discover::vendor::{MacVendorsClient, VendorLookup};
use netwatch_discover::{Capabilities, Netwatch, Pipeline};

#[derive(Parser)]
#[command(name = "netwatch-discover")]
#[command(about = "Network discovery and credential bootstrap for Netwatch")]
struct Cli {
    /// Target to scan (CIDR notation). Defaults to the detected local subnet.
    #[arg(short, long)]
    target: Option<String>,

    /// Run a single cycle, print the device cache as JSON and exit.
    #[arg(long)]
    once: bool,

    /// Run as daemon with scheduled rescans until Ctrl-C.
    #[arg(long)]
    daemon: bool,

    /// Resolve one MAC address to its vendor and exit.
    #[arg(long, value_name = "MAC")]
    vendor: Option<String>,

    /// Config file prefix (default: netwatch).
    #[arg(short, long, default_value = "netwatch")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let mut config = DiscoverConfig::load(&cli.config)?;
    if let Some(target) = cli.target.clone() {
        config.target = Some(target);
    }

    let vendors = MacVendorsClient::new(&config.vendor_api_url, config.vendor_timeout())?;

    if let Some(mac) = cli.vendor.as_deref() {
        println!("{}", vendors.lookup(mac).await);
        return Ok(());
    }

    let scanner = NmapScanner::new(&config.nmap_path);
    match scanner.verify_installation().await {
        Ok(version) => {
            let first = version.lines().next().unwrap_or_default().trim().to_string();
            tracing::info!(nmap_version = %first, "Nmap verified");
        }
        // Cycles still run and report no devices.
        Err(e) => tracing::error!(error = %e, "Nmap unavailable"),
    }

    let capabilities = Capabilities {
        scanner,
        vendors,
        connector: Ssh2Connector,
        snmp: SnmpGetCommand::new(&config.snmpget_path),
    };

    if cli.once {
        let pipeline = Pipeline::new(config, capabilities);
        pipeline.run_cycle().await;
        let devices = pipeline.cache().devices().await;
        println!("{}", serde_json::to_string_pretty(&devices)?);
    } else if cli.daemon {
        let (netwatch, scheduler) = Netwatch::new(config, capabilities);
        let task = tokio::spawn(scheduler.run());

        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown requested");

        // Dropping the last handle stops the scheduler after its current cycle.
        drop(netwatch);
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Scheduler task panicked");
        }
    } else {
        anyhow::bail!("Specify --once (single cycle), --daemon (scheduled rescans) or --vendor <MAC>");
    }

    Ok(())
}
