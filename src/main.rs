mod config;
mod discovery;
mod error;
mod output;
mod report;
mod scanner;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use config::Config;
use discovery::DiscoveryRequest;
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "neighscan")]
#[command(about = "List the devices on your local subnet from the OS neighbor cache")]
#[command(version)]
struct Cli {
    /// Subnet to report on (e.g., 192.168.1.0/24); defaults to the local subnet
    subnet: Option<String>,

    /// Also report each device's IPv6 link-local address
    #[arg(long)]
    ipv6: bool,

    /// Ping-sweep the subnet first so the neighbor cache is fresh
    #[arg(short, long)]
    force: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Vendor table (tab-separated OUI prefix and vendor name)
    #[arg(long, value_name = "PATH")]
    oui_file: Option<PathBuf>,

    /// Maximum probes in flight during a sweep
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-probe timeout in milliseconds
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Skip reverse DNS lookups
    #[arg(long)]
    no_dns: bool,

    /// More log output on stderr (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn config(&self) -> Config {
        let mut config = Config::default();
        if let Some(limit) = self.concurrency {
            config.sweep.concurrent_limit = limit.max(1);
        }
        if let Some(ms) = self.timeout_ms {
            config.sweep.probe_timeout = Duration::from_millis(ms);
        }
        config.resolve_hostnames = !self.no_dns;
        config.oui_file = self.oui_file.clone();
        config
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let request = DiscoveryRequest {
        subnet: cli.subnet.clone(),
        ipv6: cli.ipv6,
        force: cli.force,
    };
    let result = discovery::run(&request, &cli.config()).await?;

    let mut devices = result.devices;
    devices.sort_by_key(|d| d.ipv4);

    let mut stdout = io::stdout().lock();
    output::render(&mut stdout, &devices, cli.format, cli.ipv6)?;

    if cli.format == OutputFormat::Table {
        eprintln!("{} device(s) found on {}", devices.len(), result.subnet);
    }

    Ok(())
}
