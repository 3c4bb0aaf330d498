//! The end-to-end discovery run: resolve the subnet, optionally sweep it, read
//! the neighbor cache and build the report.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::Config;
use crate::error::Result;
use crate::report::{assemble, DeviceRecord};
use crate::scanner::range::AddressRange;
use crate::scanner::{
    adapters, expand, sweep, system_probe, DnsResolver, HostnameLookup, NeighborCache, NoLookup,
    Platform, Subnet, VendorCatalog,
};

/// What the user asked for.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryRequest {
    /// Target subnet; the local one is used when absent.
    pub subnet: Option<String>,
    pub ipv6: bool,
    /// Sweep the subnet before reading the cache.
    pub force: bool,
}

/// Result of a run.
#[derive(Debug, Clone)]
pub struct Discovery {
    pub subnet: Subnet,
    pub devices: Vec<DeviceRecord>,
}

pub async fn run(request: &DiscoveryRequest, config: &Config) -> Result<Discovery> {
    // Validate before touching the network
    let explicit = request.subnet.as_deref().map(Subnet::parse).transpose()?;

    let platform = Platform::current();
    let subnet = match explicit {
        Some(subnet) => subnet,
        None => adapters::resolve(platform).await?,
    };
    info!(%subnet, ipv6 = request.ipv6, force = request.force, "discovering devices");

    // Build the vendor table before anything runs concurrently
    let vendors = VendorCatalog::locate(config.oui_file.as_deref());
    debug!(entries = vendors.load(), "vendor catalog ready");

    let targets = if request.force {
        sweep_targets(&subnet)
    } else {
        None
    };
    if let Some(range) = targets {
        debug!(hosts = range.len(), "sweeping subnet");
        let probe = system_probe(config.sweep.probe_timeout);
        let summary = sweep(range, probe, &config.sweep).await;
        info!(
            probes = summary.dispatched,
            answered = summary.answered,
            abandoned = summary.abandoned,
            "sweep finished"
        );
    }

    let cache = NeighborCache::new(platform);
    let entries = cache.read_ipv4().await;
    let ipv6 = if request.ipv6 {
        cache.read_ipv6().await
    } else {
        HashMap::new()
    };
    debug!(ipv4 = entries.len(), ipv6 = ipv6.len(), "read neighbor cache");

    let resolver: Arc<dyn HostnameLookup> = if config.resolve_hostnames {
        Arc::new(DnsResolver::new(config.dns_timeout))
    } else {
        Arc::new(NoLookup)
    };

    let devices = assemble(
        entries,
        &ipv6,
        &subnet,
        &vendors,
        resolver,
        config.dns_concurrency,
    )
    .await;
    info!(devices = devices.len(), "report assembled");

    Ok(Discovery { subnet, devices })
}

/// Addresses worth sweeping, or `None` when the subnet has no host addresses.
fn sweep_targets(subnet: &Subnet) -> Option<AddressRange> {
    let range = expand(subnet);
    if range.is_empty() {
        debug!(%subnet, "no host addresses to sweep");
        return None;
    }
    Some(range)
}
