use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::scanner::{HostnameLookup, MacAddr, NeighborEntry, NeighborState, Subnet, VendorCatalog};

/// One device seen in the neighbor cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceRecord {
    pub hostname: Option<String>,
    pub ipv4: Ipv4Addr,
    pub ipv6: Option<Ipv6Addr>,
    pub hardware_address: MacAddr,
    pub vendor: Option<String>,
}

/// Turn raw neighbor entries into one record per hardware address inside `subnet`.
///
/// The first entry seen for a hardware address wins. Hostnames are looked up
/// concurrently, at most `lookup_limit` at a time. Output order is not
/// meaningful.
pub async fn assemble(
    entries: Vec<NeighborEntry>,
    ipv6: &HashMap<MacAddr, Ipv6Addr>,
    subnet: &Subnet,
    vendors: &VendorCatalog,
    resolver: Arc<dyn HostnameLookup>,
    lookup_limit: usize,
) -> Vec<DeviceRecord> {
    let mut devices: HashMap<MacAddr, Ipv4Addr> = HashMap::new();

    for entry in entries {
        if entry.state == NeighborState::Incomplete
            || entry.mac.is_broadcast()
            || !subnet.contains(entry.ip)
        {
            continue;
        }
        devices.entry(entry.mac).or_insert(entry.ip);
    }

    let mut hostnames = resolve_all(devices.values().copied(), resolver, lookup_limit).await;

    let mut records = Vec::with_capacity(devices.len());
    for (mac, ip) in devices {
        records.push(DeviceRecord {
            hostname: hostnames.remove(&ip).flatten(),
            ipv4: ip,
            ipv6: ipv6.get(&mac).copied(),
            hardware_address: mac,
            vendor: vendors.lookup(&mac).map(str::to_string),
        });
    }

    records
}

/// Reverse-resolve every address, with at most `limit` lookups in flight.
async fn resolve_all(
    ips: impl IntoIterator<Item = Ipv4Addr>,
    resolver: Arc<dyn HostnameLookup>,
    limit: usize,
) -> HashMap<Ipv4Addr, Option<String>> {
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut lookups = JoinSet::new();

    for ip in ips {
        let resolver = Arc::clone(&resolver);
        let semaphore = Arc::clone(&semaphore);
        lookups.spawn(async move {
            // The semaphore is never closed
            let _permit = semaphore.acquire_owned().await.ok();
            (ip, resolver.resolve(ip).await)
        });
    }

    let mut results = HashMap::new();
    while let Some(joined) = lookups.join_next().await {
        if let Ok((ip, hostname)) = joined {
            results.insert(ip, hostname);
        }
    }
    results
}
