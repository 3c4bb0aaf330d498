use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use async_trait::async_trait;
use dns_lookup::lookup_addr;
use tracing::trace;

/// Reverse name lookup. Misses of any kind come back as `None`.
#[async_trait]
pub trait HostnameLookup: Send + Sync {
    async fn resolve(&self, ip: Ipv4Addr) -> Option<String>;
}

/// Reverse DNS through the system resolver.
pub struct DnsResolver {
    timeout: Duration,
}

impl DnsResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for DnsResolver {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl HostnameLookup for DnsResolver {
    async fn resolve(&self, ip: Ipv4Addr) -> Option<String> {
        // Perform DNS lookup in blocking task
        let lookup = tokio::task::spawn_blocking(move || lookup_addr(&IpAddr::V4(ip)));

        let name = match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(Ok(name))) => name,
            Ok(Ok(Err(e))) => {
                trace!(%ip, error = %e, "reverse lookup failed");
                return None;
            }
            Ok(Err(_)) | Err(_) => {
                trace!(%ip, "reverse lookup did not complete");
                return None;
            }
        };

        clean_hostname(&name)
    }
}

/// Resolvers without a PTR record often hand the address back as text.
fn clean_hostname(name: &str) -> Option<String> {
    let name = name.trim().trim_end_matches('.');
    if name.is_empty() || name.parse::<IpAddr>().is_ok() {
        return None;
    }
    Some(name.to_string())
}

/// Lookup that never answers, for runs with name resolution turned off.
pub struct NoLookup;

#[async_trait]
impl HostnameLookup for NoLookup {
    async fn resolve(&self, _ip: Ipv4Addr) -> Option<String> {
        None
    }
}
