use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::str::FromStr;

use tokio::process::Command;
use tracing::{debug, info};

use super::neighbors::Platform;
use super::subnet::Subnet;
use crate::error::{Result, ScanError};

/// Emits `name|ip|prefix|hasDefaultRoute` for every up adapter with an IPv4 address.
const WINDOWS_ADAPTER_QUERY: &str = r#"Get-NetIPAddress -AddressFamily IPv4 | Where-Object { $_.IPAddress -ne '127.0.0.1' -and $_.PrefixOrigin -ne 'WellKnown' } | ForEach-Object { $adapter = Get-NetAdapter -InterfaceIndex $_.InterfaceIndex -ErrorAction SilentlyContinue; if ($adapter -and $adapter.Status -eq 'Up') { $gw = [bool](Get-NetRoute -DestinationPrefix '0.0.0.0/0' -InterfaceIndex $_.InterfaceIndex -ErrorAction SilentlyContinue); "$($adapter.Name)|$($_.IPAddress)|$($_.PrefixLength)|$gw" } }"#;

/// Information about a network adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    pub name: String,
    pub ip: Ipv4Addr,
    pub prefix_length: u8,
    /// The adapter carries the IPv4 default route.
    pub default_route: bool,
}

impl AdapterInfo {
    /// Loopback, link-local (169.254.x.x) and degenerate prefixes can't describe a LAN.
    pub fn is_usable(&self) -> bool {
        !self.ip.is_loopback()
            && !self.ip.is_link_local()
            && !self.ip.is_unspecified()
            && (1..=30).contains(&self.prefix_length)
    }

    pub fn subnet(&self) -> Result<Subnet> {
        Subnet::new(self.ip, self.prefix_length)
    }
}

/// Pick the adapter to scan: the one holding the default route, otherwise the
/// first usable adapter in the order the system listed them.
pub fn select_adapter(adapters: &[AdapterInfo]) -> Option<&AdapterInfo> {
    adapters
        .iter()
        .filter(|a| a.is_usable())
        .find(|a| a.default_route)
        .or_else(|| adapters.iter().find(|a| a.is_usable()))
}

/// Determine the local subnet from the host's adapter configuration.
pub async fn resolve(platform: Platform) -> Result<Subnet> {
    let adapters = get_active_adapters(platform).await;
    debug!(count = adapters.len(), "enumerated adapters");

    let adapter = select_adapter(&adapters).ok_or_else(|| {
        ScanError::Configuration(
            "no non-loopback IPv4 interface with a usable prefix length was found".to_string(),
        )
    })?;

    let subnet = adapter.subnet()?;
    info!(
        adapter = %adapter.name,
        ip = %adapter.ip,
        %subnet,
        default_route = adapter.default_route,
        "resolved local subnet"
    );
    Ok(subnet)
}

/// Get all active adapters with IPv4 addresses, in system order.
pub async fn get_active_adapters(platform: Platform) -> Vec<AdapterInfo> {
    match platform {
        Platform::Windows => {
            let args = ["-NoProfile", "-Command", WINDOWS_ADAPTER_QUERY];
            // Try pwsh first, fall back to powershell
            let output = match capture("pwsh", &args).await {
                Some(out) => Some(out),
                None => capture("powershell", &args).await,
            };
            output.map(|out| parse_windows(&out)).unwrap_or_default()
        }
        Platform::Linux => {
            let Some(addrs) = capture("ip", &["-o", "-4", "addr", "show"]).await else {
                return Vec::new();
            };
            let routes = capture("ip", &["-4", "route", "show", "default"])
                .await
                .unwrap_or_default();
            parse_linux(&addrs, &routes)
        }
        Platform::Bsd => {
            let Some(ifconfig) = capture("ifconfig", &[]).await else {
                return Vec::new();
            };
            let route = capture("route", &["-n", "get", "default"])
                .await
                .unwrap_or_default();
            parse_bsd(&ifconfig, &route)
        }
    }
}

async fn capture(program: &str, args: &[&str]) -> Option<String> {
    match Command::new(program).args(args).output().await {
        Ok(output) => Some(String::from_utf8_lossy(&output.stdout).into_owned()),
        Err(e) => {
            debug!(program, error = %e, "adapter query failed");
            None
        }
    }
}

/// Lines of `name|ip|prefix|True`.
fn parse_windows(stdout: &str) -> Vec<AdapterInfo> {
    stdout
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split('|').collect();
            if parts.len() < 3 {
                return None;
            }
            Some(AdapterInfo {
                name: parts[0].trim().to_string(),
                ip: Ipv4Addr::from_str(parts[1].trim()).ok()?,
                prefix_length: parts[2].trim().parse().ok()?,
                default_route: parts
                    .get(3)
                    .is_some_and(|gw| gw.trim().eq_ignore_ascii_case("true")),
            })
        })
        .collect()
}

/// `ip -o -4 addr show` plus `ip -4 route show default`.
///
/// ```text
/// 2: eth0    inet 192.168.1.10/24 brd 192.168.1.255 scope global dynamic eth0\ ...
/// default via 192.168.1.1 dev eth0 proto dhcp metric 100
/// ```
fn parse_linux(addrs: &str, routes: &str) -> Vec<AdapterInfo> {
    let gateways: HashSet<&str> = routes
        .lines()
        .filter(|line| line.starts_with("default"))
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            let dev = parts.iter().position(|p| *p == "dev")?;
            parts.get(dev + 1).copied()
        })
        .collect();

    addrs
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 4 || parts[2] != "inet" {
                return None;
            }
            let name = parts[1].split('@').next()?;
            let (ip, prefix) = parts[3].split_once('/')?;
            Some(AdapterInfo {
                name: name.to_string(),
                ip: ip.parse().ok()?,
                prefix_length: prefix.parse().ok()?,
                default_route: gateways.contains(name),
            })
        })
        .collect()
}

/// `ifconfig` plus `route -n get default`.
///
/// ```text
/// en0: flags=8863<UP,BROADCAST,SMART,RUNNING,SIMPLEX,MULTICAST> mtu 1500
/// 	inet 192.168.1.23 netmask 0xffffff00 broadcast 192.168.1.255
/// ```
fn parse_bsd(ifconfig: &str, route: &str) -> Vec<AdapterInfo> {
    let gateway = route.lines().find_map(|line| {
        let (key, value) = line.trim().split_once(':')?;
        (key == "interface").then_some(value.trim())
    });

    let mut adapters = Vec::new();
    let mut current: Option<&str> = None;

    for line in ifconfig.lines() {
        if !line.starts_with(char::is_whitespace) {
            current = line.split(':').next().filter(|name| !name.is_empty());
            continue;
        }
        let Some(name) = current else {
            continue;
        };
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 || parts[0] != "inet" || parts[2] != "netmask" {
            continue;
        }
        let (Ok(ip), Some(mask)) = (parts[1].parse::<Ipv4Addr>(), parse_netmask(parts[3])) else {
            continue;
        };
        adapters.push(AdapterInfo {
            name: name.to_string(),
            ip,
            prefix_length: mask.count_ones() as u8,
            default_route: gateway == Some(name),
        });
    }

    adapters
}

/// BSD prints masks as `0xffffff00`; some builds use dotted decimal.
fn parse_netmask(token: &str) -> Option<u32> {
    match token.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => token.parse::<Ipv4Addr>().ok().map(u32::from),
    }
}
