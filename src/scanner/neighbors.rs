//! Reading the operating system's neighbor cache.
//!
//! Each OS family prints its ARP / NDP table differently. A [`NeighborParser`]
//! knows which command to run and how to read one line of its output; the
//! [`NeighborCache`] runs the command and applies the filtering rules shared by
//! every platform.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use tokio::process::Command;
use tracing::{debug, trace, warn};

use super::mac::MacAddr;

/// Cache state of a neighbor entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborState {
    Reachable,
    Stale,
    Incomplete,
    Other,
}

impl NeighborState {
    /// Map the state words used by `ip neigh` and `netsh`.
    fn from_word(word: &str) -> Self {
        match word.to_ascii_lowercase().as_str() {
            "reachable" | "dynamic" => NeighborState::Reachable,
            "stale" | "delay" | "probe" => NeighborState::Stale,
            "incomplete" | "failed" | "unreachable" | "invalid" => NeighborState::Incomplete,
            _ => NeighborState::Other,
        }
    }
}

/// One IPv4 row of the neighbor table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborEntry {
    pub ip: Ipv4Addr,
    pub mac: MacAddr,
    pub state: NeighborState,
}

/// One IPv6 row of the neighbor table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv6Neighbor {
    pub ip: Ipv6Addr,
    pub mac: MacAddr,
    pub state: NeighborState,
}

/// A program and its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: &'static str,
    pub args: &'static [&'static str],
}

/// Operating system family, which decides the neighbor table format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Linux,
    Bsd,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(any(target_os = "linux", target_os = "android")) {
            Platform::Linux
        } else {
            Platform::Bsd
        }
    }

    pub fn parser(self) -> Box<dyn NeighborParser> {
        match self {
            Platform::Windows => Box::new(WindowsParser),
            Platform::Linux => Box::new(LinuxParser),
            Platform::Bsd => Box::new(BsdParser),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Windows => write!(f, "windows"),
            Platform::Linux => write!(f, "linux"),
            Platform::Bsd => write!(f, "bsd"),
        }
    }
}

/// Line grammar for one platform's neighbor table listing.
///
/// A parse method returns `None` for anything that is not a complete record:
/// headers, blank lines, interface banners, placeholders.
pub trait NeighborParser: Send + Sync {
    fn ipv4_command(&self) -> CommandSpec;

    fn ipv6_command(&self) -> CommandSpec;

    fn parse_ipv4_line(&self, line: &str) -> Option<NeighborEntry>;

    fn parse_ipv6_line(&self, line: &str) -> Option<Ipv6Neighbor>;
}

/// `arp -a` and `netsh interface ipv6 show neighbors`.
///
/// ```text
///   192.168.1.1           aa-bb-cc-dd-ee-ff     dynamic
/// fe80::1                 aa-bb-cc-dd-ee-ff     Reachable (Router)
/// ```
pub struct WindowsParser;

impl NeighborParser for WindowsParser {
    fn ipv4_command(&self) -> CommandSpec {
        CommandSpec {
            program: "arp",
            args: &["-a"],
        }
    }

    fn ipv6_command(&self) -> CommandSpec {
        CommandSpec {
            program: "netsh",
            args: &["interface", "ipv6", "show", "neighbors"],
        }
    }

    fn parse_ipv4_line(&self, line: &str) -> Option<NeighborEntry> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let [ip, mac, kind] = parts.as_slice() else {
            return None;
        };
        Some(NeighborEntry {
            ip: ip.parse().ok()?,
            mac: parse_dashed_mac(mac)?,
            state: NeighborState::from_word(kind),
        })
    }

    fn parse_ipv6_line(&self, line: &str) -> Option<Ipv6Neighbor> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 {
            return None;
        }
        Some(Ipv6Neighbor {
            ip: parse_ipv6(parts[0])?,
            mac: parse_dashed_mac(parts[1])?,
            state: NeighborState::from_word(parts[2]),
        })
    }
}

/// `ip -4 neigh show` and `ip -6 neigh show`.
///
/// ```text
/// 192.168.1.1 dev eth0 lladdr aa:bb:cc:dd:ee:ff REACHABLE
/// fe80::1 dev eth0 lladdr aa:bb:cc:dd:ee:ff router STALE
/// ```
pub struct LinuxParser;

impl LinuxParser {
    /// Returns the address token, MAC and state of a `ip neigh` row.
    fn split_row(line: &str) -> Option<(&str, MacAddr, NeighborState)> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 6 || parts[1] != "dev" {
            return None;
        }
        let lladdr = parts.iter().position(|p| *p == "lladdr")?;
        let mac = parse_colon_mac(parts.get(lladdr + 1)?)?;
        // State is always the last word; flags like `router` sit in between
        let state = NeighborState::from_word(parts.last()?);
        Some((parts[0], mac, state))
    }
}

impl NeighborParser for LinuxParser {
    fn ipv4_command(&self) -> CommandSpec {
        CommandSpec {
            program: "ip",
            args: &["-4", "neigh", "show"],
        }
    }

    fn ipv6_command(&self) -> CommandSpec {
        CommandSpec {
            program: "ip",
            args: &["-6", "neigh", "show"],
        }
    }

    fn parse_ipv4_line(&self, line: &str) -> Option<NeighborEntry> {
        let (ip, mac, state) = Self::split_row(line)?;
        Some(NeighborEntry {
            ip: ip.parse().ok()?,
            mac,
            state,
        })
    }

    fn parse_ipv6_line(&self, line: &str) -> Option<Ipv6Neighbor> {
        let (ip, mac, state) = Self::split_row(line)?;
        Some(Ipv6Neighbor {
            ip: parse_ipv6(ip)?,
            mac,
            state,
        })
    }
}

/// `arp -an` and `ndp -an` on macOS and the BSDs.
///
/// ```text
/// ? (192.168.1.1) at aa:bb:cc:dd:ee:ff on en0 ifscope [ethernet]
/// fe80::1%en0        aa:bb:cc:dd:ee:ff  en0 23h59m58s S  R
/// ```
pub struct BsdParser;

impl NeighborParser for BsdParser {
    fn ipv4_command(&self) -> CommandSpec {
        CommandSpec {
            program: "arp",
            args: &["-an"],
        }
    }

    fn ipv6_command(&self) -> CommandSpec {
        CommandSpec {
            program: "ndp",
            args: &["-an"],
        }
    }

    fn parse_ipv4_line(&self, line: &str) -> Option<NeighborEntry> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 || parts[2] != "at" {
            return None;
        }
        let ip = parts[1].strip_prefix('(')?.strip_suffix(')')?;
        // `(incomplete)` fails here
        let mac = parse_colon_mac(parts[3])?;
        let state = if parts[4..].contains(&"permanent") {
            NeighborState::Other
        } else {
            NeighborState::Reachable
        };
        Some(NeighborEntry {
            ip: ip.parse().ok()?,
            mac,
            state,
        })
    }

    fn parse_ipv6_line(&self, line: &str) -> Option<Ipv6Neighbor> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 {
            return None;
        }
        let state = match parts.get(4).copied() {
            Some("R") => NeighborState::Reachable,
            Some("S") | Some("D") | Some("P") => NeighborState::Stale,
            Some("I") => NeighborState::Incomplete,
            _ => NeighborState::Other,
        };
        Some(Ipv6Neighbor {
            ip: parse_ipv6(parts[0])?,
            mac: parse_colon_mac(parts[1])?,
            state,
        })
    }
}

fn parse_dashed_mac(token: &str) -> Option<MacAddr> {
    if !token.contains('-') {
        return None;
    }
    token.parse().ok()
}

fn parse_colon_mac(token: &str) -> Option<MacAddr> {
    if !token.contains(':') {
        return None;
    }
    token.parse().ok()
}

/// Parse an IPv6 address, dropping any `%zone` suffix.
fn parse_ipv6(token: &str) -> Option<Ipv6Addr> {
    let addr = token.split('%').next()?;
    addr.parse().ok()
}

fn is_link_local(ip: &Ipv6Addr) -> bool {
    ip.segments()[0] & 0xffc0 == 0xfe80
}

/// Whether a hardware address can belong to a single real device.
fn is_device_mac(mac: &MacAddr) -> bool {
    !mac.is_multicast() && !mac.is_zero()
}

/// Parse a full IPv4 listing, keeping only usable entries.
pub fn parse_ipv4_table(parser: &dyn NeighborParser, text: &str) -> Vec<NeighborEntry> {
    text.lines()
        .filter_map(|line| {
            let entry = parser.parse_ipv4_line(line);
            if entry.is_none() {
                trace!(line, "skipping neighbor line");
            }
            entry
        })
        .filter(|entry| entry.state != NeighborState::Incomplete && is_device_mac(&entry.mac))
        .collect()
}

/// Parse a full IPv6 listing into a link-local address per hardware address.
/// The first address seen for a hardware address is kept.
pub fn parse_ipv6_table(parser: &dyn NeighborParser, text: &str) -> HashMap<MacAddr, Ipv6Addr> {
    let mut map = HashMap::new();

    for line in text.lines() {
        let Some(neighbor) = parser.parse_ipv6_line(line) else {
            trace!(line, "skipping neighbor line");
            continue;
        };
        if neighbor.state == NeighborState::Incomplete
            || !is_device_mac(&neighbor.mac)
            || !is_link_local(&neighbor.ip)
        {
            continue;
        }
        map.entry(neighbor.mac).or_insert(neighbor.ip);
    }

    map
}

/// The OS neighbor cache, read through the platform's own tools.
pub struct NeighborCache {
    parser: Box<dyn NeighborParser>,
}

impl NeighborCache {
    pub fn new(platform: Platform) -> Self {
        debug!(%platform, "using neighbor table format");
        Self {
            parser: platform.parser(),
        }
    }

    pub async fn read_ipv4(&self) -> Vec<NeighborEntry> {
        match run(self.parser.ipv4_command()).await {
            Some(text) => parse_ipv4_table(self.parser.as_ref(), &text),
            None => Vec::new(),
        }
    }

    pub async fn read_ipv6(&self) -> HashMap<MacAddr, Ipv6Addr> {
        match run(self.parser.ipv6_command()).await {
            Some(text) => parse_ipv6_table(self.parser.as_ref(), &text),
            None => HashMap::new(),
        }
    }
}

async fn run(spec: CommandSpec) -> Option<String> {
    let output = match Command::new(spec.program).args(spec.args).output().await {
        Ok(output) => output,
        Err(e) => {
            warn!(command = spec.program, error = %e, "could not query neighbor table");
            return None;
        }
    };

    if !output.status.success() {
        debug!(
            command = spec.program,
            status = %output.status,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "neighbor table command exited with an error"
        );
    }

    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(s: &str) -> MacAddr {
        s.parse().unwrap()
    }

    const WINDOWS_ARP: &str = "
Interface: 192.168.1.10 --- 0xb
  Internet Address      Physical Address      Type
  192.168.1.1           aa-bb-cc-dd-ee-ff     dynamic
  192.168.1.20          00-00-00-00-00-00     invalid
  192.168.1.30          00-15-5d-01-02-03     static
  192.168.1.255         ff-ff-ff-ff-ff-ff     static
  224.0.0.22            01-00-5e-00-00-16     static

Interface: 10.0.0.2 --- 0x4
  Internet Address      Physical Address      Type
  10.0.0.5              aa-bb-cc-dd-ee-ff     dynamic
";

    const WINDOWS_NETSH: &str = "
Interface 12: Ethernet


Internet Address                              Physical Address   Type
--------------------------------------------  -----------------  -----------
fe80::1                                       aa-bb-cc-dd-ee-ff  Reachable (Router)
fe80::2                                       aa-bb-cc-dd-ee-ff  Stale
fe80::3                                       00-00-00-00-00-00  Unreachable
2001:db8::9                                   00-15-5d-01-02-03  Reachable
ff02::1                                       33-33-00-00-00-01  Permanent
";

    const LINUX_V4: &str = "\
192.168.1.1 dev eth0 lladdr aa:bb:cc:dd:ee:ff REACHABLE
192.168.1.7 dev eth0  FAILED
192.168.1.8 dev eth0  INCOMPLETE
192.168.1.9 dev eth0 lladdr 52:54:00:12:34:56 router STALE
192.168.1.40 dev eth0 lladdr 00:15:5d:01:02:03 PERMANENT
";

    const LINUX_V6: &str = "\
fe80::1 dev eth0 lladdr aa:bb:cc:dd:ee:ff router REACHABLE
fe80::5054:ff:fe12:3456 dev eth0 lladdr 52:54:00:12:34:56 STALE
2001:db8::1 dev eth0 lladdr 52:54:00:12:34:56 REACHABLE
fe80::99 dev eth0  FAILED
";

    const BSD_ARP: &str = "\
? (192.168.1.1) at aa:bb:cc:dd:ee:ff on en0 ifscope [ethernet]
? (192.168.1.20) at (incomplete) on en0 ifscope [ethernet]
router.lan (192.168.1.2) at 0:1b:2:d:e:f on en0 ifscope [ethernet]
? (192.168.1.255) at ff:ff:ff:ff:ff:ff on en0 ifscope [ethernet]
? (224.0.0.251) at 1:0:5e:0:0:fb on en0 ifscope permanent [ethernet]
";

    const BSD_NDP: &str = "\
Neighbor                        Linklayer Address  Netif Expire    St Flgs Prbs
fe80::1%en0                     aa:bb:cc:dd:ee:ff    en0 23h59m58s S  R
fe80::aede:48ff:fe00:1122%en5   ac:de:48:0:11:22     en5 permanent R
fe80::77%en0                    (incomplete)         en0 expired   N
";

    #[test]
    fn test_windows_ipv4() {
        let entries = parse_ipv4_table(&WindowsParser, WINDOWS_ARP);
        assert_eq!(
            entries,
            vec![
                NeighborEntry {
                    ip: Ipv4Addr::new(192, 168, 1, 1),
                    mac: mac("AA:BB:CC:DD:EE:FF"),
                    state: NeighborState::Reachable,
                },
                NeighborEntry {
                    ip: Ipv4Addr::new(192, 168, 1, 30),
                    mac: mac("00:15:5D:01:02:03"),
                    state: NeighborState::Other,
                },
                NeighborEntry {
                    ip: Ipv4Addr::new(10, 0, 0, 5),
                    mac: mac("AA:BB:CC:DD:EE:FF"),
                    state: NeighborState::Reachable,
                },
            ]
        );
    }

    #[test]
    fn test_windows_line_shape() {
        let parser = WindowsParser;
        assert!(parser.parse_ipv4_line("Interface: 192.168.1.10 --- 0xb").is_none());
        assert!(parser
            .parse_ipv4_line("  Internet Address      Physical Address      Type")
            .is_none());
        assert!(parser.parse_ipv4_line("").is_none());
        // Colon form is not what arp -a prints on Windows
        assert!(parser
            .parse_ipv4_line("192.168.1.1  aa:bb:cc:dd:ee:ff  dynamic")
            .is_none());
        assert!(parser
            .parse_ipv4_line("192.168.1.1  AA-BB-CC-DD-EE-FF  dynamic")
            .is_some());
    }

    #[test]
    fn test_windows_ipv6() {
        let map = parse_ipv6_table(&WindowsParser, WINDOWS_NETSH);
        assert_eq!(map.len(), 1);
        assert_eq!(
            map[&mac("AA:BB:CC:DD:EE:FF")],
            "fe80::1".parse::<Ipv6Addr>().unwrap()
        );
    }

    #[test]
    fn test_linux_ipv4() {
        let entries = parse_ipv4_table(&LinuxParser, LINUX_V4);
        let ips: Vec<Ipv4Addr> = entries.iter().map(|e| e.ip).collect();
        assert_eq!(
            ips,
            vec![
                Ipv4Addr::new(192, 168, 1, 1),
                Ipv4Addr::new(192, 168, 1, 9),
                Ipv4Addr::new(192, 168, 1, 40),
            ]
        );
        assert_eq!(entries[1].state, NeighborState::Stale);
        assert_eq!(entries[1].mac, mac("52:54:00:12:34:56"));
        assert_eq!(entries[2].state, NeighborState::Other);
    }

    #[test]
    fn test_linux_ipv6_keeps_link_local_only() {
        let map = parse_ipv6_table(&LinuxParser, LINUX_V6);
        assert_eq!(map.len(), 2);
        assert_eq!(
            map[&mac("52:54:00:12:34:56")],
            "fe80::5054:ff:fe12:3456".parse::<Ipv6Addr>().unwrap()
        );
    }

    #[test]
    fn test_bsd_ipv4() {
        let entries = parse_ipv4_table(&BsdParser, BSD_ARP);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].ip, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(entries[1].ip, Ipv4Addr::new(192, 168, 1, 2));
        assert_eq!(entries[1].mac.to_string(), "00:1B:02:0D:0E:0F");
    }

    #[test]
    fn test_bsd_ipv6() {
        let map = parse_ipv6_table(&BsdParser, BSD_NDP);
        assert_eq!(map.len(), 2);
        assert_eq!(
            map[&mac("AA:BB:CC:DD:EE:FF")],
            "fe80::1".parse::<Ipv6Addr>().unwrap()
        );
        assert!(map.contains_key(&mac("AC:DE:48:00:11:22")));
    }

    #[test]
    fn test_state_words() {
        assert_eq!(NeighborState::from_word("REACHABLE"), NeighborState::Reachable);
        assert_eq!(NeighborState::from_word("dynamic"), NeighborState::Reachable);
        assert_eq!(NeighborState::from_word("DELAY"), NeighborState::Stale);
        assert_eq!(NeighborState::from_word("FAILED"), NeighborState::Incomplete);
        assert_eq!(NeighborState::from_word("NOARP"), NeighborState::Other);
    }

    #[test]
    fn test_platform_parsers_match_commands() {
        assert_eq!(Platform::Windows.parser().ipv4_command().program, "arp");
        assert_eq!(Platform::Linux.parser().ipv6_command().args, &["-6", "neigh", "show"]);
        assert_eq!(Platform::Bsd.parser().ipv6_command().program, "ndp");
    }
}
