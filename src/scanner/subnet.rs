use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use ipnetwork::Ipv4Network;

use crate::error::{Result, ScanError};

/// An IPv4 subnet whose base address always has its host bits cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subnet {
    network: Ipv4Network,
}

impl Subnet {
    /// Build a subnet from any member address, masking it down to the network address.
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Result<Self> {
        let invalid = |e: ipnetwork::IpNetworkError| ScanError::Validation {
            input: format!("{}/{}", addr, prefix_len),
            reason: e.to_string(),
        };
        let member = Ipv4Network::new(addr, prefix_len).map_err(invalid)?;
        // Re-anchor on the network address so the base never carries host bits
        let network = Ipv4Network::new(member.network(), prefix_len).map_err(invalid)?;
        Ok(Self { network })
    }

    /// Parse user input of the shape `ddd.ddd.ddd.ddd/dd`.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let invalid = |reason: &str| ScanError::Validation {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let (addr, prefix) = input
            .split_once('/')
            .ok_or_else(|| invalid("expected CIDR notation a.b.c.d/nn"))?;

        let octets: Vec<&str> = addr.split('.').collect();
        if octets.len() != 4 || !octets.iter().all(|o| is_digits(o, 3)) {
            return Err(invalid("expected four dotted decimal octets"));
        }
        if !is_digits(prefix, 2) {
            return Err(invalid("expected a one or two digit prefix length"));
        }

        // Octet by octet, so zero-padded input like `192.168.001.000` is accepted
        let mut bytes = [0u8; 4];
        for (byte, octet) in bytes.iter_mut().zip(&octets) {
            *byte = octet
                .parse()
                .map_err(|_| invalid("octet must be between 0 and 255"))?;
        }
        let addr = Ipv4Addr::from(bytes);
        let prefix_len: u8 = prefix
            .parse()
            .map_err(|_| invalid("prefix length out of range"))?;
        if prefix_len > 32 {
            return Err(invalid("prefix length must be between 0 and 32"));
        }

        Self::new(addr, prefix_len)
    }

    pub fn base(&self) -> Ipv4Addr {
        self.network.network()
    }

    pub fn prefix_len(&self) -> u8 {
        self.network.prefix()
    }

    pub fn mask(&self) -> u32 {
        u32::from(self.network.mask())
    }

    /// Masked membership test.
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & self.mask() == u32::from(self.base())
    }
}

fn is_digits(s: &str, max_len: usize) -> bool {
    !s.is_empty() && s.len() <= max_len && s.bytes().all(|b| b.is_ascii_digit())
}

impl FromStr for Subnet {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base(), self.prefix_len())
    }
}
