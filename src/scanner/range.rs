use std::net::Ipv4Addr;

use super::subnet::Subnet;

/// Upper bound on the number of hosts a sweep will touch.
pub const MAX_SWEEP_HOSTS: u32 = 254;

/// Usable host addresses of a subnet, network and broadcast excluded, capped at
/// [`MAX_SWEEP_HOSTS`].
///
/// The range is lazy and `Copy`; iterating a copy leaves the original untouched,
/// so a range can be walked again from the start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    base: u32,
    next: u32,
    last: u32,
}

impl AddressRange {
    pub fn new(subnet: &Subnet) -> Self {
        let host_bits = 32 - u32::from(subnet.prefix_len());
        let usable = (1u64 << host_bits).saturating_sub(2);
        let count = usable.min(u64::from(MAX_SWEEP_HOSTS)) as u32;

        Self {
            base: u32::from(subnet.base()),
            next: 1,
            last: count,
        }
    }

    pub fn len(&self) -> usize {
        (self.last + 1).saturating_sub(self.next) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Iterator for AddressRange {
    type Item = Ipv4Addr;

    fn next(&mut self) -> Option<Ipv4Addr> {
        if self.next > self.last {
            return None;
        }
        let addr = Ipv4Addr::from(self.base.wrapping_add(self.next));
        self.next += 1;
        Some(addr)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.len();
        (len, Some(len))
    }
}

impl ExactSizeIterator for AddressRange {}

/// Expand a subnet into the addresses a sweep should probe.
pub fn expand(subnet: &Subnet) -> AddressRange {
    AddressRange::new(subnet)
}
