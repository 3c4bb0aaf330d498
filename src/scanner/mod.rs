pub mod adapters;
pub mod dns;
pub mod mac;
pub mod neighbors;
pub mod ping;
pub mod range;
pub mod subnet;
pub mod vendor;

pub use dns::{DnsResolver, HostnameLookup, NoLookup};
pub use mac::MacAddr;
pub use neighbors::{NeighborCache, NeighborEntry, NeighborState, Platform};
pub use ping::{sweep, system_probe, SweepConfig};
pub use range::expand;
pub use subnet::Subnet;
pub use vendor::VendorCatalog;
