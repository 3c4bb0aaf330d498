use std::path::PathBuf;
use std::time::Duration;

use crate::scanner::SweepConfig;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub sweep: SweepConfig,
    pub dns_timeout: Duration,
    /// Reverse lookups allowed in flight at once.
    pub dns_concurrency: usize,
    pub resolve_hostnames: bool,
    /// Vendor table location; `None` defers to the environment and the binary's directory.
    pub oui_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sweep: SweepConfig::default(),
            dns_timeout: Duration::from_secs(2),
            dns_concurrency: 20,
            resolve_hostnames: true,
            oui_file: None,
        }
    }
}
