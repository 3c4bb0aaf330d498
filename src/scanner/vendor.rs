use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::{debug, trace};

use super::mac::MacAddr;

/// File name looked up next to the executable when no path is configured.
pub const OUI_FILE: &str = "oui.tsv";
pub const OUI_FILE_ENV: &str = "NEIGHSCAN_OUI_FILE";

/// Table compiled into the binary, used when no file is found on disk.
const BUNDLED_OUI: &str = include_str!("../../data/oui.tsv");

#[derive(Debug)]
enum Source {
    Empty,
    File(PathBuf),
    Bundled,
}

/// OUI prefix to vendor name table, built on first lookup.
///
/// The table is read-only once built, so a single catalog can be shared by
/// reference across the whole run.
#[derive(Debug)]
pub struct VendorCatalog {
    source: Source,
    table: OnceLock<HashMap<[u8; 3], String>>,
}

impl VendorCatalog {
    /// Catalog backed by the tab-separated file at `path`. Nothing is read until
    /// the first lookup.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::with_source(Source::File(path.into()))
    }

    /// Catalog backed by the table shipped inside the binary.
    pub fn bundled() -> Self {
        Self::with_source(Source::Bundled)
    }

    /// Catalog that never matches.
    pub fn empty() -> Self {
        Self::with_source(Source::Empty)
    }

    fn with_source(source: Source) -> Self {
        Self {
            source,
            table: OnceLock::new(),
        }
    }

    /// Resolve the table location: explicit path, then `NEIGHSCAN_OUI_FILE`,
    /// then `oui.tsv` beside the running binary, then the bundled table.
    pub fn locate(explicit: Option<&Path>) -> Self {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }
        if let Some(path) = std::env::var_os(OUI_FILE_ENV) {
            return Self::from_path(PathBuf::from(path));
        }
        match std::env::current_exe() {
            Ok(exe) => match exe.parent().map(|dir| dir.join(OUI_FILE)) {
                Some(path) if path.is_file() => Self::from_path(path),
                _ => Self::bundled(),
            },
            Err(e) => {
                debug!(error = %e, "cannot locate executable, using bundled vendor table");
                Self::bundled()
            }
        }
    }

    /// Build the table now if it has not been built yet.
    pub fn load(&self) -> usize {
        self.table().len()
    }

    /// Vendor name for the address's OUI, if known.
    pub fn lookup(&self, mac: &MacAddr) -> Option<&str> {
        self.table().get(&mac.oui()).map(String::as_str)
    }

    fn table(&self) -> &HashMap<[u8; 3], String> {
        self.table.get_or_init(|| match &self.source {
            Source::File(path) => load_table(path),
            Source::Bundled => parse_table(BUNDLED_OUI),
            Source::Empty => HashMap::new(),
        })
    }
}

fn load_table(path: &Path) -> HashMap<[u8; 3], String> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "vendor table unavailable");
            return HashMap::new();
        }
    };

    let table = parse_table(&content);
    debug!(path = %path.display(), entries = table.len(), "loaded vendor table");
    table
}

/// Parse `XX:XX:XX<TAB>Vendor Name` lines. The first entry for a prefix wins.
pub fn parse_table(content: &str) -> HashMap<[u8; 3], String> {
    let mut table = HashMap::new();

    for line in content.lines() {
        let Some((prefix, vendor)) = line.split_once('\t') else {
            continue;
        };
        let vendor = vendor.trim();
        match parse_prefix(prefix.trim()) {
            Some(oui) if !vendor.is_empty() => {
                table.entry(oui).or_insert_with(|| vendor.to_string());
            }
            _ => trace!(line, "skipping malformed vendor line"),
        }
    }

    table
}

fn parse_prefix(prefix: &str) -> Option<[u8; 3]> {
    let sep = if prefix.contains(':') { ':' } else { '-' };
    let parts: Vec<&str> = prefix.split(sep).collect();
    if parts.len() != 3 {
        return None;
    }

    let mut oui = [0u8; 3];
    for (slot, part) in oui.iter_mut().zip(parts) {
        if part.len() != 2 {
            return None;
        }
        *slot = u8::from_str_radix(part, 16).ok()?;
    }
    Some(oui)
}
