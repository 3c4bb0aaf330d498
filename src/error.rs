//! Error types surfaced by a discovery run.

use thiserror::Error;

/// Failures that terminate a run. Probe errors, unparseable neighbor lines and
/// lookup misses never show up here; they only shrink the report.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("No usable network adapter: {0}")]
    Configuration(String),

    #[error("Invalid subnet '{input}': {reason}")]
    Validation { input: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ScanError>;
