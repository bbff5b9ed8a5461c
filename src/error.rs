//! Error types for the spam scoring core and its configuration.

use std::path::PathBuf;

/// Errors raised by the score store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Slot index is outside the store's capacity.
    #[error("Slot {slot} out of range (capacity {capacity})")]
    OutOfRange { slot: usize, capacity: usize },
}

/// Errors raised while loading or validating a spam policy.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A field violates its invariant. The policy is rejected as a whole.
    #[error("Invalid config: {field} {reason}")]
    Invalid { field: &'static str, reason: String },

    /// The configuration file could not be read or written.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for the expected shape.
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Top-level error for callers that handle store and config failures together.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for antispam operations.
pub type Result<T> = std::result::Result<T, Error>;
