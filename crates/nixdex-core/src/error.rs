//! Error types for nixdex-core

use std::path::PathBuf;

/// Configuration errors; all of them are fatal at startup
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors reading time and interval arguments
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid interval '{0}': expected <n>h or <n>d, e.g. 6h or 14d")]
    InvalidInterval(String),

    #[error("Invalid instant '{0}': expected RFC 3339 or YYYY-MM-DD")]
    InvalidInstant(String),
}
