//! Error types for nixdex-db

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Index file {path:?} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize index: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Journal error at {path:?}: {source}")]
    Journal {
        path: PathBuf,
        #[source]
        source: sled::Error,
    },

    #[error("Failed to encode journal record: {0}")]
    Encode(#[source] bincode::Error),

    #[error("Invalid commit SHA: {0}")]
    InvalidSha(String),
}
