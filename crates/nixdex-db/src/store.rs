//! Persisted index document
//!
//! The ledger is written as one JSON document:
//!
//! ```json
//! { "pkgs": { "ruby": { "3.3.9": {
//!     "nixpkgs_commit": "...",
//!     "commit_timestamp": "2025-01-15T12:00:00Z",
//!     "store_paths": { "x86_64-linux": "/nix/store/..." } } } } }
//! ```
//!
//! Packages are sorted by name and versions newest first. Every write goes
//! to a temporary file next to the target which is then renamed over it, so
//! a crash never leaves a half-written index behind.

use crate::error::StoreError;
use nixdex_core::{compare_versions, Ledger, VersionEntry};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Reads and atomically writes the index document
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the ledger. A missing or blank file is an empty ledger; anything
    /// unparseable is an error.
    pub fn load(&self) -> Result<Ledger, StoreError> {
        if !self.path.exists() {
            log::debug!("Index file {:?} doesn't exist, starting empty", self.path);
            return Ok(Ledger::new());
        }

        let content = std::fs::read_to_string(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;

        if content.trim().is_empty() {
            log::warn!("Index file {:?} is empty, starting empty", self.path);
            return Ok(Ledger::new());
        }

        let ledger: Ledger = serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        for (name, versions) in &ledger.pkgs {
            log::debug!("  {}: {} versions", name, versions.len());
        }
        log::info!(
            "Loaded {} packages with {} total versions",
            ledger.package_count(),
            ledger.version_count()
        );
        Ok(ledger)
    }

    /// Writes the ledger via temp file + rename.
    pub fn save(&self, ledger: &Ledger) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(io_err)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".nixdex-index-")
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(io_err)?;

        serde_json::to_writer_pretty(&mut tmp, &OrderedLedger(ledger))
            .map_err(StoreError::Serialize)?;
        tmp.write_all(b"\n").map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;

        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;

        log::debug!(
            "Saved index: {} packages, {} versions",
            ledger.package_count(),
            ledger.version_count()
        );
        Ok(())
    }
}

/// Serializes a ledger with versions in descending canonical order
struct OrderedLedger<'a>(&'a Ledger);

struct OrderedVersions<'a>(&'a BTreeMap<String, VersionEntry>);

impl Serialize for OrderedLedger<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut doc = serializer.serialize_map(Some(1))?;
        let pkgs: BTreeMap<&str, OrderedVersions<'_>> = self
            .0
            .pkgs
            .iter()
            .map(|(name, versions)| (name.as_str(), OrderedVersions(versions)))
            .collect();
        doc.serialize_entry("pkgs", &pkgs)?;
        doc.end()
    }
}

impl Serialize for OrderedVersions<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut versions: Vec<(&String, &VersionEntry)> = self.0.iter().collect();
        versions.sort_by(|a, b| compare_versions(b.0, a.0));
        serializer.collect_map(versions)
    }
}
