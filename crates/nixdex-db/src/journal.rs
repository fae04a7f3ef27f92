//! Journal of commits already merged into the index
//!
//! A sled tree keyed by the raw 20-byte commit SHA. Each record remembers,
//! per package, which attributes and platforms evaluated cleanly at that
//! commit, so a resumed run only skips a commit when its whole contribution
//! under the current configuration is already in the persisted index.

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use data_encoding::HEXLOWER;
use nixdex_core::{CommitRef, PackageSpec};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Attributes and platforms of one package evaluated at a commit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageCoverage {
    pub attributes: BTreeSet<String>,
    pub systems: BTreeSet<String>,
}

impl PackageCoverage {
    fn covers(&self, spec: &PackageSpec, systems: &[String]) -> bool {
        spec.attributes.iter().all(|a| self.attributes.contains(a))
            && systems.iter().all(|s| self.systems.contains(s))
    }
}

/// What was evaluated at a journaled commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRecord {
    /// Commit timestamp (Unix epoch)
    pub timestamp: i64,
    pub packages: BTreeMap<String, PackageCoverage>,
}

impl JournalRecord {
    pub fn new(commit: &CommitRef) -> Self {
        Self {
            timestamp: commit.timestamp.timestamp(),
            packages: BTreeMap::new(),
        }
    }

    /// Adds `spec` as fully evaluated on `systems`
    pub fn with_package<S: AsRef<str>>(mut self, spec: &PackageSpec, systems: &[S]) -> Self {
        self.packages.insert(
            spec.name.clone(),
            PackageCoverage {
                attributes: spec.attributes.iter().cloned().collect(),
                systems: systems.iter().map(|s| s.as_ref().to_string()).collect(),
            },
        );
        self
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// True if every package, with all of its attributes, was evaluated on
    /// every requested system
    pub fn covers(&self, packages: &[PackageSpec], systems: &[String]) -> bool {
        packages.iter().all(|spec| {
            self.packages
                .get(&spec.name)
                .is_some_and(|coverage| coverage.covers(spec, systems))
        })
    }

    pub fn committed_at(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.timestamp, 0)
    }
}

/// Convert a hex commit SHA into its raw key bytes.
fn commit_key(sha: &str) -> Result<Vec<u8>, StoreError> {
    let bytes = HEXLOWER
        .decode(sha.to_ascii_lowercase().as_bytes())
        .map_err(|_| StoreError::InvalidSha(sha.to_string()))?;
    if bytes.len() != 20 {
        return Err(StoreError::InvalidSha(sha.to_string()));
    }
    Ok(bytes)
}

/// sled-backed journal of processed commits
pub struct CommitJournal {
    processed_commits: sled::Tree,
    db: sled::Db,
    path: PathBuf,
}

impl CommitJournal {
    /// Opens or creates the journal at the given directory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let db = sled::open(&path).map_err(|source| StoreError::Journal {
            path: path.clone(),
            source,
        })?;
        let processed_commits = db
            .open_tree("processed_commits")
            .map_err(|source| StoreError::Journal {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            processed_commits,
            db,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sled_err(&self, source: sled::Error) -> StoreError {
        StoreError::Journal {
            path: self.path.clone(),
            source,
        }
    }

    /// Records a commit as merged. Packages in `record` replace their
    /// earlier coverage; other packages of an existing record are kept.
    pub fn mark_processed(&self, commit: &CommitRef, record: &JournalRecord) -> Result<(), StoreError> {
        let key = commit_key(&commit.sha)?;

        let merged = match self.get_by_key(&key)? {
            Some(mut existing) => {
                existing
                    .packages
                    .extend(record.packages.iter().map(|(k, v)| (k.clone(), v.clone())));
                existing
            }
            None => record.clone(),
        };

        let value = bincode::serialize(&merged).map_err(StoreError::Encode)?;
        self.processed_commits
            .insert(key, value)
            .map_err(|e| self.sled_err(e))?;
        Ok(())
    }

    pub fn get(&self, sha: &str) -> Result<Option<JournalRecord>, StoreError> {
        self.get_by_key(&commit_key(sha)?)
    }

    fn get_by_key(&self, key: &[u8]) -> Result<Option<JournalRecord>, StoreError> {
        match self.processed_commits.get(key).map_err(|e| self.sled_err(e))? {
            Some(bytes) => match bincode::deserialize(&bytes) {
                Ok(record) => Ok(Some(record)),
                Err(_) => {
                    // Corrupted record - treat the commit as not processed
                    log::warn!("Corrupted journal record for {}, ignoring", HEXLOWER.encode(key));
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Checks if a commit was already merged for all given packages/systems
    pub fn is_covered(&self, sha: &str, packages: &[PackageSpec], systems: &[String]) -> Result<bool, StoreError> {
        Ok(self
            .get(sha)?
            .is_some_and(|record| record.covers(packages, systems)))
    }

    /// Returns the number of journaled commits
    pub fn processed_commit_count(&self) -> usize {
        self.processed_commits.len()
    }

    /// Forgets every journaled commit (used by full rebuilds)
    pub fn clear(&self) -> Result<(), StoreError> {
        self.processed_commits.clear().map_err(|e| self.sled_err(e))
    }

    /// Flushes all pending operations to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush().map_err(|e| self.sled_err(e))?;
        Ok(())
    }
}
