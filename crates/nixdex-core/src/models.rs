//! Core data models for the index

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Target platform identifier (e.g. "x86_64-linux", "aarch64-darwin")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Platform(String);

impl Platform {
    pub fn new(system: impl Into<String>) -> Self {
        Self(system.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Platform {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Platform {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A package to index and the Nixpkgs attributes that provide it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    /// Human-friendly package id used as the key in the index (e.g. "ruby")
    pub name: String,

    /// Attribute names evaluated at every commit (e.g. ["ruby", "ruby_3_4"])
    pub attributes: Vec<String>,
}

impl PackageSpec {
    pub fn new(name: impl Into<String>, attributes: Vec<String>) -> Self {
        Self {
            name: name.into(),
            attributes,
        }
    }
}

/// A Nixpkgs commit with its committer timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    pub sha: String,
    pub timestamp: DateTime<Utc>,
}

impl CommitRef {
    pub fn new(sha: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            sha: sha.into(),
            timestamp,
        }
    }

    /// First 12 characters of the SHA, for log lines
    pub fn short(&self) -> &str {
        &self.sha[..12.min(self.sha.len())]
    }
}

impl fmt::Display for CommitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.short(), self.timestamp.format("%Y-%m-%d %H:%M"))
    }
}

/// What one attribute evaluated to at one commit.
///
/// `version` is `None` when the attribute is missing or its evaluation
/// failed; `store_paths` only holds the platforms that evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationResult {
    pub attribute: String,
    pub version: Option<String>,
    pub store_paths: BTreeMap<Platform, String>,
}

impl EvaluationResult {
    pub fn new(attribute: impl Into<String>, version: Option<String>) -> Self {
        Self {
            attribute: attribute.into(),
            version,
            store_paths: BTreeMap::new(),
        }
    }

    pub fn with_store_path(mut self, platform: impl Into<Platform>, path: impl Into<String>) -> Self {
        self.store_paths.insert(platform.into(), path.into());
        self
    }
}

/// Index entry for one (package, version) pair
///
/// Field names are the on-disk contract read by the version-manager plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    /// Commit SHA in Nixpkgs
    pub nixpkgs_commit: String,

    /// Commit timestamp (ISO-8601)
    pub commit_timestamp: DateTime<Utc>,

    /// Store path per platform; omitted when store paths are not recorded
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub store_paths: BTreeMap<Platform, String>,
}

impl VersionEntry {
    pub fn new(commit: &CommitRef, store_paths: BTreeMap<Platform, String>) -> Self {
        Self {
            nixpkgs_commit: commit.sha.clone(),
            commit_timestamp: commit.timestamp,
            store_paths,
        }
    }

    pub fn commit(&self) -> CommitRef {
        CommitRef::new(self.nixpkgs_commit.clone(), self.commit_timestamp)
    }

    pub fn store_path(&self, platform: &Platform) -> Option<&str> {
        self.store_paths.get(platform).map(String::as_str)
    }
}

/// All indexed versions: package → version → entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub pkgs: BTreeMap<String, BTreeMap<String, VersionEntry>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, package: &str, version: &str) -> Option<&VersionEntry> {
        self.pkgs.get(package)?.get(version)
    }

    pub fn versions(&self, package: &str) -> Option<&BTreeMap<String, VersionEntry>> {
        self.pkgs.get(package)
    }

    pub fn package_names(&self) -> impl Iterator<Item = &str> {
        self.pkgs.keys().map(String::as_str)
    }

    pub fn package_count(&self) -> usize {
        self.pkgs.len()
    }

    /// Total number of (package, version) entries
    pub fn version_count(&self) -> usize {
        self.pkgs.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pkgs.values().all(BTreeMap::is_empty)
    }
}
