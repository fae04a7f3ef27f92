//! Indexer configuration file
//!
//! ```toml
//! branch = "nixpkgs-unstable"
//!
//! [evaluation]
//! store_paths = true
//! systems = ["x86_64-linux", "aarch64-darwin"]
//!
//! [pkgs.ruby]
//! nixpkgs_attributes = ["ruby", "ruby_3_4", "ruby_3_3"]
//! ```

use crate::error::ConfigError;
use crate::models::{PackageSpec, Platform};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BRANCH: &str = "nixpkgs-unstable";
pub const DEFAULT_REMOTE: &str = "https://github.com/NixOS/nixpkgs.git";
pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_REPOSITORY: &str = "NixOS/nixpkgs";

/// Evaluation options threaded into the evaluator and driver
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvalOptions {
    /// Evaluate and record per-platform store paths
    pub store_paths: bool,

    /// Target platforms for store path evaluation
    pub systems: Vec<Platform>,

    /// Timeout for one `nix eval` invocation
    pub eval_timeout_secs: u64,

    /// Timeout for one shallow `git fetch`
    pub fetch_timeout_secs: u64,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            store_paths: false,
            systems: Vec::new(),
            eval_timeout_secs: 60,
            fetch_timeout_secs: 300,
        }
    }
}

impl EvalOptions {
    /// Platforms to evaluate store paths for; empty when not recording.
    pub fn target_systems(&self) -> &[Platform] {
        if self.store_paths {
            &self.systems
        } else {
            &[]
        }
    }

    pub fn eval_timeout(&self) -> Duration {
        Duration::from_secs(self.eval_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Where history is queried and commits are fetched from
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GithubOptions {
    pub api_url: String,
    /// "owner/name"
    pub repository: String,
    /// Git remote used for shallow fetches
    pub remote: String,
}

impl Default for GithubOptions {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            repository: DEFAULT_REPOSITORY.to_string(),
            remote: DEFAULT_REMOTE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct PackageConfig {
    #[serde(default)]
    nixpkgs_attributes: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default = "default_branch")]
    branch: String,
    #[serde(default)]
    evaluation: EvalOptions,
    #[serde(default)]
    github: GithubOptions,
    #[serde(default)]
    pkgs: BTreeMap<String, PackageConfig>,
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

/// Validated indexer configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    pub branch: String,
    pub evaluation: EvalOptions,
    pub github: GithubOptions,
    /// Packages in key order
    pub packages: Vec<PackageSpec>,
}

impl IndexConfig {
    /// Loads and validates a TOML config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        log::debug!("Opening config file: {:?}", path);
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates TOML config text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content)?;
        let config = Self {
            branch: raw.branch,
            evaluation: raw.evaluation,
            github: raw.github,
            packages: raw
                .pkgs
                .into_iter()
                .map(|(name, pkg)| PackageSpec::new(name, pkg.nixpkgs_attributes))
                .collect(),
        };
        config.validate()?;

        log::info!("Branch: {}", config.branch);
        log::info!("Loaded config with {} packages", config.packages.len());
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.branch.trim().is_empty() {
            return Err(ConfigError::Invalid("branch must not be empty".into()));
        }
        if self.packages.is_empty() {
            return Err(ConfigError::Invalid("no packages configured under [pkgs]".into()));
        }
        if self.evaluation.store_paths && self.evaluation.systems.is_empty() {
            return Err(ConfigError::Invalid(
                "evaluation.store_paths is enabled but evaluation.systems is empty".into(),
            ));
        }
        if self.evaluation.systems.iter().any(|s| s.as_str().trim().is_empty()) {
            return Err(ConfigError::Invalid("evaluation.systems contains an empty entry".into()));
        }
        if self.evaluation.eval_timeout_secs == 0 || self.evaluation.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be greater than zero".into()));
        }
        if !self.github.repository.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "github.repository must be 'owner/name', got '{}'",
                self.github.repository
            )));
        }

        for pkg in &self.packages {
            if pkg.attributes.is_empty() {
                log::warn!("Package '{}' has no nixpkgs_attributes, it will never be indexed", pkg.name);
            } else {
                log::debug!("Package '{}': {} attributes", pkg.name, pkg.attributes.len());
            }
        }
        Ok(())
    }

    /// Names of all configured packages
    pub fn package_names(&self) -> Vec<String> {
        self.packages.iter().map(|p| p.name.clone()).collect()
    }
}
