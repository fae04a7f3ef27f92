//! Nixdex Core - Shared data models, merge policy and version ordering
//!
//! This crate defines the ledger of indexed package versions, the rule for
//! merging newly evaluated commits into it, the canonical version ordering,
//! and the read-side lookups used by consumers of the index.

mod config;
mod error;
mod lookup;
mod merge;
mod models;
mod time;
mod version;

pub use config::{EvalOptions, GithubOptions, IndexConfig, DEFAULT_BRANCH};
pub use error::{ConfigError, CoreError};
pub use lookup::{find_artifact, list_versions, LookupError};
pub use merge::{MergeAction, MergeOutcome};
pub use models::{CommitRef, EvaluationResult, Ledger, PackageSpec, Platform, VersionEntry};
pub use time::{parse_instant, parse_interval};
pub use version::{compare_versions, sort_versions};
