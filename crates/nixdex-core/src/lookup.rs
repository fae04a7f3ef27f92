//! Read-side queries against a loaded ledger
//!
//! This is the contract the version-manager plugin relies on: a version
//! without a store path for the requested platform is "not found", never a
//! parse error.

use crate::models::{Ledger, Platform, VersionEntry};
use crate::version::compare_versions;

/// Lookup failures reported to the consumer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("Package '{package}' is not in the index")]
    UnknownPackage { package: String },

    #[error("Version {package}@{version} is not in the index")]
    UnknownVersion { package: String, version: String },

    #[error("No store path for {package}@{version} on {platform}")]
    NoArtifact {
        package: String,
        version: String,
        platform: Platform,
    },

    #[error("No versions found for package '{package}'{}", platform_suffix(.platform))]
    NoVersionsFound {
        package: String,
        platform: Option<Platform>,
    },
}

fn platform_suffix(platform: &Option<Platform>) -> String {
    match platform {
        Some(p) => format!(" on {}", p),
        None => String::new(),
    }
}

/// Returns the store path recorded for `package@version` on `platform`.
pub fn find_artifact<'a>(
    ledger: &'a Ledger,
    package: &str,
    version: &str,
    platform: &Platform,
) -> Result<&'a str, LookupError> {
    let versions = ledger
        .versions(package)
        .ok_or_else(|| LookupError::UnknownPackage {
            package: package.to_string(),
        })?;

    let entry = versions
        .get(version)
        .ok_or_else(|| LookupError::UnknownVersion {
            package: package.to_string(),
            version: version.to_string(),
        })?;

    entry.store_path(platform).ok_or_else(|| LookupError::NoArtifact {
        package: package.to_string(),
        version: version.to_string(),
        platform: platform.clone(),
    })
}

/// Lists the versions of `package` in canonical ascending order.
///
/// With a platform, only versions that have a store path for it are
/// returned. An empty result is reported as [`LookupError::NoVersionsFound`].
pub fn list_versions<'a>(
    ledger: &'a Ledger,
    package: &str,
    platform: Option<&Platform>,
) -> Result<Vec<(&'a str, &'a VersionEntry)>, LookupError> {
    let mut found: Vec<(&str, &VersionEntry)> = ledger
        .versions(package)
        .into_iter()
        .flatten()
        .filter(|(_, entry)| platform.map_or(true, |p| entry.store_path(p).is_some()))
        .map(|(version, entry)| (version.as_str(), entry))
        .collect();

    if found.is_empty() {
        return Err(LookupError::NoVersionsFound {
            package: package.to_string(),
            platform: platform.cloned(),
        });
    }

    found.sort_by(|a, b| compare_versions(a.0, b.0));
    Ok(found)
}
