//! Output formatting structures for CLI display

use crate::helpers::format_relative_time;
use nixdex_core::{Platform, VersionEntry};
use nixdex_index::formatting::format_instant;
use tabled::Tabled;

/// Table row for displaying package versions
#[derive(Tabled)]
pub struct VersionRow {
    #[tabled(rename = "Version")]
    pub version: String,
    #[tabled(rename = "Commit")]
    pub commit: String,
    #[tabled(rename = "Date")]
    pub date: String,
    #[tabled(rename = "Store path")]
    pub store_path: String,
}

impl VersionRow {
    /// Row for `version`; the store path column shows the path for
    /// `system`, or the platforms recorded when no system is selected
    pub fn new(version: &str, entry: &VersionEntry, system: Option<&Platform>) -> Self {
        let store_path = match system {
            Some(platform) => entry.store_path(platform).unwrap_or("-").to_string(),
            None if entry.store_paths.is_empty() => "-".to_string(),
            None => entry
                .store_paths
                .keys()
                .map(Platform::as_str)
                .collect::<Vec<_>>()
                .join(", "),
        };
        Self {
            version: version.to_string(),
            commit: entry.commit().short().to_string(),
            date: format!(
                "{} ({})",
                format_instant(&entry.commit_timestamp),
                format_relative_time(&entry.commit_timestamp)
            ),
            store_path,
        }
    }
}
