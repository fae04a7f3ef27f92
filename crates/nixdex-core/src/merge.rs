//! Merging evaluated commits into the ledger
//!
//! For each unique (package, version) only one entry is kept: the one from
//! the newest commit that reported it. An existing entry is replaced only
//! when the incoming commit is strictly newer; a different commit with an
//! equal timestamp keeps the first-seen entry. Attributes of the same commit
//! that report the same version add their store paths to one entry. Entries
//! are never removed.

use crate::models::{CommitRef, EvaluationResult, Ledger, VersionEntry};

/// What a merge did to the ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub inserted: usize,
    pub replaced: usize,
    pub unchanged: usize,
}

impl MergeOutcome {
    pub fn changed(&self) -> usize {
        self.inserted + self.replaced
    }

    pub fn absorb(&mut self, other: MergeOutcome) {
        self.inserted += other.inserted;
        self.replaced += other.replaced;
        self.unchanged += other.unchanged;
    }
}

/// Result of inserting a single version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    Inserted,
    Replaced,
    Unchanged,
}

impl Ledger {
    /// Inserts a version entry only if it is newer than the existing one.
    ///
    /// A result from the commit already recorded adds its store paths, the
    /// later result winning for a platform both report.
    pub fn insert_if_newer(
        &mut self,
        package: &str,
        version: &str,
        commit: &CommitRef,
        result: &EvaluationResult,
    ) -> MergeAction {
        let versions = self.pkgs.entry(package.to_string()).or_default();

        match versions.get_mut(version) {
            None => {
                versions.insert(
                    version.to_string(),
                    VersionEntry::new(commit, result.store_paths.clone()),
                );
                log::debug!("New: {}:{} @ {}", package, version, commit.short());
                MergeAction::Inserted
            }
            Some(existing) if commit.sha == existing.nixpkgs_commit => {
                let mut changed = false;
                for (platform, path) in &result.store_paths {
                    if existing.store_paths.get(platform) != Some(path) {
                        existing.store_paths.insert(platform.clone(), path.clone());
                        changed = true;
                    }
                }
                if changed {
                    log::debug!("Extended store paths of {}:{} @ {}", package, version, commit.short());
                    MergeAction::Replaced
                } else {
                    MergeAction::Unchanged
                }
            }
            Some(existing) if commit.timestamp > existing.commit_timestamp => {
                log::debug!(
                    "Updating {}:{} from commit {} -> {} (newer timestamp)",
                    package,
                    version,
                    &existing.nixpkgs_commit[..12.min(existing.nixpkgs_commit.len())],
                    commit.short()
                );
                *existing = VersionEntry::new(commit, result.store_paths.clone());
                MergeAction::Replaced
            }
            Some(existing) => {
                if commit.timestamp == existing.commit_timestamp {
                    log::warn!(
                        "{}:{} seen at {} and {} with identical timestamps, keeping first",
                        package,
                        version,
                        &existing.nixpkgs_commit[..12.min(existing.nixpkgs_commit.len())],
                        commit.short()
                    );
                }
                MergeAction::Unchanged
            }
        }
    }

    /// Merges one package's evaluation results for one commit.
    ///
    /// Results without a version (failed or missing attributes) are ignored.
    /// When two attributes report the same version in the same commit they
    /// share one entry holding the store paths of both.
    pub fn merge_package(
        &mut self,
        package: &str,
        commit: &CommitRef,
        results: &[EvaluationResult],
    ) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        for result in results {
            let Some(version) = result.version.as_deref() else {
                continue;
            };
            match self.insert_if_newer(package, version, commit, result) {
                MergeAction::Inserted => outcome.inserted += 1,
                MergeAction::Replaced => outcome.replaced += 1,
                MergeAction::Unchanged => outcome.unchanged += 1,
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn commit(sha: &str, day: u32) -> CommitRef {
        CommitRef::new(sha, Utc.with_ymd_and_hms(2025, 1, day, 12, 0, 0).unwrap())
    }

    #[test]
    fn test_results_without_version_are_skipped() {
        let mut ledger = Ledger::new();
        let outcome = ledger.merge_package(
            "ruby",
            &commit("c1", 1),
            &[EvaluationResult::new("ruby_3_1", None)],
        );
        assert_eq!(outcome, MergeOutcome::default());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_same_commit_two_attributes_same_version() {
        let mut ledger = Ledger::new();
        let c = commit("c1", 1);
        let outcome = ledger.merge_package(
            "ruby",
            &c,
            &[
                EvaluationResult::new("ruby", Some("3.3.9".into())),
                EvaluationResult::new("ruby_3_3", Some("3.3.9".into())),
            ],
        );
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.unchanged, 1);
        assert_eq!(ledger.version_count(), 1);
    }

    #[test]
    fn test_same_commit_attributes_share_store_paths() {
        let mut ledger = Ledger::new();
        let c = commit("c2", 2);
        // `ruby` only evaluated on linux, `ruby_3_3` on both platforms
        let outcome = ledger.merge_package(
            "ruby",
            &c,
            &[
                EvaluationResult::new("ruby", Some("3.3.8".into()))
                    .with_store_path("x86_64-linux", "/nix/store/aaa-ruby-3.3.8"),
                EvaluationResult::new("ruby_3_3", Some("3.3.8".into()))
                    .with_store_path("x86_64-linux", "/nix/store/aaa-ruby-3.3.8")
                    .with_store_path("aarch64-darwin", "/nix/store/bbb-ruby-3.3.8"),
            ],
        );
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.replaced, 1);

        let entry = ledger.get("ruby", "3.3.8").unwrap();
        assert_eq!(entry.nixpkgs_commit, "c2");
        assert_eq!(entry.store_path(&"x86_64-linux".into()), Some("/nix/store/aaa-ruby-3.3.8"));
        assert_eq!(entry.store_path(&"aarch64-darwin".into()), Some("/nix/store/bbb-ruby-3.3.8"));

        // Merging the same results again changes nothing
        let again = ledger.merge_package(
            "ruby",
            &c,
            &[EvaluationResult::new("ruby_3_3", Some("3.3.8".into()))
                .with_store_path("aarch64-darwin", "/nix/store/bbb-ruby-3.3.8")],
        );
        assert_eq!(again.unchanged, 1);
        assert_eq!(ledger.get("ruby", "3.3.8").unwrap().store_paths.len(), 2);
    }
}
