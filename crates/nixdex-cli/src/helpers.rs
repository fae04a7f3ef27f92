//! Helper functions for CLI operations

use chrono::{DateTime, Utc};
use nixdex_core::Ledger;
use std::path::{Path, PathBuf};

/// Minimum Jaro-Winkler similarity for a "did you mean" suggestion
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// Package names in the index that look like `name`, most similar first
pub fn similar_packages(ledger: &Ledger, name: &str) -> Vec<String> {
    let mut scored: Vec<(f64, &str)> = ledger
        .package_names()
        .map(|candidate| (strsim::jaro_winkler(name, candidate), candidate))
        .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    scored.into_iter().take(3).map(|(_, n)| n.to_string()).collect()
}

/// Default journal directory: `<index stem>.journal` next to the index
pub fn default_journal_path(index: &Path) -> PathBuf {
    index.with_extension("journal")
}

/// Splits "ruby@3.3.9" into package and version
pub fn split_package_spec(spec: &str) -> Option<(&str, &str)> {
    let (package, version) = spec.split_once('@')?;
    if package.is_empty() || version.is_empty() {
        return None;
    }
    Some((package, version))
}

/// Formats a timestamp as relative time (e.g., "2 days ago")
pub fn format_relative_time(dt: &DateTime<Utc>) -> String {
    let duration = Utc::now().signed_duration_since(*dt);

    if duration.num_seconds() < 60 {
        "just now".to_string()
    } else if duration.num_minutes() < 60 {
        let mins = duration.num_minutes();
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if duration.num_hours() < 24 {
        let hours = duration.num_hours();
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if duration.num_days() < 30 {
        let days = duration.num_days();
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else if duration.num_days() < 365 {
        let months = duration.num_days() / 30;
        format!("{} month{} ago", months, if months == 1 { "" } else { "s" })
    } else {
        let years = duration.num_days() / 365;
        format!("{} year{} ago", years, if years == 1 { "" } else { "s" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use nixdex_core::{CommitRef, EvaluationResult};

    fn ledger_with(names: &[&str]) -> Ledger {
        let mut ledger = Ledger::new();
        let commit = CommitRef::new("a".repeat(40), Utc::now());
        for name in names {
            ledger.merge_package(name, &commit, &[EvaluationResult::new(*name, Some("1.0".into()))]);
        }
        ledger
    }

    #[test]
    fn test_similar_packages() {
        let ledger = ledger_with(&["ruby", "python3", "nodejs", "rustc"]);
        assert_eq!(similar_packages(&ledger, "rubyy"), vec!["ruby"]);
        assert_eq!(similar_packages(&ledger, "python"), vec!["python3"]);
        assert!(similar_packages(&ledger, "zzzz").is_empty());
    }

    #[test]
    fn test_split_package_spec() {
        assert_eq!(split_package_spec("ruby@3.3.9"), Some(("ruby", "3.3.9")));
        assert_eq!(split_package_spec("ruby"), None);
        assert_eq!(split_package_spec("@3.3.9"), None);
        assert_eq!(split_package_spec("ruby@"), None);
    }

    #[test]
    fn test_default_journal_path() {
        assert_eq!(
            default_journal_path(Path::new("/data/ruby.json")),
            PathBuf::from("/data/ruby.journal")
        );
    }

    #[test]
    fn test_format_relative_time() {
        let now = Utc::now();
        assert_eq!(format_relative_time(&now), "just now");
        assert_eq!(format_relative_time(&(now - TimeDelta::hours(2))), "2 hours ago");
        assert_eq!(format_relative_time(&(now - TimeDelta::days(1))), "1 day ago");
        assert_eq!(format_relative_time(&(now - TimeDelta::days(800))), "2 years ago");
    }
}
