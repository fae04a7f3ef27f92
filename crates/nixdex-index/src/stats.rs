//! Run statistics

use crate::formatting::{format_duration, format_number};
use std::fmt;
use std::time::Duration;

/// Where the driver is (or stopped) in its loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Discovering,
    CheckingOut,
    Evaluating,
    Merging,
    Persisting,
    Done,
    Aborted,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Discovering => "discovering",
            Phase::CheckingOut => "checking out",
            Phase::Evaluating => "evaluating",
            Phase::Merging => "merging",
            Phase::Persisting => "persisting",
            Phase::Done => "done",
            Phase::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Indexing statistics
#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    /// Commits checked out, evaluated and merged
    pub processed: usize,
    /// Commits skipped after a checkout failure or with nothing evaluated
    pub skipped: usize,
    /// Commits the journal already covered
    pub already_indexed: usize,
    pub evaluations_failed: usize,
    pub versions_inserted: usize,
    pub versions_replaced: usize,
    pub checkpoints: usize,
    /// Stopped early on request
    pub interrupted: bool,
    pub phase: Phase,
    pub elapsed_time: Duration,
}

impl IndexStats {
    /// Commits taken from discovery, whatever happened to them
    pub fn commits_seen(&self) -> usize {
        self.processed + self.skipped + self.already_indexed
    }
}

impl fmt::Display for IndexStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Commits: {} processed, {} skipped, {} already indexed | Evaluations failed: {} | Versions: {} new, {} updated | Time: {}",
            format_number(self.processed),
            format_number(self.skipped),
            format_number(self.already_indexed),
            format_number(self.evaluations_failed),
            format_number(self.versions_inserted),
            format_number(self.versions_replaced),
            format_duration(self.elapsed_time)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_display() {
        let stats = IndexStats {
            processed: 1200,
            skipped: 3,
            evaluations_failed: 17,
            versions_inserted: 42,
            elapsed_time: Duration::from_secs(75),
            ..Default::default()
        };
        assert_eq!(
            stats.to_string(),
            "Commits: 1,200 processed, 3 skipped, 0 already indexed | Evaluations failed: 17 | Versions: 42 new, 0 updated | Time: 1m 15s"
        );
        assert_eq!(stats.commits_seen(), 1203);
    }
}
