//! Commit discovery by time window
//!
//! The range `[since, until)` is cut into windows of one step each, starting
//! at `until` and walking back. Each window is sampled once: its oldest
//! commit represents the state of the branch at the start of the interval.
//! Empty windows and windows whose requests keep failing are skipped.

use crate::formatting::format_instant;
use crate::github::{select_oldest, HistoryApi};
use chrono::{DateTime, TimeDelta, Utc};
use nixdex_core::CommitRef;
use std::collections::VecDeque;

/// Window count used when no lower bound is given
pub const DEFAULT_MAX_STEPS: usize = 1000;

/// Order in which windows are visited
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    /// Most recent window first
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Half-open time interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t < self.end
    }
}

/// Cuts `[since, until)` into windows of `step`.
///
/// Windows are computed from `until` backwards and the oldest one is clamped
/// at `since`, so there are `⌈(until - since) / step⌉` of them. Without
/// `since` the count is bounded by `max_windows` alone (default
/// [`DEFAULT_MAX_STEPS`]). When both apply, the newest windows are
/// kept.
pub fn windows(
    since: Option<DateTime<Utc>>,
    until: DateTime<Utc>,
    step: TimeDelta,
    max_windows: Option<usize>,
    order: Order,
) -> Vec<Window> {
    if step <= TimeDelta::zero() {
        return Vec::new();
    }
    let limit = match (since, max_windows) {
        (_, Some(n)) => n,
        (Some(_), None) => usize::MAX,
        (None, None) => DEFAULT_MAX_STEPS,
    };

    let mut result = Vec::new();
    let mut cursor = until;
    while result.len() < limit {
        if let Some(since) = since {
            if cursor <= since {
                break;
            }
        }
        let Some(mut start) = cursor.checked_sub_signed(step) else {
            break;
        };
        if let Some(since) = since {
            start = start.max(since);
        }
        result.push(Window { start, end: cursor });
        cursor = start;
    }

    if order == Order::OldestFirst {
        result.reverse();
    }
    result
}

/// Parameters of one discovery pass
#[derive(Debug, Clone)]
pub struct DiscoveryRequest {
    pub branch: String,
    pub since: Option<DateTime<Utc>>,
    /// Defaults to the branch HEAD, which is then yielded as a candidate too
    pub until: Option<DateTime<Utc>>,
    pub step: TimeDelta,
    /// Upper bound on windows; see [`windows`]
    pub max_windows: Option<usize>,
    pub order: Order,
}

/// Counters for the windows visited so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryStats {
    pub windows: usize,
    pub empty: usize,
    pub failed: usize,
}

/// Lazily walks the windows, querying the history API one window at a time
pub struct CommitDiscovery<'a, H: HistoryApi + ?Sized> {
    api: &'a H,
    branch: String,
    order: Order,
    head: Option<CommitRef>,
    pending: VecDeque<Window>,
    total: usize,
    stats: DiscoveryStats,
}

impl<'a, H: HistoryApi + ?Sized> CommitDiscovery<'a, H> {
    pub async fn start(api: &'a H, request: &DiscoveryRequest) -> Self {
        match api.rate_limit().await {
            Ok(rl) => log::info!("GitHub API rate limit: {}/{} remaining", rl.remaining, rl.limit),
            Err(e) => log::warn!("Failed to check rate limit: {}", e),
        }

        let mut head = None;
        let until = match request.until {
            Some(until) => {
                log::info!("Starting from specified until time: {}", format_instant(&until));
                until
            }
            None => match api.branch_head(&request.branch).await {
                Ok(commit) => {
                    log::info!("Starting from branch HEAD: {}", commit);
                    let until = commit.timestamp;
                    head = Some(commit);
                    until
                }
                Err(e) => {
                    let now = Utc::now();
                    log::warn!(
                        "Failed to get HEAD of {}: {}, starting from {}",
                        request.branch,
                        e,
                        format_instant(&now)
                    );
                    now
                }
            },
        };

        if let Some(since) = request.since {
            if since >= until {
                log::warn!(
                    "since ({}) is not before until ({}), nothing to discover",
                    format_instant(&since),
                    format_instant(&until)
                );
                head = None;
            }
        }

        let pending: VecDeque<Window> =
            windows(request.since, until, request.step, request.max_windows, request.order).into();
        log::info!("Calculated {} windows to query", pending.len());

        Self {
            api,
            branch: request.branch.clone(),
            order: request.order,
            head,
            total: pending.len(),
            pending,
            stats: DiscoveryStats::default(),
        }
    }

    /// Next representative commit, or `None` once every window was visited
    pub async fn next_commit(&mut self) -> Option<CommitRef> {
        if self.order == Order::NewestFirst {
            if let Some(head) = self.head.take() {
                return Some(head);
            }
        }

        while let Some(window) = self.pending.pop_front() {
            self.stats.windows += 1;
            log::debug!(
                "Window {}/{}: {} to {}",
                self.stats.windows,
                self.total,
                format_instant(&window.start),
                format_instant(&window.end)
            );

            match self.api.commits_in_window(&self.branch, window.start, window.end).await {
                Ok(commits) => match select_oldest(&commits, window.start, window.end) {
                    Some(commit) => {
                        log::debug!("  Found: {}", commit);
                        return Some(commit);
                    }
                    None => {
                        log::debug!("  No commits found in window");
                        self.stats.empty += 1;
                    }
                },
                Err(e) => {
                    log::warn!(
                        "Skipping window {} to {}: {}",
                        format_instant(&window.start),
                        format_instant(&window.end),
                        e
                    );
                    self.stats.failed += 1;
                }
            }
        }

        self.head.take()
    }

    pub fn stats(&self) -> DiscoveryStats {
        self.stats
    }

    /// Windows not visited yet
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}
