//! Tests for time-window discovery

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use nixdex_core::CommitRef;
use nixdex_index::discovery::DEFAULT_MAX_STEPS;
use nixdex_index::fakes::FakeHistory;
use nixdex_index::{windows, CommitDiscovery, DiscoveryRequest, Order};

fn day(d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, d, h, 0, 0).unwrap()
}

fn sha(n: u32) -> String {
    format!("{:040x}", n)
}

/// One commit per day at noon, Jan 1 to Jan 30
fn daily_history() -> FakeHistory {
    FakeHistory::new((1..=30).map(|d| CommitRef::new(sha(d), day(d, 12))))
}

fn request(since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>, order: Order) -> DiscoveryRequest {
    DiscoveryRequest {
        branch: "nixpkgs-unstable".into(),
        since,
        until,
        step: TimeDelta::days(7),
        max_windows: None,
        order,
    }
}

async fn collect(history: &FakeHistory, request: &DiscoveryRequest) -> Vec<CommitRef> {
    let mut discovery = CommitDiscovery::start(history, request).await;
    let mut found = Vec::new();
    while let Some(commit) = discovery.next_commit().await {
        found.push(commit);
    }
    found
}

// ── window arithmetic ────────────────────────────────────────────────────────

#[test]
fn test_window_count_rounds_up() {
    let w = windows(Some(day(1, 0)), day(31, 0), TimeDelta::days(7), None, Order::NewestFirst);
    // 30 days / 7 days → 5 windows
    assert_eq!(w.len(), 5);

    let w = windows(Some(day(1, 0)), day(29, 0), TimeDelta::days(7), None, Order::NewestFirst);
    assert_eq!(w.len(), 4);

    let w = windows(Some(day(1, 0)), day(1, 6), TimeDelta::hours(1), None, Order::NewestFirst);
    assert_eq!(w.len(), 6);
}

#[test]
fn test_windows_cover_range_without_gaps() {
    let since = day(1, 0);
    let until = day(31, 0);
    let w = windows(Some(since), until, TimeDelta::days(7), None, Order::NewestFirst);

    assert_eq!(w.first().unwrap().end, until);
    assert_eq!(w.last().unwrap().start, since);
    for pair in w.windows(2) {
        assert_eq!(pair[0].start, pair[1].end);
    }
    // Oldest window is clamped at since
    assert_eq!(w.last().unwrap().end - w.last().unwrap().start, TimeDelta::days(2));
}

#[test]
fn test_oldest_first_reverses() {
    let newest = windows(Some(day(1, 0)), day(31, 0), TimeDelta::days(7), None, Order::NewestFirst);
    let mut oldest = windows(Some(day(1, 0)), day(31, 0), TimeDelta::days(7), None, Order::OldestFirst);
    oldest.reverse();
    assert_eq!(newest, oldest);
}

#[test]
fn test_empty_range() {
    let step = TimeDelta::days(7);
    assert!(windows(Some(day(10, 0)), day(10, 0), step, None, Order::NewestFirst).is_empty());
    assert!(windows(Some(day(20, 0)), day(10, 0), step, None, Order::NewestFirst).is_empty());
    assert!(windows(Some(day(1, 0)), day(10, 0), TimeDelta::zero(), None, Order::NewestFirst).is_empty());
}

#[test]
fn test_window_bound() {
    let w = windows(None, day(31, 0), TimeDelta::hours(1), None, Order::NewestFirst);
    assert_eq!(w.len(), DEFAULT_MAX_STEPS);

    let w = windows(Some(day(1, 0)), day(31, 0), TimeDelta::days(7), Some(2), Order::NewestFirst);
    assert_eq!(w.len(), 2);
    // newest windows are the ones kept
    assert_eq!(w[0].end, day(31, 0));
}

// ── commit sampling ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_one_oldest_commit_per_window() {
    let history = daily_history();
    let req = request(Some(day(1, 0)), Some(day(31, 0)), Order::NewestFirst);
    let found = collect(&history, &req).await;

    let picked: Vec<DateTime<Utc>> = found.iter().map(|c| c.timestamp).collect();
    assert_eq!(picked, vec![day(24, 12), day(17, 12), day(10, 12), day(3, 12), day(1, 12)]);

    // Each representative lies inside the window it was found in
    let w = windows(req.since, day(31, 0), req.step, None, req.order);
    for (commit, window) in found.iter().zip(&w) {
        assert!(window.contains(commit.timestamp));
    }
}

#[tokio::test]
async fn test_commit_on_window_end_belongs_to_next_window() {
    let history = FakeHistory::new([
        CommitRef::new(sha(1), day(8, 0)),
        CommitRef::new(sha(2), day(5, 0)),
    ]);
    let req = request(Some(day(1, 0)), Some(day(15, 0)), Order::NewestFirst);
    let found = collect(&history, &req).await;

    // [8, 15) holds the commit at exactly day 8; [1, 8) holds day 5
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].sha, sha(1));
    assert_eq!(found[1].sha, sha(2));
}

#[tokio::test]
async fn test_empty_windows_are_skipped() {
    let history = FakeHistory::new([
        CommitRef::new(sha(1), day(2, 12)),
        CommitRef::new(sha(2), day(28, 12)),
    ]);
    let req = request(Some(day(1, 0)), Some(day(31, 0)), Order::OldestFirst);
    let mut discovery = CommitDiscovery::start(&history, &req).await;

    assert_eq!(discovery.next_commit().await.unwrap().sha, sha(1));
    assert_eq!(discovery.next_commit().await.unwrap().sha, sha(2));
    assert!(discovery.next_commit().await.is_none());

    let stats = discovery.stats();
    assert_eq!(stats.windows, 5);
    assert_eq!(stats.empty, 3);
}

#[tokio::test]
async fn test_failed_window_does_not_stop_discovery() {
    let history = daily_history();
    history.fail_window(day(17, 0));
    let req = request(Some(day(1, 0)), Some(day(31, 0)), Order::NewestFirst);

    let mut discovery = CommitDiscovery::start(&history, &req).await;
    let mut found = Vec::new();
    while let Some(c) = discovery.next_commit().await {
        found.push(c.timestamp);
    }

    assert_eq!(found, vec![day(24, 12), day(10, 12), day(3, 12), day(1, 12)]);
    assert_eq!(discovery.stats().failed, 1);
}

#[tokio::test]
async fn test_future_since_yields_nothing() {
    let history = daily_history();
    let req = request(Some(day(31, 0)), None, Order::NewestFirst);
    assert!(collect(&history, &req).await.is_empty());
}

#[tokio::test]
async fn test_head_is_first_candidate_without_until() {
    let history = daily_history();
    let req = request(Some(day(16, 0)), None, Order::NewestFirst);
    let found = collect(&history, &req).await;

    // HEAD is the Jan 30 noon commit. Windows: [23 noon, 30 noon),
    // [16 noon, 23 noon) and the empty [16 0h, 16 noon)
    assert_eq!(found[0].sha, sha(30));
    assert_eq!(found.len(), 3);
    assert_eq!(found[1].timestamp, day(23, 12));
    assert_eq!(found[2].timestamp, day(16, 12));
}

#[tokio::test]
async fn test_head_is_last_when_oldest_first() {
    let history = daily_history();
    let req = request(Some(day(16, 0)), None, Order::OldestFirst);
    let found = collect(&history, &req).await;
    assert_eq!(found.last().unwrap().sha, sha(30));
}

#[tokio::test]
async fn test_discovery_is_lazy() {
    let history = daily_history();
    let req = request(Some(day(1, 0)), Some(day(31, 0)), Order::NewestFirst);
    let mut discovery = CommitDiscovery::start(&history, &req).await;

    discovery.next_commit().await;
    assert_eq!(history.queries().len(), 1);
    assert_eq!(discovery.remaining(), 4);
}
