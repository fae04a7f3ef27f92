//! In-memory fakes for the driver's collaborators (testing only)
//!
//! Provides `FakeHistory`, `FakeCheckout` and `FakeEvaluator`, which satisfy
//! the trait contracts without network access, git or nix.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nixdex_core::{CommitRef, Platform};

use crate::checkout::{Checkout, CheckoutError, CheckoutErrorKind};
use crate::evaluator::{EvalError, EvalFailureKind, Evaluator};
use crate::github::{DiscoveryError, HistoryApi, RateLimit};

// ---------------------------------------------------------------------------
// FakeHistory
// ---------------------------------------------------------------------------

/// Branch history held in memory, listed newest first like the real API
#[derive(Debug, Default)]
pub struct FakeHistory {
    commits: Mutex<Vec<CommitRef>>,
    head: Mutex<Option<CommitRef>>,
    /// Windows (by start instant) whose requests fail
    failing_windows: Mutex<HashSet<DateTime<Utc>>>,
    queries: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
}

impl FakeHistory {
    pub fn new(commits: impl IntoIterator<Item = CommitRef>) -> Self {
        let mut commits: Vec<CommitRef> = commits.into_iter().collect();
        commits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Self {
            head: Mutex::new(commits.first().cloned()),
            commits: Mutex::new(commits),
            ..Default::default()
        }
    }

    /// Makes the request for the window starting at `start` fail
    pub fn fail_window(&self, start: DateTime<Utc>) {
        self.failing_windows.lock().unwrap().insert(start);
    }

    pub fn set_head(&self, head: Option<CommitRef>) {
        *self.head.lock().unwrap() = head;
    }

    /// Windows queried so far, in order
    pub fn queries(&self) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistoryApi for FakeHistory {
    async fn commits_in_window(
        &self,
        _branch: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<CommitRef>, DiscoveryError> {
        self.queries.lock().unwrap().push((since, until));
        if self.failing_windows.lock().unwrap().contains(&since) {
            return Err(DiscoveryError::Status {
                url: "fake://commits".into(),
                status: 502,
            });
        }
        // GitHub's since/until are inclusive on both ends
        let commits = self.commits.lock().unwrap();
        Ok(commits
            .iter()
            .filter(|c| c.timestamp >= since && c.timestamp <= until)
            .cloned()
            .collect())
    }

    async fn branch_head(&self, _branch: &str) -> Result<CommitRef, DiscoveryError> {
        self.head.lock().unwrap().clone().ok_or_else(|| DiscoveryError::Status {
            url: "fake://head".into(),
            status: 404,
        })
    }

    async fn rate_limit(&self) -> Result<RateLimit, DiscoveryError> {
        Ok(RateLimit {
            remaining: 5000,
            limit: 5000,
            reset: None,
        })
    }
}

// ---------------------------------------------------------------------------
// FakeCheckout
// ---------------------------------------------------------------------------

/// Records which commits were checked out; chosen SHAs fail to fetch
#[derive(Debug)]
pub struct FakeCheckout {
    path: PathBuf,
    current: Arc<Mutex<Option<String>>>,
    failing: Mutex<HashSet<String>>,
    ensured: Mutex<Vec<String>>,
    /// Raised after the next successful checkout
    stop_after: Mutex<Option<(String, Arc<AtomicBool>)>>,
}

impl FakeCheckout {
    pub fn new() -> Self {
        Self {
            path: PathBuf::from("/fake/nixpkgs"),
            current: Arc::new(Mutex::new(None)),
            failing: Mutex::new(HashSet::new()),
            ensured: Mutex::new(Vec::new()),
            stop_after: Mutex::new(None),
        }
    }

    pub fn fail_commit(&self, sha: &str) {
        self.failing.lock().unwrap().insert(sha.to_string());
    }

    /// Sets `flag` once `sha` has been checked out, to simulate Ctrl-C
    /// arriving mid-commit
    pub fn stop_after(&self, sha: &str, flag: Arc<AtomicBool>) {
        *self.stop_after.lock().unwrap() = Some((sha.to_string(), flag));
    }

    /// SHA of the commit the working tree is at
    pub fn current(&self) -> Option<String> {
        self.current.lock().unwrap().clone()
    }

    /// Handle the evaluator reads to know which commit it evaluates
    pub fn current_handle(&self) -> Arc<Mutex<Option<String>>> {
        Arc::clone(&self.current)
    }

    /// Every `ensure` call, in order
    pub fn ensured(&self) -> Vec<String> {
        self.ensured.lock().unwrap().clone()
    }
}

impl Default for FakeCheckout {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Checkout for FakeCheckout {
    async fn ensure(&self, commit: &CommitRef) -> Result<(), CheckoutError> {
        self.ensured.lock().unwrap().push(commit.sha.clone());
        if self.failing.lock().unwrap().contains(&commit.sha) {
            return Err(CheckoutError::new(
                &commit.sha,
                CheckoutErrorKind::Fetch,
                "fatal: remote error: upload-pack: not our ref",
            ));
        }
        *self.current.lock().unwrap() = Some(commit.sha.clone());

        if let Some((sha, flag)) = self.stop_after.lock().unwrap().as_ref() {
            if *sha == commit.sha {
                flag.store(true, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

// ---------------------------------------------------------------------------
// FakeEvaluator
// ---------------------------------------------------------------------------

type EvalKey = (String, String, Option<String>);

/// Answers evaluations from a table keyed by (commit, attribute path, system).
///
/// Unknown keys fail as `AttributeMissing`, like a nix attribute that does
/// not exist at that commit.
#[derive(Debug)]
pub struct FakeEvaluator {
    current: Arc<Mutex<Option<String>>>,
    answers: Mutex<HashMap<EvalKey, Result<String, EvalError>>>,
    calls: Mutex<usize>,
}

impl FakeEvaluator {
    /// Evaluator that follows the commit `checkout` is positioned at
    pub fn new(checkout: &FakeCheckout) -> Self {
        Self {
            current: checkout.current_handle(),
            answers: Mutex::new(HashMap::new()),
            calls: Mutex::new(0),
        }
    }

    fn key(sha: &str, attr_path: &str, system: Option<&str>) -> EvalKey {
        (sha.to_string(), attr_path.to_string(), system.map(str::to_string))
    }

    /// `<attribute>.version` evaluates to `version` at `sha`
    pub fn version(&self, sha: &str, attribute: &str, version: &str) -> &Self {
        let path = format!("{}.version", attribute);
        self.answers
            .lock()
            .unwrap()
            .insert(Self::key(sha, &path, None), Ok(version.to_string()));
        self
    }

    /// `<attribute>` evaluates to `store_path` at `sha` on `system`
    pub fn store_path(&self, sha: &str, attribute: &str, system: &str, store_path: &str) -> &Self {
        self.answers
            .lock()
            .unwrap()
            .insert(Self::key(sha, attribute, Some(system)), Ok(store_path.to_string()));
        self
    }

    /// Evaluating `attr_path` at `sha` fails with `kind`
    pub fn fail(&self, sha: &str, attr_path: &str, system: Option<&str>, kind: EvalFailureKind) -> &Self {
        self.answers.lock().unwrap().insert(
            Self::key(sha, attr_path, system),
            Err(EvalError::new(kind, format!("{} failed", attr_path))),
        );
        self
    }

    /// Number of evaluations requested so far
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Evaluator for FakeEvaluator {
    async fn eval_raw(
        &self,
        _dir: &Path,
        attr_path: &str,
        system: Option<&Platform>,
    ) -> Result<String, EvalError> {
        *self.calls.lock().unwrap() += 1;
        let sha = self.current.lock().unwrap().clone().unwrap_or_default();
        let key = Self::key(&sha, attr_path, system.map(Platform::as_str));
        self.answers
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| {
                Err(EvalError::new(
                    EvalFailureKind::AttributeMissing,
                    format!("attribute '{}' not found", attr_path),
                ))
            })
    }
}
