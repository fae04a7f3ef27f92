//! Sparse Nixpkgs checkout positioned at one commit at a time
//!
//! Only `pkgs/` and `lib/` are checked out. Commits are fetched one by one
//! with `--depth 1`, keyed by exact SHA, which works regardless of how deep
//! in history the commit is.

use crate::process::{run_with_timeout, ProcessError};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use git2::{Oid, Repository};
use nixdex_core::CommitRef;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Timeout for local git operations (sparse-checkout setup, checkout)
const LOCAL_GIT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutErrorKind {
    /// `git fetch` failed (network, or SHA not reachable from the remote)
    Fetch,
    /// `git checkout` failed
    Checkout,
    Timeout,
    Spawn,
    /// The local repository could not be inspected
    Repository,
}

impl fmt::Display for CheckoutErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CheckoutErrorKind::Fetch => "fetch failed",
            CheckoutErrorKind::Checkout => "checkout failed",
            CheckoutErrorKind::Timeout => "timed out",
            CheckoutErrorKind::Spawn => "git could not be started",
            CheckoutErrorKind::Repository => "repository error",
        };
        f.write_str(s)
    }
}

/// Positioning the working tree at a commit failed
#[derive(Debug, Clone, thiserror::Error)]
#[error("checkout of {commit} {kind}: {message}")]
pub struct CheckoutError {
    pub commit: String,
    pub kind: CheckoutErrorKind,
    pub message: String,
}

impl CheckoutError {
    pub fn new(commit: &str, kind: CheckoutErrorKind, message: impl Into<String>) -> Self {
        Self {
            commit: commit.to_string(),
            kind,
            message: message.into(),
        }
    }

    fn from_process(commit: &str, err: ProcessError) -> Self {
        let kind = match err {
            ProcessError::Timeout { .. } => CheckoutErrorKind::Timeout,
            ProcessError::Spawn { .. } => CheckoutErrorKind::Spawn,
        };
        Self::new(commit, kind, err.to_string())
    }
}

/// A working tree that can be moved to any commit
#[async_trait]
pub trait Checkout: Send + Sync {
    /// Makes `commit` the current working tree state. Idempotent.
    async fn ensure(&self, commit: &CommitRef) -> Result<(), CheckoutError>;

    /// Root of the working tree, where the evaluator runs
    fn path(&self) -> &Path;
}

/// Sparse checkout driven by git2 and the `git` binary
pub struct GitCheckout {
    path: PathBuf,
    fetch_timeout: Duration,
}

impl GitCheckout {
    /// Opens the checkout at `path`, creating and configuring it first if
    /// needed. Any failure here is fatal for the run.
    pub async fn init<P: AsRef<Path>>(path: P, remote: &str, fetch_timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if path.join(".git").exists() {
            let repo = Repository::open(&path)
                .with_context(|| format!("Failed to open repository at {:?}", path))?;
            if repo.find_remote("origin").is_err() {
                repo.remote("origin", remote)
                    .context("Failed to add origin remote")?;
            }
            log::debug!("Repository already exists at {:?}", path);
        } else {
            log::info!("Initializing nixpkgs repository at {:?}", path);
            std::fs::create_dir_all(&path)
                .with_context(|| format!("Failed to create {:?}", path))?;
            let repo = Repository::init(&path)
                .with_context(|| format!("Failed to initialize repository at {:?}", path))?;
            repo.remote("origin", remote)
                .context("Failed to add origin remote")?;

            log::debug!("Configuring sparse-checkout for pkgs and lib directories");
            git(&path, &["sparse-checkout", "init", "--cone"]).await?;
            git(&path, &["sparse-checkout", "set", "pkgs", "lib"]).await?;
            log::info!("Repository initialized successfully");
        }

        Ok(Self { path, fetch_timeout })
    }

    /// (HEAD is at `sha`, object for `sha` is present locally)
    fn inspect(&self, sha: &str) -> Result<(bool, bool), git2::Error> {
        let repo = Repository::open(&self.path)?;
        let oid = Oid::from_str(sha)?;
        let at_head = repo.head().ok().and_then(|h| h.target()) == Some(oid);
        let present = repo.find_commit(oid).is_ok();
        Ok((at_head, present))
    }
}

/// Runs a setup git command, failing on non-zero exit
async fn git(dir: &Path, args: &[&str]) -> Result<()> {
    let out = run_with_timeout("git", args, dir, LOCAL_GIT_TIMEOUT)
        .await
        .with_context(|| format!("git {}", args.join(" ")))?;
    if !out.success() {
        bail!("git {} failed: {}", args.join(" "), out.stderr.trim());
    }
    Ok(())
}

#[async_trait]
impl Checkout for GitCheckout {
    async fn ensure(&self, commit: &CommitRef) -> Result<(), CheckoutError> {
        let sha = commit.sha.as_str();
        let (at_head, present) = self
            .inspect(sha)
            .map_err(|e| CheckoutError::new(sha, CheckoutErrorKind::Repository, e.message()))?;

        if at_head {
            log::debug!("Checkout already at {}", commit.short());
            return Ok(());
        }

        if !present {
            log::info!("Fetching commit: {}", commit.short());
            let out = run_with_timeout(
                "git",
                &["fetch", "--depth", "1", "origin", sha],
                &self.path,
                self.fetch_timeout,
            )
            .await
            .map_err(|e| CheckoutError::from_process(sha, e))?;
            if !out.success() {
                return Err(CheckoutError::new(sha, CheckoutErrorKind::Fetch, out.stderr.trim()));
            }
        }

        log::debug!("Checking out {}", commit.short());
        let out = run_with_timeout(
            "git",
            &["checkout", "--force", "--detach", sha],
            &self.path,
            LOCAL_GIT_TIMEOUT,
        )
        .await
        .map_err(|e| CheckoutError::from_process(sha, e))?;
        if !out.success() {
            return Err(CheckoutError::new(sha, CheckoutErrorKind::Checkout, out.stderr.trim()));
        }
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
