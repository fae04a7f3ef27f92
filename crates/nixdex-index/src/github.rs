//! Remote commit history
//!
//! [`HistoryApi`] is the seam between commit discovery and the GitHub REST
//! API. [`GitHubClient`] is the production implementation; tests use the
//! in-memory fake from [`crate::fakes`].

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use nixdex_core::{CommitRef, GithubOptions};
use reqwest::header::{HeaderMap, ACCEPT, LINK};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

const USER_AGENT: &str = concat!("nixpkgs-index/", env!("CARGO_PKG_VERSION"));
const PER_PAGE: &str = "100";

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("rate limited by {url}")]
    RateLimited {
        url: String,
        retry_after: Option<Duration>,
    },

    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl DiscoveryError {
    /// Transport errors, 5xx and rate limiting are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            DiscoveryError::Transport { .. } | DiscoveryError::RateLimited { .. } => true,
            DiscoveryError::Status { status, .. } => *status >= 500,
            DiscoveryError::Decode { .. } | DiscoveryError::Client(_) => false,
        }
    }

    fn retry_hint(&self) -> Option<Duration> {
        match self {
            DiscoveryError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Remaining request quota
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimit {
    pub remaining: u64,
    pub limit: u64,
    pub reset: Option<DateTime<Utc>>,
}

/// Read-only view of a branch's commit history
#[async_trait]
pub trait HistoryApi: Send + Sync {
    /// Commits on `branch` committed between `since` and `until`, in the
    /// API's order (newest first). Implementations may return only the last
    /// page of a long listing; it always holds the oldest commits.
    async fn commits_in_window(
        &self,
        branch: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<CommitRef>, DiscoveryError>;

    /// Current head commit of `branch`
    async fn branch_head(&self, branch: &str) -> Result<CommitRef, DiscoveryError>;

    async fn rate_limit(&self) -> Result<RateLimit, DiscoveryError>;
}

/// Exponential backoff for history requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after `attempt` (1-based) failed.
    ///
    /// A server-provided hint wins over the exponential schedule; both are
    /// capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let delay = hint.unwrap_or_else(|| {
            let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
            self.base_delay.saturating_mul(factor)
        });
        delay.min(self.max_delay)
    }
}

/// Picks the window's representative: the oldest commit inside
/// `[start, end)`. Ties go to the commit listed later by the API.
pub fn select_oldest(
    commits: &[CommitRef],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Option<CommitRef> {
    commits
        .iter()
        .filter(|c| c.timestamp >= start && c.timestamp < end)
        .fold(None::<&CommitRef>, |best, c| match best {
            Some(b) if b.timestamp < c.timestamp => Some(b),
            _ => Some(c),
        })
        .cloned()
}

/// Extracts the page number of the `rel="last"` entry of a `Link` header
pub fn parse_link_last(header: &str) -> Option<u32> {
    header.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        if !params.split(';').any(|p| p.trim() == r#"rel="last""#) {
            return None;
        }
        let url = target.trim().strip_prefix('<')?.strip_suffix('>')?;
        let query = url.split_once('?')?.1;
        query
            .split('&')
            .find_map(|kv| kv.strip_prefix("page="))
            .and_then(|n| n.parse().ok())
    })
}

fn is_rate_limited(status: StatusCode, headers: &HeaderMap) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    status == StatusCode::FORBIDDEN
        && (header_str(headers, "x-ratelimit-remaining") == Some("0")
            || headers.contains_key("retry-after"))
}

/// How long the server asked us to wait, from `retry-after` or
/// `x-ratelimit-reset`
fn rate_limit_hint(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    if let Some(secs) = header_str(headers, "retry-after").and_then(|v| v.parse::<u64>().ok()) {
        return Some(Duration::from_secs(secs));
    }
    let reset = header_str(headers, "x-ratelimit-reset")?.parse::<i64>().ok()?;
    let wait = reset - now.timestamp();
    Some(Duration::from_secs(wait.max(0) as u64))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn api_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ── GitHub REST payloads ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiCommit {
    sha: String,
    commit: ApiCommitDetail,
}

#[derive(Debug, Deserialize)]
struct ApiCommitDetail {
    committer: ApiSignature,
}

#[derive(Debug, Deserialize)]
struct ApiSignature {
    date: DateTime<Utc>,
}

impl From<ApiCommit> for CommitRef {
    fn from(c: ApiCommit) -> Self {
        CommitRef::new(c.sha, c.commit.committer.date)
    }
}

#[derive(Debug, Deserialize)]
struct ApiRateLimit {
    resources: ApiRateResources,
}

#[derive(Debug, Deserialize)]
struct ApiRateResources {
    core: ApiRateCore,
}

#[derive(Debug, Deserialize)]
struct ApiRateCore {
    limit: u64,
    remaining: u64,
    reset: i64,
}

// ── client ───────────────────────────────────────────────────────────────────

/// GitHub REST client for commit discovery
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    repository: String,
    token: Option<String>,
    retry: RetryPolicy,
}

impl GitHubClient {
    pub fn new(options: &GithubOptions, token: Option<String>) -> Result<Self, DiscoveryError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(DiscoveryError::Client)?;

        if token.is_none() {
            log::info!("No GitHub token given, requests use the anonymous quota");
        }

        Ok(Self {
            http,
            api_url: options.api_url.trim_end_matches('/').to_string(),
            repository: options.repository.clone(),
            token,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn get_once(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, DiscoveryError> {
        let mut request = self
            .http
            .get(url)
            .query(query)
            .header(ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|source| DiscoveryError::Transport {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if is_rate_limited(status, response.headers()) {
            return Err(DiscoveryError::RateLimited {
                url: url.to_string(),
                retry_after: rate_limit_hint(response.headers(), Utc::now()),
            });
        }
        Err(DiscoveryError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }

    async fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, DiscoveryError> {
        let mut attempt = 1;
        loop {
            match self.get_once(url, query).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt, e.retry_hint());
                    log::warn!(
                        "GitHub request failed (attempt {}/{}): {}, retrying in {:.1}s",
                        attempt,
                        self.retry.max_attempts,
                        e,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn decode<T: DeserializeOwned>(
        url: &str,
        response: reqwest::Response,
    ) -> Result<T, DiscoveryError> {
        response.json::<T>().await.map_err(|e| DiscoveryError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl HistoryApi for GitHubClient {
    async fn commits_in_window(
        &self,
        branch: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<CommitRef>, DiscoveryError> {
        let url = format!("{}/repos/{}/commits", self.api_url, self.repository);
        let mut query = vec![
            ("sha", branch.to_string()),
            ("since", api_time(since)),
            ("until", api_time(until)),
            ("per_page", PER_PAGE.to_string()),
        ];

        let response = self.get(&url, &query).await?;
        let last_page = header_str(response.headers(), LINK.as_str()).and_then(parse_link_last);
        let mut commits: Vec<ApiCommit> = Self::decode(&url, response).await?;

        // The oldest commits are on the last page
        if let Some(page) = last_page.filter(|&p| p > 1) {
            log::debug!("Window has {} pages, reading the last one", page);
            query.push(("page", page.to_string()));
            let response = self.get(&url, &query).await?;
            commits = Self::decode(&url, response).await?;
        }

        Ok(commits.into_iter().map(CommitRef::from).collect())
    }

    async fn branch_head(&self, branch: &str) -> Result<CommitRef, DiscoveryError> {
        let url = format!("{}/repos/{}/commits/{}", self.api_url, self.repository, branch);
        log::debug!("Fetching HEAD of branch: {}", branch);
        let response = self.get(&url, &[]).await?;
        let commit: ApiCommit = Self::decode(&url, response).await?;
        Ok(commit.into())
    }

    async fn rate_limit(&self) -> Result<RateLimit, DiscoveryError> {
        let url = format!("{}/rate_limit", self.api_url);
        let response = self.get_once(&url, &[]).await?;
        let data: ApiRateLimit = Self::decode(&url, response).await?;
        let core = data.resources.core;
        Ok(RateLimit {
            remaining: core.remaining,
            limit: core.limit,
            reset: DateTime::<Utc>::from_timestamp(core.reset, 0),
        })
    }
}
