// SPDX-License-Identifier: MIT
//! Source-control provider clients.
//!
//! GitHub, GitLab, and Bitbucket share one behavioral contract — fetch the
//! diff and file contents, post comments, set a commit status — and differ
//! only in transport and payload shape. One trait, one implementation per
//! provider, selected by the job's provider field.

pub mod bitbucket;
pub mod github;
pub mod gitlab;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ProviderError;

/// Default timeout for a single provider API request. Keeps a stuck call
/// from pinning a worker slot; the scheduler's retry handles the fallout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ─── Shared types ─────────────────────────────────────────────────────────────

/// Supported hosting providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    GitHub,
    GitLab,
    Bitbucket,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::GitHub => "github",
            Provider::GitLab => "gitlab",
            Provider::Bitbucket => "bitbucket",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "github" => Some(Provider::GitHub),
            "gitlab" => Some(Provider::GitLab),
            "bitbucket" => Some(Provider::Bitbucket),
            _ => None,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Repository coordinates. `owner` is the GitHub org/user, GitLab namespace,
/// or Bitbucket workspace; `name` is the repo/project slug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// What to diff: a change request by number, or a branch-compare range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChangeTarget {
    /// Pull/merge request number (GitLab: MR iid).
    Number(u64),
    /// Branch-compare between two revisions.
    Range { base: String, head: String },
}

/// Status of one file within a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Modified,
    Removed,
    Renamed,
}

/// One entry of a change-request diff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangedFile {
    pub path: String,
    pub status: FileStatus,
    pub additions: u32,
    pub deletions: u32,
    /// Unified diff hunk for this file, when the provider returns one.
    pub patch: Option<String>,
}

/// Metadata for a change request (PR/MR), used by the CI trigger and for
/// review upserts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRequest {
    /// Provider-global id (the review dedupe key component).
    pub id: String,
    pub number: u64,
    pub title: String,
    pub state: String,
    pub url: String,
    pub head_sha: String,
}

/// Commit status vocabulary. Each client maps this onto its provider's own
/// wording (GitLab says `failed`, Bitbucket says `FAILED`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    Success,
    Failure,
    Pending,
}

/// Outcome of one inline-comment attempt. Commenting outside the diff is an
/// expected, non-fatal outcome — callers skip, never alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentOutcome {
    /// Posted; provider-side comment id.
    Posted(String),
    /// The target line is not part of the diff being reviewed.
    SkippedLineNotInDiff,
}

// ─── Contract ─────────────────────────────────────────────────────────────────

/// Uniform contract over the three hosting providers.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn provider(&self) -> Provider;

    /// Fetch change-request metadata (title, state, URL, head SHA).
    async fn get_change_request(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> Result<ChangeRequest, ProviderError>;

    /// List the files changed by a change request or compare range.
    async fn list_changed_files(
        &self,
        repo: &RepoRef,
        target: &ChangeTarget,
    ) -> Result<Vec<ChangedFile>, ProviderError>;

    /// Fetch one file's content at a revision. `NotFound` when the path does
    /// not exist at that revision.
    async fn get_file_content(
        &self,
        repo: &RepoRef,
        path: &str,
        revision: &str,
    ) -> Result<String, ProviderError>;

    /// Post the single per-run summary comment. Returns the comment id.
    async fn post_summary_comment(
        &self,
        repo: &RepoRef,
        number: u64,
        body: &str,
    ) -> Result<String, ProviderError>;

    /// Post an inline comment anchored to a line of the diff.
    async fn post_inline_comment(
        &self,
        repo: &RepoRef,
        number: u64,
        revision: &str,
        path: &str,
        line: u32,
        body: &str,
    ) -> Result<CommentOutcome, ProviderError>;

    /// Set the commit/build status for a revision.
    async fn set_commit_status(
        &self,
        repo: &RepoRef,
        revision: &str,
        state: CommitState,
        description: &str,
    ) -> Result<(), ProviderError>;
}

/// Build the client for a provider from an installation token.
pub fn build_client(
    provider: Provider,
    token: String,
    api_base: Option<String>,
) -> Box<dyn ProviderClient> {
    match provider {
        Provider::GitHub => Box::new(github::GithubClient::new(token, api_base)),
        Provider::GitLab => Box::new(gitlab::GitlabClient::new(token, api_base)),
        Provider::Bitbucket => Box::new(bitbucket::BitbucketClient::new(token, api_base)),
    }
}

/// Shared reqwest client with the standard request timeout.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("reviewd/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
}

/// Map an error response to the provider error taxonomy. 429 and 5xx are
/// transient (retryable); 401/403 are auth; 404 is not-found.
pub(crate) fn classify_status(status: u16, message: String) -> ProviderError {
    match status {
        404 => ProviderError::NotFound(message),
        401 | 403 => ProviderError::Auth(message),
        429 => ProviderError::Transient(message),
        s if s >= 500 => ProviderError::Transient(message),
        s => ProviderError::Api { status: s, message },
    }
}

/// Count additions/deletions out of a unified diff hunk.
pub(crate) fn diff_line_counts(patch: &str) -> (u32, u32) {
    let mut additions = 0;
    let mut deletions = 0;
    for line in patch.lines() {
        if line.starts_with('+') && !line.starts_with("+++") {
            additions += 1;
        } else if line.starts_with('-') && !line.starts_with("---") {
            deletions += 1;
        }
    }
    (additions, deletions)
}
