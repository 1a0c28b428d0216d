// SPDX-License-Identifier: MIT
//! GitHub provider client (REST v3).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::ProviderError;
use crate::provider::{
    classify_status, http_client, ChangeRequest, ChangeTarget, ChangedFile, CommentOutcome,
    CommitState, FileStatus, Provider, ProviderClient, RepoRef,
};

const DEFAULT_API_BASE: &str = "https://api.github.com";
/// Commit-status context shown next to the check in the PR UI.
const STATUS_CONTEXT: &str = "reviewd/quality-gate";

pub struct GithubClient {
    http: reqwest::Client,
    token: String,
    base: String,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    id: u64,
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    html_url: String,
    head: HeadRef,
}

#[derive(Debug, Deserialize)]
struct HeadRef {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    filename: String,
    status: String,
    #[serde(default)]
    additions: u32,
    #[serde(default)]
    deletions: u32,
    patch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompareResponse {
    #[serde(default)]
    files: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
struct CommentResponse {
    id: u64,
}

impl GithubClient {
    pub fn new(token: String, api_base: Option<String>) -> Self {
        Self {
            http: http_client(),
            token,
            base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        }
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let code = status.as_u16();
        let message = resp.text().await.unwrap_or_default();
        Err(classify_status(code, message))
    }

    fn map_status(status: &str) -> FileStatus {
        match status {
            "added" => FileStatus::Added,
            "removed" => FileStatus::Removed,
            "renamed" => FileStatus::Renamed,
            _ => FileStatus::Modified,
        }
    }

    fn map_files(entries: Vec<FileEntry>) -> Vec<ChangedFile> {
        entries
            .into_iter()
            .map(|f| ChangedFile {
                path: f.filename,
                status: Self::map_status(&f.status),
                additions: f.additions,
                deletions: f.deletions,
                patch: f.patch,
            })
            .collect()
    }
}

#[async_trait]
impl ProviderClient for GithubClient {
    fn provider(&self) -> Provider {
        Provider::GitHub
    }

    async fn get_change_request(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> Result<ChangeRequest, ProviderError> {
        let url = format!(
            "{}/repos/{}/{}/pulls/{number}",
            self.base, repo.owner, repo.name
        );
        let resp = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(ProviderError::from_transport)?;
        let pr: PullResponse = Self::check(resp)
            .await?
            .json()
            .await
            .map_err(ProviderError::from_transport)?;
        Ok(ChangeRequest {
            id: pr.id.to_string(),
            number: pr.number,
            title: pr.title,
            state: pr.state,
            url: pr.html_url,
            head_sha: pr.head.sha,
        })
    }

    async fn list_changed_files(
        &self,
        repo: &RepoRef,
        target: &ChangeTarget,
    ) -> Result<Vec<ChangedFile>, ProviderError> {
        let entries = match target {
            ChangeTarget::Number(number) => {
                let url = format!(
                    "{}/repos/{}/{}/pulls/{number}/files?per_page=100",
                    self.base, repo.owner, repo.name
                );
                let resp = self
                    .request(reqwest::Method::GET, url)
                    .send()
                    .await
                    .map_err(ProviderError::from_transport)?;
                Self::check(resp)
                    .await?
                    .json::<Vec<FileEntry>>()
                    .await
                    .map_err(ProviderError::from_transport)?
            }
            ChangeTarget::Range { base, head } => {
                let url = format!(
                    "{}/repos/{}/{}/compare/{base}...{head}",
                    self.base, repo.owner, repo.name
                );
                let resp = self
                    .request(reqwest::Method::GET, url)
                    .send()
                    .await
                    .map_err(ProviderError::from_transport)?;
                Self::check(resp)
                    .await?
                    .json::<CompareResponse>()
                    .await
                    .map_err(ProviderError::from_transport)?
                    .files
            }
        };
        Ok(Self::map_files(entries))
    }

    async fn get_file_content(
        &self,
        repo: &RepoRef,
        path: &str,
        revision: &str,
    ) -> Result<String, ProviderError> {
        let url = format!(
            "{}/repos/{}/{}/contents/{path}?ref={revision}",
            self.base, repo.owner, repo.name
        );
        let resp = self
            .request(reqwest::Method::GET, url)
            .header("Accept", "application/vnd.github.raw+json")
            .send()
            .await
            .map_err(ProviderError::from_transport)?;
        Self::check(resp)
            .await?
            .text()
            .await
            .map_err(ProviderError::from_transport)
    }

    async fn post_summary_comment(
        &self,
        repo: &RepoRef,
        number: u64,
        body: &str,
    ) -> Result<String, ProviderError> {
        let url = format!(
            "{}/repos/{}/{}/issues/{number}/comments",
            self.base, repo.owner, repo.name
        );
        let resp = self
            .request(reqwest::Method::POST, url)
            .json(&json!({ "body": body }))
            .send()
            .await
            .map_err(ProviderError::from_transport)?;
        let comment: CommentResponse = Self::check(resp)
            .await?
            .json()
            .await
            .map_err(ProviderError::from_transport)?;
        Ok(comment.id.to_string())
    }

    async fn post_inline_comment(
        &self,
        repo: &RepoRef,
        number: u64,
        revision: &str,
        path: &str,
        line: u32,
        body: &str,
    ) -> Result<CommentOutcome, ProviderError> {
        let url = format!(
            "{}/repos/{}/{}/pulls/{number}/comments",
            self.base, repo.owner, repo.name
        );
        let resp = self
            .request(reqwest::Method::POST, url)
            .json(&json!({
                "body": body,
                "commit_id": revision,
                "path": path,
                "line": line,
                "side": "RIGHT",
            }))
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        // 422 means the line could not be resolved to the diff — expected for
        // findings on unchanged lines; the caller skips them.
        if resp.status().as_u16() == 422 {
            let message = resp.text().await.unwrap_or_default();
            debug!(path, line, message, "inline comment outside diff, skipping");
            return Ok(CommentOutcome::SkippedLineNotInDiff);
        }
        let comment: CommentResponse = Self::check(resp)
            .await?
            .json()
            .await
            .map_err(ProviderError::from_transport)?;
        Ok(CommentOutcome::Posted(comment.id.to_string()))
    }

    async fn set_commit_status(
        &self,
        repo: &RepoRef,
        revision: &str,
        state: CommitState,
        description: &str,
    ) -> Result<(), ProviderError> {
        let url = format!(
            "{}/repos/{}/{}/statuses/{revision}",
            self.base, repo.owner, repo.name
        );
        let state_str = match state {
            CommitState::Success => "success",
            CommitState::Failure => "failure",
            CommitState::Pending => "pending",
        };
        let resp = self
            .request(reqwest::Method::POST, url)
            .json(&json!({
                "state": state_str,
                "description": description,
                "context": STATUS_CONTEXT,
            }))
            .send()
            .await
            .map_err(ProviderError::from_transport)?;
        Self::check(resp).await?;
        Ok(())
    }
}
