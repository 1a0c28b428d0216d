// SPDX-License-Identifier: MIT
//! Bitbucket Cloud provider client (REST 2.0, Bearer auth).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::ProviderError;
use crate::provider::{
    classify_status, http_client, ChangeRequest, ChangeTarget, ChangedFile, CommentOutcome,
    CommitState, FileStatus, Provider, ProviderClient, RepoRef,
};

const DEFAULT_API_BASE: &str = "https://api.bitbucket.org/2.0";
/// Build-status key shown on the commit.
const STATUS_KEY: &str = "reviewd-quality-gate";

pub struct BitbucketClient {
    http: reqwest::Client,
    token: String,
    base: String,
}

#[derive(Debug, Deserialize)]
struct PullRequestResponse {
    id: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    state: String,
    links: Option<Links>,
    source: Option<SourceRef>,
}

#[derive(Debug, Deserialize)]
struct Links {
    html: Option<Href>,
}

#[derive(Debug, Deserialize)]
struct Href {
    href: String,
}

#[derive(Debug, Deserialize)]
struct SourceRef {
    commit: Option<CommitRef>,
}

#[derive(Debug, Deserialize)]
struct CommitRef {
    hash: String,
}

#[derive(Debug, Deserialize)]
struct DiffStatPage {
    #[serde(default)]
    values: Vec<DiffStatEntry>,
}

#[derive(Debug, Deserialize)]
struct DiffStatEntry {
    #[serde(default)]
    status: String,
    new: Option<PathRef>,
    old: Option<PathRef>,
    #[serde(default)]
    lines_added: u32,
    #[serde(default)]
    lines_removed: u32,
}

#[derive(Debug, Deserialize)]
struct PathRef {
    path: String,
}

#[derive(Debug, Deserialize)]
struct CommentResponse {
    id: u64,
}

impl BitbucketClient {
    pub fn new(token: String, api_base: Option<String>) -> Self {
        Self {
            http: http_client(),
            token,
            base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        }
    }

    fn repo_url(&self, repo: &RepoRef) -> String {
        format!("{}/repositories/{}/{}", self.base, repo.owner, repo.name)
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.http.request(method, url).bearer_auth(&self.token)
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

    fn map_entry(entry: DiffStatEntry) -> ChangedFile {
        let status = match entry.status.as_str() {
            "added" => FileStatus::Added,
            "removed" => FileStatus::Removed,
            "renamed" => FileStatus::Renamed,
            _ => FileStatus::Modified,
        };
        ChangedFile {
            path: entry
                .new
                .map(|p| p.path)
                .or(entry.old.map(|p| p.path))
                .unwrap_or_default(),
            status,
            additions: entry.lines_added,
            deletions: entry.lines_removed,
            patch: None,
        }
    }
}

#[async_trait]
impl ProviderClient for BitbucketClient {
    fn provider(&self) -> Provider {
        Provider::Bitbucket
    }

    async fn get_change_request(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> Result<ChangeRequest, ProviderError> {
        let url = format!("{}/pullrequests/{number}", self.repo_url(repo));
        let resp = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(ProviderError::from_transport)?;
        let pr: PullRequestResponse = Self::check(resp)
            .await?
            .json()
            .await
            .map_err(ProviderError::from_transport)?;
        Ok(ChangeRequest {
            id: pr.id.to_string(),
            number: pr.id,
            title: pr.title,
            state: pr.state,
            url: pr
                .links
                .and_then(|l| l.html)
                .map(|h| h.href)
                .unwrap_or_default(),
            head_sha: pr
                .source
                .and_then(|s| s.commit)
                .map(|c| c.hash)
                .unwrap_or_default(),
        })
    }

    async fn list_changed_files(
        &self,
        repo: &RepoRef,
        target: &ChangeTarget,
    ) -> Result<Vec<ChangedFile>, ProviderError> {
        let url = match target {
            ChangeTarget::Number(number) => format!(
                "{}/pullrequests/{number}/diffstat?pagelen=100",
                self.repo_url(repo)
            ),
            ChangeTarget::Range { base, head } => format!(
                "{}/diffstat/{head}..{base}?pagelen=100",
                self.repo_url(repo)
            ),
        };
        let resp = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(ProviderError::from_transport)?;
        let page: DiffStatPage = Self::check(resp)
            .await?
            .json()
            .await
            .map_err(ProviderError::from_transport)?;
        Ok(page.values.into_iter().map(Self::map_entry).collect())
    }

    async fn get_file_content(
        &self,
        repo: &RepoRef,
        path: &str,
        revision: &str,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/src/{revision}/{path}", self.repo_url(repo));
        let resp = self
            .request(reqwest::Method::GET, url)
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
        let url = format!("{}/pullrequests/{number}/comments", self.repo_url(repo));
        let resp = self
            .request(reqwest::Method::POST, url)
            .json(&json!({ "content": { "raw": body } }))
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
        _revision: &str,
        path: &str,
        line: u32,
        body: &str,
    ) -> Result<CommentOutcome, ProviderError> {
        let url = format!("{}/pullrequests/{number}/comments", self.repo_url(repo));
        let resp = self
            .request(reqwest::Method::POST, url)
            .json(&json!({
                "content": { "raw": body },
                "inline": { "to": line, "path": path },
            }))
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        // Bitbucket rejects inline anchors outside the PR diff with 400.
        if resp.status().as_u16() == 400 {
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
            "{}/commit/{revision}/statuses/build",
            self.repo_url(repo)
        );
        // Bitbucket's build-state vocabulary.
        let state_str = match state {
            CommitState::Success => "SUCCESSFUL",
            CommitState::Failure => "FAILED",
            CommitState::Pending => "INPROGRESS",
        };
        let resp = self
            .request(reqwest::Method::POST, url)
            .json(&json!({
                "key": STATUS_KEY,
                "state": state_str,
                "description": description,
                "url": "https://github.com/reviewd-io/reviewd",
            }))
            .send()
            .await
            .map_err(ProviderError::from_transport)?;
        Self::check(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diffstat_status_mapping() {
        let entry = DiffStatEntry {
            status: "added".into(),
            new: Some(PathRef { path: "a.py".into() }),
            old: None,
            lines_added: 3,
            lines_removed: 0,
        };
        let mapped = BitbucketClient::map_entry(entry);
        assert_eq!(mapped.status, FileStatus::Added);
        assert_eq!(mapped.path, "a.py");
        assert_eq!(mapped.additions, 3);
    }

    #[test]
    fn removed_entries_keep_the_old_path() {
        let entry = DiffStatEntry {
            status: "removed".into(),
            new: None,
            old: Some(PathRef { path: "gone.py".into() }),
            lines_added: 0,
            lines_removed: 12,
        };
        let mapped = BitbucketClient::map_entry(entry);
        assert_eq!(mapped.status, FileStatus::Removed);
        assert_eq!(mapped.path, "gone.py");
    }
}
