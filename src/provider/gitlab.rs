// SPDX-License-Identifier: MIT
//! GitLab provider client (REST API v4, PRIVATE-TOKEN auth).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::ProviderError;
use crate::provider::{
    classify_status, diff_line_counts, http_client, ChangeRequest, ChangeTarget, ChangedFile,
    CommentOutcome, CommitState, FileStatus, Provider, ProviderClient, RepoRef,
};

const DEFAULT_API_BASE: &str = "https://gitlab.com/api/v4";
const STATUS_CONTEXT: &str = "reviewd/quality-gate";

pub struct GitlabClient {
    http: reqwest::Client,
    token: String,
    base: String,
}

#[derive(Debug, Deserialize)]
struct MergeRequestResponse {
    id: u64,
    iid: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    web_url: String,
    sha: Option<String>,
    diff_refs: Option<DiffRefs>,
}

#[derive(Debug, Deserialize)]
struct DiffRefs {
    head_sha: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChangeEntry {
    new_path: Option<String>,
    old_path: Option<String>,
    #[serde(default)]
    new_file: bool,
    #[serde(default)]
    deleted_file: bool,
    #[serde(default)]
    renamed_file: bool,
    #[serde(default)]
    diff: String,
}

#[derive(Debug, Deserialize)]
struct ChangesResponse {
    #[serde(default)]
    changes: Vec<ChangeEntry>,
}

#[derive(Debug, Deserialize)]
struct CompareResponse {
    #[serde(default)]
    diffs: Vec<ChangeEntry>,
}

#[derive(Debug, Deserialize)]
struct NoteResponse {
    id: u64,
}

impl GitlabClient {
    pub fn new(token: String, api_base: Option<String>) -> Self {
        Self {
            http: http_client(),
            token,
            base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        }
    }

    fn project_path(repo: &RepoRef) -> String {
        encode_segment(&repo.full_name())
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("PRIVATE-TOKEN", &self.token)
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

    fn map_entry(entry: ChangeEntry) -> ChangedFile {
        let status = if entry.new_file {
            FileStatus::Added
        } else if entry.deleted_file {
            FileStatus::Removed
        } else if entry.renamed_file {
            FileStatus::Renamed
        } else {
            FileStatus::Modified
        };
        let (additions, deletions) = diff_line_counts(&entry.diff);
        ChangedFile {
            path: entry
                .new_path
                .or(entry.old_path)
                .unwrap_or_default(),
            status,
            additions,
            deletions,
            patch: if entry.diff.is_empty() {
                None
            } else {
                Some(entry.diff)
            },
        }
    }
}

#[async_trait]
impl ProviderClient for GitlabClient {
    fn provider(&self) -> Provider {
        Provider::GitLab
    }

    async fn get_change_request(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> Result<ChangeRequest, ProviderError> {
        let url = format!(
            "{}/projects/{}/merge_requests/{number}",
            self.base,
            Self::project_path(repo)
        );
        let resp = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(ProviderError::from_transport)?;
        let mr: MergeRequestResponse = Self::check(resp)
            .await?
            .json()
            .await
            .map_err(ProviderError::from_transport)?;
        let head_sha = mr
            .sha
            .or(mr.diff_refs.and_then(|d| d.head_sha))
            .unwrap_or_default();
        Ok(ChangeRequest {
            id: mr.id.to_string(),
            number: mr.iid,
            title: mr.title,
            state: mr.state,
            url: mr.web_url,
            head_sha,
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
                    "{}/projects/{}/merge_requests/{number}/changes",
                    self.base,
                    Self::project_path(repo)
                );
                let resp = self
                    .request(reqwest::Method::GET, url)
                    .send()
                    .await
                    .map_err(ProviderError::from_transport)?;
                Self::check(resp)
                    .await?
                    .json::<ChangesResponse>()
                    .await
                    .map_err(ProviderError::from_transport)?
                    .changes
            }
            ChangeTarget::Range { base, head } => {
                let url = format!(
                    "{}/projects/{}/repository/compare?from={base}&to={head}",
                    self.base,
                    Self::project_path(repo)
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
                    .diffs
            }
        };
        Ok(entries.into_iter().map(Self::map_entry).collect())
    }

    async fn get_file_content(
        &self,
        repo: &RepoRef,
        path: &str,
        revision: &str,
    ) -> Result<String, ProviderError> {
        let url = format!(
            "{}/projects/{}/repository/files/{}/raw?ref={}",
            self.base,
            Self::project_path(repo),
            encode_segment(path),
            encode_segment(revision)
        );
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
        let url = format!(
            "{}/projects/{}/merge_requests/{number}/notes",
            self.base,
            Self::project_path(repo)
        );
        let resp = self
            .request(reqwest::Method::POST, url)
            .json(&json!({ "body": body }))
            .send()
            .await
            .map_err(ProviderError::from_transport)?;
        let note: NoteResponse = Self::check(resp)
            .await?
            .json()
            .await
            .map_err(ProviderError::from_transport)?;
        Ok(note.id.to_string())
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
            "{}/projects/{}/merge_requests/{number}/discussions",
            self.base,
            Self::project_path(repo)
        );
        let resp = self
            .request(reqwest::Method::POST, url)
            .json(&json!({
                "body": body,
                "position": {
                    "position_type": "text",
                    "new_path": path,
                    "new_line": line,
                    "head_sha": revision,
                },
            }))
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        // GitLab rejects positions it cannot place in the MR diff with 400.
        if resp.status().as_u16() == 400 {
            let message = resp.text().await.unwrap_or_default();
            debug!(path, line, message, "inline comment outside diff, skipping");
            return Ok(CommentOutcome::SkippedLineNotInDiff);
        }
        let note: NoteResponse = Self::check(resp)
            .await?
            .json()
            .await
            .map_err(ProviderError::from_transport)?;
        Ok(CommentOutcome::Posted(note.id.to_string()))
    }

    async fn set_commit_status(
        &self,
        repo: &RepoRef,
        revision: &str,
        state: CommitState,
        description: &str,
    ) -> Result<(), ProviderError> {
        let url = format!(
            "{}/projects/{}/statuses/{revision}",
            self.base,
            Self::project_path(repo)
        );
        // GitLab's vocabulary says `failed`, not `failure`.
        let state_str = match state {
            CommitState::Success => "success",
            CommitState::Failure => "failed",
            CommitState::Pending => "pending",
        };
        let resp = self
            .request(reqwest::Method::POST, url)
            .json(&json!({
                "state": state_str,
                "description": description,
                "name": STATUS_CONTEXT,
            }))
            .send()
            .await
            .map_err(ProviderError::from_transport)?;
        Self::check(resp).await?;
        Ok(())
    }
}

/// Percent-encode a path segment the way GitLab expects project and file
/// paths (everything except unreserved characters).
fn encode_segment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_project_and_file_paths() {
        assert_eq!(encode_segment("group/repo"), "group%2Frepo");
        assert_eq!(encode_segment("src/app.ts"), "src%2Fapp.ts");
        assert_eq!(encode_segment("plain"), "plain");
    }

    #[test]
    fn change_entry_status_mapping() {
        let added = GitlabClient::map_entry(ChangeEntry {
            new_path: Some("a.rs".into()),
            old_path: None,
            new_file: true,
            deleted_file: false,
            renamed_file: false,
            diff: "+fn main() {}\n".into(),
        });
        assert_eq!(added.status, FileStatus::Added);
        assert_eq!(added.additions, 1);

        let removed = GitlabClient::map_entry(ChangeEntry {
            new_path: None,
            old_path: Some("gone.rs".into()),
            new_file: false,
            deleted_file: true,
            renamed_file: false,
            diff: String::new(),
        });
        assert_eq!(removed.status, FileStatus::Removed);
        assert_eq!(removed.path, "gone.rs");
    }
}
