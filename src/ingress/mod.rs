// SPDX-License-Identifier: MIT
//! Webhook ingress.
//!
//! One route per provider. Each handler verifies the delivery signature over
//! the exact raw bytes, acknowledges with 202 immediately (providers time
//! out slow webhook endpoints), and processes the event in a spawned task.
//! Processing failures are logged, never surfaced to the provider — retries
//! are the job scheduler's concern, for the enqueued work itself.
//!
//! Processing defensively upserts installation/repository/review rows so the
//! pipeline self-heals against out-of-order or lost earlier events, then
//! enqueues one analysis job.

pub mod signature;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::error::ReviewdError;
use crate::ingress::signature::SignatureCheck;
use crate::provider::Provider;
use crate::AppContext;

/// Webhook routes, mounted under `/webhooks`.
pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/webhooks/github", post(github_webhook))
        .route("/webhooks/gitlab", post(gitlab_webhook))
        .route("/webhooks/bitbucket", post(bitbucket_webhook))
        .with_state(ctx)
}

// ─── Normalized events ────────────────────────────────────────────────────────

/// A provider-agnostic change-request (or branch-push) event, normalized far
/// enough to upsert rows and enqueue a job.
#[derive(Debug, Clone)]
struct ChangeEvent {
    provider: Provider,
    account_id: String,
    account_login: String,
    repo_external_id: String,
    repo_name: String,
    repo_full_name: String,
    default_branch: String,
    private: bool,
    /// Review dedupe key.
    external_id: String,
    /// Change-request number; 0 for branch pushes.
    number: u64,
    title: String,
    url: String,
    state: String,
    head_sha: String,
    base_sha: Option<String>,
}

/// Everything a webhook can normalize to.
#[derive(Debug)]
enum WebhookEvent {
    Change(ChangeEvent),
    InstallationCreated {
        provider: Provider,
        account_id: String,
        account_login: String,
        repositories: Vec<(String, String, String)>, // (external_id, name, full_name)
    },
    InstallationDeleted {
        provider: Provider,
        account_id: String,
    },
    Ignored(String),
}

// ─── Handlers ─────────────────────────────────────────────────────────────────

async fn github_webhook(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let check = signature::check_hmac_signature(
        ctx.config.webhook_secret(Provider::GitHub),
        &body,
        header_str(&headers, "x-hub-signature-256"),
    );
    accept_and_process(ctx, Provider::GitHub, headers, body, check)
}

async fn gitlab_webhook(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let check = signature::check_shared_token(
        ctx.config.webhook_secret(Provider::GitLab),
        header_str(&headers, "x-gitlab-token"),
    );
    accept_and_process(ctx, Provider::GitLab, headers, body, check)
}

async fn bitbucket_webhook(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let check = signature::check_hmac_signature(
        ctx.config.webhook_secret(Provider::Bitbucket),
        &body,
        header_str(&headers, "x-hub-signature"),
    );
    accept_and_process(ctx, Provider::Bitbucket, headers, body, check)
}

/// Shared ack-then-process tail of every webhook handler.
fn accept_and_process(
    ctx: AppContext,
    provider: Provider,
    headers: HeaderMap,
    body: Bytes,
    check: SignatureCheck,
) -> (StatusCode, Json<Value>) {
    if check == SignatureCheck::Missing && !ctx.config.environment.is_production() {
        warn!(%provider, "unsigned webhook accepted (non-production)");
    }
    if !check.accepted(ctx.config.environment.is_production()) {
        warn!(%provider, ?check, "webhook signature rejected");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid signature" })),
        );
    }

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(err) => {
            warn!(%provider, error = %err, "webhook payload is not JSON");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid payload" })),
            );
        }
    };

    let event = normalize(provider, &headers, &payload);
    info!(%provider, event = event_name(&event), "webhook received");

    // Ack fast; the actual work happens in the background. Failures are
    // logged and observable via the review status, never returned here.
    tokio::spawn(async move {
        if let Err(err) = process_event(&ctx, event).await {
            error!(%provider, error = %err, "background webhook processing failed");
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({ "received": true, "processing": true })),
    )
}

fn event_name(event: &WebhookEvent) -> &'static str {
    match event {
        WebhookEvent::Change(_) => "change",
        WebhookEvent::InstallationCreated { .. } => "installation_created",
        WebhookEvent::InstallationDeleted { .. } => "installation_deleted",
        WebhookEvent::Ignored(_) => "ignored",
    }
}

// ─── Normalization ────────────────────────────────────────────────────────────

fn normalize(provider: Provider, headers: &HeaderMap, payload: &Value) -> WebhookEvent {
    match provider {
        Provider::GitHub => normalize_github(headers, payload),
        Provider::GitLab => normalize_gitlab(headers, payload),
        Provider::Bitbucket => normalize_bitbucket(headers, payload),
    }
}

fn normalize_github(headers: &HeaderMap, payload: &Value) -> WebhookEvent {
    // The event header can be absent; infer the kind from the payload shape
    // rather than failing closed.
    let event = header_str(headers, "x-github-event")
        .map(str::to_string)
        .unwrap_or_else(|| {
            let inferred = if payload.get("pull_request").is_some() {
                "pull_request"
            } else if payload.get("installation").is_some() {
                "installation"
            } else if payload.get("commits").is_some() {
                "push"
            } else {
                "unknown"
            };
            warn!(inferred, "missing x-github-event header, inferred from payload");
            inferred.to_string()
        });

    match event.as_str() {
        "pull_request" => {
            let action = str_at(payload, &["action"]).unwrap_or_default();
            if action != "opened" && action != "synchronize" {
                return WebhookEvent::Ignored(format!("pull_request.{action}"));
            }
            let Some(pr) = payload.get("pull_request") else {
                return WebhookEvent::Ignored("pull_request without body".into());
            };
            let repo = &payload["repository"];
            WebhookEvent::Change(ChangeEvent {
                provider: Provider::GitHub,
                account_id: id_at(repo, &["owner", "id"]),
                account_login: str_at(repo, &["owner", "login"]).unwrap_or("unknown").into(),
                repo_external_id: id_at(repo, &["id"]),
                repo_name: str_at(repo, &["name"]).unwrap_or_default().into(),
                repo_full_name: str_at(repo, &["full_name"]).unwrap_or_default().into(),
                default_branch: str_at(repo, &["default_branch"]).unwrap_or("main").into(),
                private: repo["private"].as_bool().unwrap_or(false),
                external_id: id_at(pr, &["id"]),
                number: pr["number"].as_u64().unwrap_or(0),
                title: str_at(pr, &["title"]).unwrap_or_default().into(),
                url: str_at(pr, &["html_url"]).unwrap_or_default().into(),
                state: str_at(pr, &["state"]).unwrap_or("open").into(),
                head_sha: str_at(pr, &["head", "sha"]).unwrap_or_default().into(),
                base_sha: None,
            })
        }
        "push" => {
            let repo = &payload["repository"];
            let git_ref = str_at(payload, &["ref"]).unwrap_or_default().to_string();
            let after = str_at(payload, &["after"]).unwrap_or_default().to_string();
            let before = str_at(payload, &["before"]).map(str::to_string);
            if after.is_empty() || after.chars().all(|c| c == '0') {
                return WebhookEvent::Ignored("push deleting a ref".into());
            }
            WebhookEvent::Change(ChangeEvent {
                provider: Provider::GitHub,
                account_id: id_at(repo, &["owner", "id"]),
                account_login: str_at(repo, &["owner", "login"]).unwrap_or("unknown").into(),
                repo_external_id: id_at(repo, &["id"]),
                repo_name: str_at(repo, &["name"]).unwrap_or_default().into(),
                repo_full_name: str_at(repo, &["full_name"]).unwrap_or_default().into(),
                default_branch: str_at(repo, &["default_branch"]).unwrap_or("main").into(),
                private: repo["private"].as_bool().unwrap_or(false),
                external_id: format!("{}:push:{git_ref}", id_at(repo, &["id"])),
                number: 0,
                title: format!("Push to {git_ref}"),
                url: str_at(repo, &["html_url"]).unwrap_or_default().into(),
                state: "open".into(),
                head_sha: after,
                base_sha: before,
            })
        }
        "installation" => {
            let installation = &payload["installation"];
            let account_id = id_at(installation, &["account", "id"]);
            let account_login = str_at(installation, &["account", "login"])
                .unwrap_or("unknown")
                .to_string();
            match str_at(payload, &["action"]) {
                Some("created") => {
                    let repositories = payload["repositories"]
                        .as_array()
                        .or_else(|| installation["repositories"].as_array())
                        .map(|repos| {
                            repos
                                .iter()
                                .map(|r| {
                                    (
                                        id_at(r, &["id"]),
                                        str_at(r, &["name"]).unwrap_or_default().to_string(),
                                        str_at(r, &["full_name"]).unwrap_or_default().to_string(),
                                    )
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    WebhookEvent::InstallationCreated {
                        provider: Provider::GitHub,
                        account_id,
                        account_login,
                        repositories,
                    }
                }
                Some("deleted") => WebhookEvent::InstallationDeleted {
                    provider: Provider::GitHub,
                    account_id,
                },
                other => WebhookEvent::Ignored(format!("installation.{}", other.unwrap_or("?"))),
            }
        }
        other => WebhookEvent::Ignored(other.to_string()),
    }
}

fn normalize_gitlab(headers: &HeaderMap, payload: &Value) -> WebhookEvent {
    let kind = str_at(payload, &["object_kind"])
        .map(str::to_string)
        .or_else(|| header_str(headers, "x-gitlab-event").map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string());

    let project = &payload["project"];
    let full_path = str_at(project, &["path_with_namespace"]).unwrap_or_default();
    let (namespace, name) = full_path.rsplit_once('/').unwrap_or(("unknown", full_path));

    match kind.as_str() {
        "merge_request" | "Merge Request Hook" => {
            let attrs = &payload["object_attributes"];
            let action = str_at(attrs, &["action"]).unwrap_or_default();
            if action != "open" && action != "update" && action != "reopen" {
                return WebhookEvent::Ignored(format!("merge_request.{action}"));
            }
            WebhookEvent::Change(ChangeEvent {
                provider: Provider::GitLab,
                account_id: namespace.to_string(),
                account_login: namespace.to_string(),
                repo_external_id: id_at(project, &["id"]),
                repo_name: name.to_string(),
                repo_full_name: full_path.to_string(),
                default_branch: str_at(project, &["default_branch"]).unwrap_or("main").into(),
                private: project["visibility_level"].as_u64().map(|v| v < 20).unwrap_or(false),
                external_id: id_at(attrs, &["id"]),
                number: attrs["iid"].as_u64().unwrap_or(0),
                title: str_at(attrs, &["title"]).unwrap_or_default().into(),
                url: str_at(attrs, &["url"]).unwrap_or_default().into(),
                state: str_at(attrs, &["state"]).unwrap_or("opened").into(),
                head_sha: str_at(attrs, &["last_commit", "id"]).unwrap_or_default().into(),
                base_sha: None,
            })
        }
        "push" | "Push Hook" => {
            let after = str_at(payload, &["after"]).unwrap_or_default().to_string();
            if after.is_empty() || after.chars().all(|c| c == '0') {
                return WebhookEvent::Ignored("push deleting a ref".into());
            }
            let git_ref = str_at(payload, &["ref"]).unwrap_or_default().to_string();
            WebhookEvent::Change(ChangeEvent {
                provider: Provider::GitLab,
                account_id: namespace.to_string(),
                account_login: namespace.to_string(),
                repo_external_id: id_at(project, &["id"]),
                repo_name: name.to_string(),
                repo_full_name: full_path.to_string(),
                default_branch: str_at(project, &["default_branch"]).unwrap_or("main").into(),
                private: false,
                external_id: format!("{}:push:{git_ref}", id_at(project, &["id"])),
                number: 0,
                title: format!("Push to {git_ref}"),
                url: str_at(project, &["web_url"]).unwrap_or_default().into(),
                state: "open".into(),
                head_sha: after,
                base_sha: str_at(payload, &["before"]).map(str::to_string),
            })
        }
        other => WebhookEvent::Ignored(other.to_string()),
    }
}

fn normalize_bitbucket(headers: &HeaderMap, payload: &Value) -> WebhookEvent {
    let key = header_str(headers, "x-event-key")
        .map(str::to_string)
        .unwrap_or_else(|| {
            if payload.get("pullrequest").is_some() {
                "pullrequest:updated".to_string()
            } else if payload.get("push").is_some() {
                "repo:push".to_string()
            } else {
                "unknown".to_string()
            }
        });

    let repo = &payload["repository"];
    let full_name = str_at(repo, &["full_name"]).unwrap_or_default();
    let (workspace, name) = full_name.split_once('/').unwrap_or(("unknown", full_name));

    match key.as_str() {
        "pullrequest:created" | "pullrequest:updated" => {
            let pr = &payload["pullrequest"];
            WebhookEvent::Change(ChangeEvent {
                provider: Provider::Bitbucket,
                account_id: workspace.to_string(),
                account_login: workspace.to_string(),
                repo_external_id: str_at(repo, &["uuid"]).unwrap_or(full_name).into(),
                repo_name: name.to_string(),
                repo_full_name: full_name.to_string(),
                default_branch: str_at(repo, &["mainbranch", "name"]).unwrap_or("main").into(),
                private: repo["is_private"].as_bool().unwrap_or(false),
                external_id: format!("{full_name}:pr:{}", id_at(pr, &["id"])),
                number: pr["id"].as_u64().unwrap_or(0),
                title: str_at(pr, &["title"]).unwrap_or_default().into(),
                url: str_at(pr, &["links", "html", "href"]).unwrap_or_default().into(),
                state: str_at(pr, &["state"]).unwrap_or("OPEN").into(),
                head_sha: str_at(pr, &["source", "commit", "hash"]).unwrap_or_default().into(),
                base_sha: None,
            })
        }
        "repo:push" => {
            let change = payload["push"]["changes"].get(0);
            let head = change
                .and_then(|c| str_at(c, &["new", "target", "hash"]))
                .unwrap_or_default()
                .to_string();
            if head.is_empty() {
                return WebhookEvent::Ignored("push deleting a ref".into());
            }
            let branch = change
                .and_then(|c| str_at(c, &["new", "name"]))
                .unwrap_or("branch")
                .to_string();
            WebhookEvent::Change(ChangeEvent {
                provider: Provider::Bitbucket,
                account_id: workspace.to_string(),
                account_login: workspace.to_string(),
                repo_external_id: str_at(repo, &["uuid"]).unwrap_or(full_name).into(),
                repo_name: name.to_string(),
                repo_full_name: full_name.to_string(),
                default_branch: str_at(repo, &["mainbranch", "name"]).unwrap_or("main").into(),
                private: repo["is_private"].as_bool().unwrap_or(false),
                external_id: format!("{full_name}:push:{branch}"),
                number: 0,
                title: format!("Push to {branch}"),
                url: str_at(repo, &["links", "html", "href"]).unwrap_or_default().into(),
                state: "open".into(),
                head_sha: head,
                base_sha: change
                    .and_then(|c| str_at(c, &["old", "target", "hash"]))
                    .map(str::to_string),
            })
        }
        other => WebhookEvent::Ignored(other.to_string()),
    }
}

// ─── Processing ───────────────────────────────────────────────────────────────

async fn process_event(ctx: &AppContext, event: WebhookEvent) -> Result<(), ReviewdError> {
    match event {
        WebhookEvent::Change(change) => ingest_change(ctx, change).await,
        WebhookEvent::InstallationCreated {
            provider,
            account_id,
            account_login,
            repositories,
        } => {
            let installation = ctx
                .storage
                .upsert_installation(provider, &account_id, &account_login, None)
                .await?;
            for (external_id, name, full_name) in &repositories {
                ctx.storage
                    .upsert_repository(
                        &installation.id,
                        provider,
                        external_id,
                        name,
                        full_name,
                        "main",
                        false,
                    )
                    .await?;
            }
            info!(%provider, account = account_login, repos = repositories.len(), "installation saved");
            Ok(())
        }
        WebhookEvent::InstallationDeleted {
            provider,
            account_id,
        } => {
            ctx.storage.delete_installation(provider, &account_id).await?;
            info!(%provider, account_id, "installation deleted");
            Ok(())
        }
        WebhookEvent::Ignored(kind) => {
            debug!(kind, "webhook event ignored");
            Ok(())
        }
    }
}

/// Self-healing upsert cascade followed by one enqueued job.
async fn ingest_change(ctx: &AppContext, ev: ChangeEvent) -> Result<(), ReviewdError> {
    if ev.repo_full_name.is_empty() || ev.external_id.is_empty() {
        return Err(ReviewdError::Validation(
            "change event missing repository or change-request identity".to_string(),
        ));
    }

    let installation = ctx
        .storage
        .upsert_installation(ev.provider, &ev.account_id, &ev.account_login, None)
        .await?;
    let repository = ctx
        .storage
        .upsert_repository(
            &installation.id,
            ev.provider,
            &ev.repo_external_id,
            &ev.repo_name,
            &ev.repo_full_name,
            &ev.default_branch,
            ev.private,
        )
        .await?;
    let review = ctx
        .storage
        .upsert_review(
            &repository.id,
            ev.provider,
            &ev.external_id,
            ev.number,
            &ev.title,
            &ev.url,
            &ev.state,
            &ev.head_sha,
        )
        .await?;

    let (owner, repo_name) = ev
        .repo_full_name
        .split_once('/')
        .unwrap_or((ev.account_login.as_str(), ev.repo_name.as_str()));
    let job_id = ctx
        .storage
        .enqueue_job(
            ev.provider,
            owner,
            repo_name,
            ev.number,
            &ev.head_sha,
            ev.base_sha.as_deref(),
            &ev.external_id,
            &ev.title,
            &ev.url,
        )
        .await?;

    info!(
        provider = %ev.provider,
        repo = ev.repo_full_name,
        number = ev.number,
        review_id = review.id,
        job_id,
        "analysis job enqueued"
    );
    Ok(())
}

// ─── JSON helpers ─────────────────────────────────────────────────────────────

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Walk `path` through nested objects and return the string leaf.
fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    current.as_str()
}

/// Numeric-or-string id rendered as a string.
fn id_at(value: &Value, path: &[&str]) -> String {
    let mut current = value;
    for key in path {
        match current.get(key) {
            Some(next) => current = next,
            None => return String::new(),
        }
    }
    match current {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn github_pr_payload() -> Value {
        json!({
            "action": "opened",
            "pull_request": {
                "id": 9001,
                "number": 12,
                "title": "Add login",
                "html_url": "https://github.com/octo/repo/pull/12",
                "state": "open",
                "head": { "sha": "deadbeef" }
            },
            "repository": {
                "id": 555,
                "name": "repo",
                "full_name": "octo/repo",
                "default_branch": "main",
                "private": false,
                "owner": { "id": 77, "login": "octo" }
            }
        })
    }

    #[test]
    fn github_pull_request_normalizes() {
        let headers = {
            let mut h = HeaderMap::new();
            h.insert("x-github-event", "pull_request".parse().unwrap());
            h
        };
        let event = normalize_github(&headers, &github_pr_payload());
        let WebhookEvent::Change(change) = event else {
            panic!("expected change event");
        };
        assert_eq!(change.external_id, "9001");
        assert_eq!(change.number, 12);
        assert_eq!(change.head_sha, "deadbeef");
        assert_eq!(change.repo_full_name, "octo/repo");
    }

    #[test]
    fn github_event_kind_inferred_without_header() {
        let event = normalize_github(&HeaderMap::new(), &github_pr_payload());
        assert!(matches!(event, WebhookEvent::Change(_)));
    }

    #[test]
    fn github_closed_action_is_ignored() {
        let mut payload = github_pr_payload();
        payload["action"] = json!("closed");
        let event = normalize_github(&HeaderMap::new(), &payload);
        assert!(matches!(event, WebhookEvent::Ignored(_)));
    }

    #[test]
    fn gitlab_merge_request_normalizes() {
        let payload = json!({
            "object_kind": "merge_request",
            "object_attributes": {
                "id": 321, "iid": 4, "action": "open", "title": "MR",
                "url": "https://gitlab.com/grp/proj/-/merge_requests/4",
                "state": "opened",
                "last_commit": { "id": "cafe01" }
            },
            "project": {
                "id": 88, "path_with_namespace": "grp/proj",
                "default_branch": "main", "web_url": "https://gitlab.com/grp/proj"
            }
        });
        let event = normalize_gitlab(&HeaderMap::new(), &payload);
        let WebhookEvent::Change(change) = event else {
            panic!("expected change event");
        };
        assert_eq!(change.provider, Provider::GitLab);
        assert_eq!(change.external_id, "321");
        assert_eq!(change.number, 4);
        assert_eq!(change.head_sha, "cafe01");
    }

    #[test]
    fn bitbucket_pull_request_normalizes() {
        let mut headers = HeaderMap::new();
        headers.insert("x-event-key", "pullrequest:created".parse().unwrap());
        let payload = json!({
            "pullrequest": {
                "id": 6, "title": "PR", "state": "OPEN",
                "links": { "html": { "href": "https://bitbucket.org/ws/repo/pull-requests/6" } },
                "source": { "commit": { "hash": "beefcafe" } }
            },
            "repository": {
                "uuid": "{abc}", "full_name": "ws/repo", "is_private": true,
                "mainbranch": { "name": "main" }
            }
        });
        let event = normalize_bitbucket(&headers, &payload);
        let WebhookEvent::Change(change) = event else {
            panic!("expected change event");
        };
        assert_eq!(change.number, 6);
        assert_eq!(change.head_sha, "beefcafe");
        assert_eq!(change.external_id, "ws/repo:pr:6");
        assert!(change.private);
    }

    #[test]
    fn push_with_zero_after_is_ignored() {
        let payload = json!({
            "ref": "refs/heads/gone",
            "before": "cafe01",
            "after": "0000000000000000000000000000000000000000",
            "commits": [],
            "repository": { "id": 1, "full_name": "octo/repo", "owner": { "id": 1, "login": "octo" } }
        });
        let mut headers = HeaderMap::new();
        headers.insert("x-github-event", "push".parse().unwrap());
        assert!(matches!(
            normalize_github(&headers, &payload),
            WebhookEvent::Ignored(_)
        ));
    }
}
