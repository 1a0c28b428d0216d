// SPDX-License-Identifier: MIT
//! REST API: CI trigger, review retrieval, health.
//!
//! Endpoints:
//!   POST /api/v1/analyze/trigger
//!   GET  /api/v1/reviews/{external_id}
//!   GET  /api/v1/health

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::error::ProviderError;
use crate::provider::{self, Provider, RepoRef};
use crate::AppContext;

pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/analyze/trigger", post(trigger_analysis))
        .route("/api/v1/reviews/{external_id}", get(get_review))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

// ─── Health ───────────────────────────────────────────────────────────────────

async fn health(State(ctx): State<AppContext>) -> Json<Value> {
    let db_ok = ctx.storage.ping().await;
    Json(json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": ctx.started_at.elapsed().as_secs(),
        "db_ok": db_ok,
    }))
}

// ─── CI trigger ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TriggerRequest {
    /// Defaults to GitHub when omitted.
    provider: Option<String>,
    owner: String,
    repo: String,
    pull_number: u64,
}

/// Enqueue the same job type the webhook path produces. Used by CI systems
/// polling the review afterwards.
async fn trigger_analysis(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(request): Json<TriggerRequest>,
) -> (StatusCode, Json<Value>) {
    let Some(expected) = ctx.config.api.trigger_token.as_deref().filter(|t| !t.is_empty()) else {
        return error_response(StatusCode::UNAUTHORIZED, "trigger endpoint is disabled");
    };
    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if provided != Some(expected) {
        return error_response(StatusCode::UNAUTHORIZED, "invalid or missing token");
    }

    let provider = match request.provider.as_deref() {
        None => Provider::GitHub,
        Some(name) => match Provider::from_str(name) {
            Some(p) => p,
            None => return error_response(StatusCode::BAD_REQUEST, "unknown provider"),
        },
    };
    if request.owner.is_empty() || request.repo.is_empty() || request.pull_number == 0 {
        return error_response(StatusCode::BAD_REQUEST, "owner, repo, and pullNumber are required");
    }

    let full_name = format!("{}/{}", request.owner, request.repo);
    let repository = match ctx.storage.find_repository(provider, &full_name).await {
        Ok(Some(row)) => row,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "repository not found or not enabled"),
        Err(err) => {
            warn!(error = %err, "repository lookup failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "lookup failed");
        }
    };

    // Resolve the live change request so the review row carries its title,
    // URL, and head revision.
    let token = match installation_token(&ctx, provider, &repository.installation_id).await {
        Some(token) => token,
        None => return error_response(StatusCode::INTERNAL_SERVER_ERROR, "no provider credentials"),
    };
    let client = provider::build_client(provider, token, ctx.config.provider_api_base(provider));
    let repo_ref = RepoRef::new(request.owner.clone(), request.repo.clone());
    let change = match client.get_change_request(&repo_ref, request.pull_number).await {
        Ok(change) => change,
        Err(ProviderError::NotFound(_)) => {
            return error_response(StatusCode::NOT_FOUND, "pull request not found")
        }
        Err(err) => {
            warn!(error = %err, "change-request lookup failed");
            return error_response(StatusCode::BAD_GATEWAY, "provider lookup failed");
        }
    };

    let review = match ctx
        .storage
        .upsert_review(
            &repository.id,
            provider,
            &change.id,
            change.number,
            &change.title,
            &change.url,
            &change.state,
            &change.head_sha,
        )
        .await
    {
        Ok(review) => review,
        Err(err) => {
            warn!(error = %err, "review upsert failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "persistence failed");
        }
    };

    let job_id = match ctx
        .storage
        .enqueue_job(
            provider,
            &request.owner,
            &request.repo,
            change.number,
            &change.head_sha,
            None,
            &change.id,
            &change.title,
            &change.url,
        )
        .await
    {
        Ok(job_id) => job_id,
        Err(err) => {
            warn!(error = %err, "job enqueue failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "enqueue failed");
        }
    };

    info!(
        %provider,
        repo = full_name,
        number = request.pull_number,
        job_id,
        "analysis triggered via API"
    );
    (
        StatusCode::ACCEPTED,
        Json(json!({ "jobId": job_id, "reviewId": review.id })),
    )
}

async fn installation_token(
    ctx: &AppContext,
    provider: Provider,
    installation_id: &str,
) -> Option<String> {
    let installation = ctx.storage.get_installation(installation_id).await.ok().flatten();
    installation
        .map(|i| i.token)
        .filter(|t| !t.is_empty())
        .or_else(|| ctx.config.provider_token(provider))
}

// ─── Review retrieval ─────────────────────────────────────────────────────────

/// Review + issues for dashboards and CI polling.
async fn get_review(
    State(ctx): State<AppContext>,
    Path(external_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    let review = match ctx.storage.get_review(&external_id).await {
        Ok(Some(review)) => review,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "review not found"),
        Err(err) => {
            warn!(error = %err, "review lookup failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "lookup failed");
        }
    };
    let issues = match ctx.storage.list_issues(&review.id).await {
        Ok(issues) => issues,
        Err(err) => {
            warn!(error = %err, "issue lookup failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "lookup failed");
        }
    };
    (
        StatusCode::OK,
        Json(json!({ "review": review, "issues": issues })),
    )
}

fn error_response(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message })))
}
