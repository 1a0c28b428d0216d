// SPDX-License-Identifier: MIT
//! Durable job scheduling.
//!
//! Jobs live in the SQLite `jobs` table; a bounded worker pool claims due
//! jobs, throttled by a global sliding-window rate limit. Each job gets up
//! to `max_attempts` tries with exponential backoff between attempts. Jobs
//! are idempotent — replaying one after a crash converges to the same review
//! state via the review upsert and per-run issue replacement.

pub mod backoff;
pub mod rate_limit;
pub mod worker;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::provider::{ChangeTarget, Provider, RepoRef};
use crate::scheduler::backoff::BackoffConfig;
use crate::storage::JobRow;
use crate::AppContext;

/// Queue payload for one "analyze revision" job. Carries enough context to
/// be replayed idempotently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: String,
    pub provider: Provider,
    pub owner: String,
    pub repo: String,
    /// Change-request number; `0` marks a branch-compare job.
    pub number: u64,
    pub head_sha: String,
    /// Compare base for branch-compare jobs.
    pub base_sha: Option<String>,
    /// Review dedupe key (provider-global change-request id).
    pub review_external_id: String,
    pub title: String,
    pub url: String,
    /// Attempts already consumed before this execution.
    pub attempts: u32,
}

impl AnalysisJob {
    /// Decode a queue row. `None` when the stored provider is unknown
    /// (schema drift) — such jobs are failed, not retried.
    pub fn from_row(row: &JobRow) -> Option<Self> {
        Some(Self {
            id: row.id.clone(),
            provider: Provider::from_str(&row.provider)?,
            owner: row.owner.clone(),
            repo: row.repo.clone(),
            number: row.number.max(0) as u64,
            head_sha: row.head_sha.clone(),
            base_sha: row.base_sha.clone(),
            review_external_id: row.review_external_id.clone(),
            title: row.title.clone(),
            url: row.url.clone(),
            attempts: row.attempts.max(0) as u32,
        })
    }

    pub fn repo_ref(&self) -> RepoRef {
        RepoRef::new(self.owner.clone(), self.repo.clone())
    }

    /// What to diff: the change request, or the push's compare range.
    pub fn target(&self) -> ChangeTarget {
        if self.number > 0 {
            ChangeTarget::Number(self.number)
        } else {
            ChangeTarget::Range {
                base: self.base_sha.clone().unwrap_or_default(),
                head: self.head_sha.clone(),
            }
        }
    }
}

/// Start the worker pool. Also requeues jobs a previous process left
/// `running` — idempotent processing makes that replay safe.
pub async fn start_workers(ctx: AppContext) -> Vec<JoinHandle<()>> {
    match ctx.storage.requeue_stale_running_jobs().await {
        Ok(0) => {}
        Ok(n) => info!(requeued = n, "recovered stale running jobs"),
        Err(err) => warn!(error = %err, "failed to requeue stale jobs"),
    }

    let concurrency = ctx.config.scheduler.worker_concurrency.max(1);
    info!(concurrency, "starting analysis workers");
    (0..concurrency)
        .map(|worker_id| {
            let ctx = ctx.clone();
            tokio::spawn(worker_loop(ctx, worker_id))
        })
        .collect()
}

async fn worker_loop(ctx: AppContext, worker_id: usize) {
    let poll = std::time::Duration::from_millis(ctx.config.scheduler.poll_interval_ms.max(100));
    loop {
        match ctx.storage.claim_due_job().await {
            Ok(Some(row)) => {
                // Throughput cap applies at job start, after the claim, so a
                // throttled worker holds its job instead of spinning.
                ctx.throttle.acquire().await;
                execute_claimed(&ctx, worker_id, row).await;
            }
            Ok(None) => tokio::time::sleep(poll).await,
            Err(err) => {
                error!(worker_id, error = %err, "queue poll failed");
                tokio::time::sleep(poll).await;
            }
        }
    }
}

async fn execute_claimed(ctx: &AppContext, worker_id: usize, row: JobRow) {
    let Some(job) = AnalysisJob::from_row(&row) else {
        warn!(job_id = row.id, provider = row.provider, "unknown provider in queue, failing job");
        let _ = ctx
            .storage
            .fail_job(&row.id, row.attempts.max(0) as u32, "unknown provider")
            .await;
        return;
    };

    let attempt = job.attempts + 1;
    let max_attempts = ctx.config.scheduler.max_attempts.max(1);
    info!(
        worker_id,
        job_id = job.id,
        provider = %job.provider,
        repo = %job.repo_ref().full_name(),
        number = job.number,
        attempt,
        max_attempts,
        "processing analysis job"
    );

    match worker::run_analysis_job(ctx, &job).await {
        Ok(stats) => {
            if let Err(err) = ctx.storage.complete_job(&job.id).await {
                warn!(job_id = job.id, error = %err, "failed to mark job done");
            }
            info!(
                worker_id,
                job_id = job.id,
                analyzed_files = stats.analyzed_files,
                total_issues = stats.total_issues,
                "analysis job completed"
            );
        }
        Err(err) => {
            if attempt >= max_attempts || !is_retryable(&err) {
                error!(job_id = job.id, attempt, error = %err, "job failed, retries exhausted");
                let _ = ctx
                    .storage
                    .fail_job(&job.id, attempt, &err.to_string())
                    .await;
                worker::finalize_failed_job(ctx, &job).await;
            } else {
                let delay =
                    backoff::next_backoff(attempt - 1, &BackoffConfig::from_scheduler(&ctx.config.scheduler));
                let run_after = (Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::seconds(2)))
                .to_rfc3339();
                warn!(
                    job_id = job.id,
                    attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %err,
                    "job attempt failed — retrying with backoff"
                );
                let _ = ctx
                    .storage
                    .retry_job(&job.id, attempt, &run_after, &err.to_string())
                    .await;
            }
        }
    }
}

/// Whether another attempt could plausibly succeed. Auth, validation, and
/// hard provider rejections fail immediately; transient provider and
/// persistence failures go through backoff.
fn is_retryable(err: &crate::error::ReviewdError) -> bool {
    use crate::error::ReviewdError;
    match err {
        ReviewdError::Provider(provider_err) => provider_err.is_transient(),
        ReviewdError::Persistence(_) => true,
        ReviewdError::Ai(_) => true,
        ReviewdError::Authentication(_)
        | ReviewdError::Validation(_)
        | ReviewdError::Config(_)
        | ReviewdError::NotFound(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ProviderError, ReviewdError};

    fn row(provider: &str, number: i64) -> JobRow {
        JobRow {
            id: "j1".into(),
            provider: provider.into(),
            owner: "octo".into(),
            repo: "repo".into(),
            number,
            head_sha: "head".into(),
            base_sha: Some("base".into()),
            review_external_id: "pr-1".into(),
            title: "t".into(),
            url: "u".into(),
            status: "queued".into(),
            attempts: 1,
            run_after: String::new(),
            last_error: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn decodes_change_request_job() {
        let job = AnalysisJob::from_row(&row("github", 12)).unwrap();
        assert_eq!(job.provider, Provider::GitHub);
        assert!(matches!(job.target(), ChangeTarget::Number(12)));
        assert_eq!(job.attempts, 1);
    }

    #[test]
    fn number_zero_is_a_compare_range() {
        let job = AnalysisJob::from_row(&row("gitlab", 0)).unwrap();
        match job.target() {
            ChangeTarget::Range { base, head } => {
                assert_eq!(base, "base");
                assert_eq!(head, "head");
            }
            other => panic!("expected range target, got {other:?}"),
        }
    }

    #[test]
    fn unknown_provider_is_rejected() {
        assert!(AnalysisJob::from_row(&row("sourceforge", 1)).is_none());
    }

    #[test]
    fn retryability_follows_the_error_taxonomy() {
        assert!(is_retryable(&ReviewdError::Provider(ProviderError::Transient(
            "rate limited".into()
        ))));
        assert!(is_retryable(&ReviewdError::Persistence("db locked".into())));
        assert!(!is_retryable(&ReviewdError::Provider(ProviderError::Auth(
            "bad token".into()
        ))));
        assert!(!is_retryable(&ReviewdError::Validation("bad payload".into())));
        assert!(!is_retryable(&ReviewdError::NotFound("repo".into())));
    }
}
