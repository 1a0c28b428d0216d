// SPDX-License-Identifier: MIT
//! Result publication: persist the review and its issues, post the summary
//! and inline comments, set the commit status, and fire the best-effort
//! notification.
//!
//! Only persistence is fatal here. Comment posting, status updates, and
//! notifications degrade to warnings — the analysis outcome is already
//! durable by the time they run.

pub mod format;

use tracing::{debug, info, warn};

use crate::analysis::model::{FileAnalysis, Severity};
use crate::error::ReviewdError;
use crate::notify::{Notifier, ReviewNotification};
use crate::provider::{CommentOutcome, CommitState, ProviderClient, RepoRef};
use crate::storage::{ReviewOutcome, ReviewRow, Storage};

/// Inline comments posted per run, at most. CRITICAL/HIGH only.
pub const INLINE_COMMENT_CAP: usize = 20;

/// What publication managed to deliver.
#[derive(Debug, Default, Clone)]
pub struct PublishStats {
    pub summary_posted: bool,
    pub inline_posted: usize,
    pub inline_skipped: usize,
}

#[allow(clippy::too_many_arguments)]
pub async fn publish_results(
    storage: &Storage,
    notifier: &Notifier,
    client: &dyn ProviderClient,
    repo: &RepoRef,
    review: &ReviewRow,
    results: &[FileAnalysis],
    outcome: &ReviewOutcome,
) -> Result<PublishStats, ReviewdError> {
    // 1. Persist first — everything after this point is best-effort.
    let issues: Vec<(String, crate::analysis::model::Issue)> = results
        .iter()
        .flat_map(|r| r.issues.iter().cloned().map(|i| (r.path.clone(), i)))
        .collect();
    storage.complete_review(&review.id, outcome, &issues).await?;
    info!(
        review = review.external_id,
        issues = issues.len(),
        score = outcome.score,
        gate_passed = outcome.gate_passed,
        "review results persisted"
    );

    let mut stats = PublishStats::default();
    let number = review.number as u64;

    // Branch-compare runs have no change-request thread to comment on.
    if number > 0 {
        stats = post_comments(storage, client, repo, review, results, outcome).await;
    }

    // 2. Commit status reflects the gate.
    if !review.head_sha.is_empty() {
        let (state, description) = if outcome.gate_passed {
            (
                CommitState::Success,
                format!(
                    "Quality gate passed — score {}/100, grade {}",
                    outcome.score, outcome.grade
                ),
            )
        } else {
            (
                CommitState::Failure,
                format!(
                    "Quality gate failed — score {}/100, {} critical issue(s)",
                    outcome.score, outcome.counts.critical
                ),
            )
        };
        if let Err(err) = client
            .set_commit_status(repo, &review.head_sha, state, &description)
            .await
        {
            warn!(review = review.external_id, error = %err, "failed to set commit status");
        }
    }

    // 3. Best-effort notification.
    notifier
        .review_completed(&ReviewNotification {
            repository: repo.full_name(),
            title: review.title.clone(),
            url: review.url.clone(),
            score: outcome.score,
            total_issues: outcome.counts.total(),
            critical_issues: outcome.counts.critical,
            gate_passed: outcome.gate_passed,
        })
        .await;

    Ok(stats)
}

async fn post_comments(
    storage: &Storage,
    client: &dyn ProviderClient,
    repo: &RepoRef,
    review: &ReviewRow,
    results: &[FileAnalysis],
    outcome: &ReviewOutcome,
) -> PublishStats {
    let mut stats = PublishStats::default();
    let number = review.number as u64;

    // Summary comment, one per run.
    let summary = format::format_summary_comment(results, number, outcome.gate_passed);
    match client.post_summary_comment(repo, number, &summary).await {
        Ok(comment_id) => {
            stats.summary_posted = true;
            if let Err(err) = storage
                .insert_comment_ref(&review.id, &comment_id, "summary", None, &summary)
                .await
            {
                warn!(review = review.external_id, error = %err, "failed to record summary comment");
            }
        }
        Err(err) => {
            warn!(review = review.external_id, error = %err, "failed to post summary comment");
        }
    }

    // Inline comments: CRITICAL/HIGH with a line, capped. A line outside the
    // diff is an expected skip, never an alert.
    let inline_targets: Vec<(&str, &crate::analysis::model::Issue)> = results
        .iter()
        .flat_map(|r| {
            r.issues
                .iter()
                .filter(|i| matches!(i.severity, Severity::Critical | Severity::High))
                .filter(|i| i.line.is_some())
                .map(move |i| (r.path.as_str(), i))
        })
        .take(INLINE_COMMENT_CAP)
        .collect();

    for (path, issue) in inline_targets {
        let line = issue.line.unwrap_or(1);
        let body = format::format_inline_comment(issue);
        match client
            .post_inline_comment(repo, number, &review.head_sha, path, line, &body)
            .await
        {
            Ok(CommentOutcome::Posted(comment_id)) => {
                stats.inline_posted += 1;
                if let Err(err) = storage
                    .insert_comment_ref(&review.id, &comment_id, path, Some(line), &body)
                    .await
                {
                    warn!(path, line, error = %err, "failed to record inline comment");
                }
            }
            Ok(CommentOutcome::SkippedLineNotInDiff) => {
                stats.inline_skipped += 1;
                debug!(path, line, "inline comment skipped — line not in diff");
            }
            Err(err) => {
                warn!(path, line, error = %err, "failed to post inline comment");
            }
        }
    }

    info!(
        review = review.external_id,
        summary = stats.summary_posted,
        inline = stats.inline_posted,
        skipped = stats.inline_skipped,
        "comments published"
    );
    stats
}
