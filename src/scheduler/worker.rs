// SPDX-License-Identifier: MIT
//! The "analyze revision" job body.
//!
//! Resolves an authenticated provider client, fetches the diff and policy
//! file, runs the per-file pipeline, evaluates the quality gate and
//! maintainability grade, and hands the result to the publisher. Partial
//! failures stay local: a file whose fetch fails is dropped, the AI stage
//! degrades silently, and only diff resolution or persistence failures fail
//! the job.

use futures::future::join_all;
use tracing::{info, warn};

use crate::analysis::model::FileAnalysis;
use crate::analysis::{self, language, SourceFile};
use crate::error::{ProviderError, ReviewdError};
use crate::maintainability::{self, IssueCounts};
use crate::policy::{RepoPolicy, POLICY_FILE_PATH};
use crate::provider::{self, CommitState, FileStatus, ProviderClient};
use crate::publish;
use crate::scheduler::AnalysisJob;
use crate::storage::{RepositoryRow, ReviewOutcome};
use crate::AppContext;

/// What one successful job processed.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobStats {
    pub analyzed_files: usize,
    pub total_issues: usize,
}

pub async fn run_analysis_job(ctx: &AppContext, job: &AnalysisJob) -> Result<JobStats, ReviewdError> {
    let repo_ref = job.repo_ref();

    // Self-healing lookups: ingress normally creates these rows before
    // enqueueing, but a replayed job must not depend on that.
    let repo_row = resolve_repository(ctx, job).await?;
    let client = client_for(ctx, job, &repo_row).await?;

    let review = ctx
        .storage
        .upsert_review(
            &repo_row.id,
            job.provider,
            &job.review_external_id,
            job.number,
            &job.title,
            &job.url,
            "open",
            &job.head_sha,
        )
        .await?;
    ctx.storage.mark_review_processing(&review.external_id).await?;

    // Analysis is underway — tell the change request.
    if !job.head_sha.is_empty() {
        if let Err(err) = client
            .set_commit_status(&repo_ref, &job.head_sha, CommitState::Pending, "Analysis running")
            .await
        {
            warn!(job_id = job.id, error = %err, "failed to set pending status");
        }
    }

    // Diff resolution is essential — failures here bubble to the retry loop.
    let changed = client.list_changed_files(&repo_ref, &job.target()).await?;
    info!(job_id = job.id, files = changed.len(), "change-request diff resolved");

    // Per-repository policy from the head revision; defaults when absent.
    let policy = load_policy(client.as_ref(), &repo_ref, &job.head_sha).await;

    // Eligibility: drop removed files, unsupported languages, and ignored
    // paths before fetching anything.
    let eligible: Vec<String> = changed
        .iter()
        .filter(|f| f.status != FileStatus::Removed)
        .filter(|f| language::is_supported(&f.path))
        .filter(|f| !policy.is_path_ignored(&f.path))
        .map(|f| f.path.clone())
        .collect();

    if eligible.is_empty() {
        info!(job_id = job.id, total_files = changed.len(), "no analyzable files in diff");
        return complete_empty(ctx, client.as_ref(), job, &review.id, &repo_ref, &policy).await;
    }

    // Fetch contents; one file's failure drops that file, never the job.
    let fetched = join_all(eligible.iter().map(|path| {
        let client = &client;
        let repo_ref = &repo_ref;
        let head_sha = &job.head_sha;
        async move {
            match client.get_file_content(repo_ref, path, head_sha).await {
                Ok(code) => Some(SourceFile {
                    path: path.clone(),
                    code,
                }),
                Err(err) => {
                    warn!(path, error = %err, "failed to fetch file content, dropping from analysis");
                    None
                }
            }
        }
    }))
    .await;
    let files: Vec<SourceFile> = fetched.into_iter().flatten().collect();

    if files.is_empty() {
        warn!(job_id = job.id, "no file contents could be fetched");
        return complete_empty(ctx, client.as_ref(), job, &review.id, &repo_ref, &policy).await;
    }

    // The pipeline proper, then policy filtering on the fused issue lists.
    let analyses = analysis::analyze_files(&ctx.ai, &files, &policy).await;
    let results: Vec<FileAnalysis> = analyses
        .into_iter()
        .map(|fa| apply_policy(fa, &policy))
        .collect();

    let outcome = evaluate(&results, &policy);
    let stats = JobStats {
        analyzed_files: results.len(),
        total_issues: outcome.counts.total(),
    };

    let review = ctx
        .storage
        .get_review(&job.review_external_id)
        .await?
        .ok_or_else(|| ReviewdError::NotFound(format!("review {}", job.review_external_id)))?;

    publish::publish_results(
        &ctx.storage,
        &ctx.notifier,
        client.as_ref(),
        &repo_ref,
        &review,
        &results,
        &outcome,
    )
    .await?;

    Ok(stats)
}

/// Retries exhausted: review becomes failed and the commit gets a failing
/// status. Internal error detail never reaches the provider surface.
pub async fn finalize_failed_job(ctx: &AppContext, job: &AnalysisJob) {
    if let Err(err) = ctx
        .storage
        .mark_review_failed(&job.review_external_id, "analysis failed")
        .await
    {
        warn!(job_id = job.id, error = %err, "failed to mark review failed");
    }

    if job.head_sha.is_empty() {
        return;
    }
    let Ok(repo_row) = resolve_repository(ctx, job).await else {
        return;
    };
    let Ok(client) = client_for(ctx, job, &repo_row).await else {
        return;
    };
    if let Err(err) = client
        .set_commit_status(
            &job.repo_ref(),
            &job.head_sha,
            CommitState::Failure,
            "Analysis failed",
        )
        .await
    {
        warn!(job_id = job.id, error = %err, "failed to set failing commit status");
    }
}

async fn resolve_repository(
    ctx: &AppContext,
    job: &AnalysisJob,
) -> Result<RepositoryRow, ReviewdError> {
    let full_name = job.repo_ref().full_name();
    if let Some(row) = ctx.storage.find_repository(job.provider, &full_name).await? {
        return Ok(row);
    }
    warn!(repo = full_name, "repository unknown, creating from job context");
    let installation = ctx
        .storage
        .upsert_installation(job.provider, &job.owner, &job.owner, None)
        .await?;
    ctx.storage
        .upsert_repository(
            &installation.id,
            job.provider,
            &full_name,
            &job.repo,
            &full_name,
            "main",
            false,
        )
        .await
}

async fn client_for(
    ctx: &AppContext,
    job: &AnalysisJob,
    repo_row: &RepositoryRow,
) -> Result<Box<dyn ProviderClient>, ReviewdError> {
    let installation = ctx.storage.get_installation(&repo_row.installation_id).await?;
    let installation_token = installation
        .as_ref()
        .map(|i| i.token.clone())
        .filter(|t| !t.is_empty());
    let token = installation_token
        .or_else(|| ctx.config.provider_token(job.provider))
        .ok_or_else(|| {
            ReviewdError::Config(format!("no credentials for provider {}", job.provider))
        })?;
    let api_base = ctx
        .config
        .provider_api_base(job.provider)
        .or_else(|| installation.and_then(|i| i.base_url));
    Ok(provider::build_client(job.provider, token, api_base))
}

async fn load_policy(
    client: &dyn ProviderClient,
    repo_ref: &crate::provider::RepoRef,
    head_sha: &str,
) -> RepoPolicy {
    match client
        .get_file_content(repo_ref, POLICY_FILE_PATH, head_sha)
        .await
    {
        Ok(raw) => RepoPolicy::parse(Some(&raw)),
        Err(ProviderError::NotFound(_)) => RepoPolicy::default(),
        Err(err) => {
            warn!(error = %err, "policy file fetch failed, using defaults");
            RepoPolicy::default()
        }
    }
}

/// Category filter + rule overrides, then restore the severity ordering an
/// override may have disturbed.
fn apply_policy(mut fa: FileAnalysis, policy: &RepoPolicy) -> FileAnalysis {
    let issues = policy.apply_rule_overrides(policy.filter_by_category(std::mem::take(&mut fa.issues)));
    let mut issues = issues;
    issues.sort_by_key(|i| i.severity.rank());
    fa.issues = issues;
    fa
}

/// Aggregate filtered per-file results into the review outcome.
fn evaluate(results: &[FileAnalysis], policy: &RepoPolicy) -> ReviewOutcome {
    let mut counts = IssueCounts::default();
    for issue in results.iter().flat_map(|r| r.issues.iter()) {
        counts.add(issue.severity);
    }
    let avg_score = if results.is_empty() {
        100.0
    } else {
        results.iter().map(|r| r.score as f64).sum::<f64>() / results.len() as f64
    };
    let minutes = maintainability::remediation_minutes(&counts);
    ReviewOutcome {
        score: avg_score.round().clamp(0.0, 100.0) as u8,
        counts,
        gate_passed: policy.gate_passed(counts.critical, avg_score),
        grade: maintainability::grade_for_minutes(minutes).to_string(),
        remediation_minutes: minutes,
    }
}

/// Nothing to analyze: complete the review as clean and report success.
async fn complete_empty(
    ctx: &AppContext,
    client: &dyn ProviderClient,
    job: &AnalysisJob,
    review_id: &str,
    repo_ref: &crate::provider::RepoRef,
    policy: &RepoPolicy,
) -> Result<JobStats, ReviewdError> {
    let outcome = ReviewOutcome {
        score: 100,
        counts: IssueCounts::default(),
        gate_passed: policy.gate_passed(0, 100.0),
        grade: maintainability::grade_for_minutes(0).to_string(),
        remediation_minutes: 0,
    };
    ctx.storage.complete_review(review_id, &outcome, &[]).await?;
    if !job.head_sha.is_empty() {
        if let Err(err) = client
            .set_commit_status(
                repo_ref,
                &job.head_sha,
                CommitState::Success,
                "No analyzable files in this change",
            )
            .await
        {
            warn!(job_id = job.id, error = %err, "failed to set commit status");
        }
    }
    Ok(JobStats::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::model::{Category, CodeStructure, Issue, IssueSource, Severity};

    fn fa(path: &str, score: u8, issues: Vec<Issue>) -> FileAnalysis {
        FileAnalysis {
            path: path.into(),
            language: "javascript".into(),
            structure: CodeStructure::default(),
            issues,
            score,
            summary: String::new(),
            ai_ran: false,
        }
    }

    fn issue(severity: Severity) -> Issue {
        Issue {
            severity,
            category: Category::Security,
            title: "x".into(),
            description: String::new(),
            line: Some(1),
            column: None,
            code_snippet: None,
            suggested_fix: None,
            cwe_id: None,
            owasp_category: None,
            rule_id: Some("x".into()),
            source: IssueSource::RuleEngine,
        }
    }

    #[test]
    fn evaluate_averages_scores_and_counts_issues() {
        let policy = RepoPolicy::default();
        let results = vec![
            fa("a.js", 80, vec![issue(Severity::Critical)]),
            fa("b.js", 100, vec![]),
        ];
        let outcome = evaluate(&results, &policy);
        assert_eq!(outcome.score, 90);
        assert_eq!(outcome.counts.critical, 1);
        assert!(!outcome.gate_passed, "block_on_critical default blocks");
        assert_eq!(outcome.remediation_minutes, 60);
        assert_eq!(outcome.grade, "B");
    }

    #[test]
    fn evaluate_min_score_boundary() {
        let mut policy = RepoPolicy::default();
        policy.quality_gate.block_on_critical = false;
        policy.quality_gate.min_score = Some(80);

        let failing = evaluate(&[fa("a.js", 79, vec![])], &policy);
        assert!(!failing.gate_passed);

        let passing = evaluate(&[fa("a.js", 80, vec![])], &policy);
        assert!(passing.gate_passed);
    }

    #[test]
    fn empty_results_pass_with_full_score() {
        let outcome = evaluate(&[], &RepoPolicy::default());
        assert_eq!(outcome.score, 100);
        assert!(outcome.gate_passed);
        assert_eq!(outcome.grade, "A");
    }
}
