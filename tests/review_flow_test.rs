//! Review lifecycle: idempotent ingestion, monotonic status, persisted runs.

use reviewd::analysis::model::{Category, Issue, IssueSource, Severity};
use reviewd::maintainability::IssueCounts;
use reviewd::provider::Provider;
use reviewd::storage::{ReviewOutcome, Storage};

/// The upsert cascade the webhook ingress performs for one delivery.
async fn ingest_pr_event(storage: &Storage) -> String {
    let installation = storage
        .upsert_installation(Provider::GitHub, "77", "octo", None)
        .await
        .unwrap();
    let repo = storage
        .upsert_repository(
            &installation.id,
            Provider::GitHub,
            "555",
            "repo",
            "octo/repo",
            "main",
            false,
        )
        .await
        .unwrap();
    let review = storage
        .upsert_review(
            &repo.id,
            Provider::GitHub,
            "9001",
            12,
            "Add login",
            "https://github.com/octo/repo/pull/12",
            "open",
            "deadbeef",
        )
        .await
        .unwrap();
    storage
        .enqueue_job(
            Provider::GitHub,
            "octo",
            "repo",
            12,
            "deadbeef",
            None,
            "9001",
            "Add login",
            "https://github.com/octo/repo/pull/12",
        )
        .await
        .unwrap();
    review.id
}

fn critical_issue() -> Issue {
    Issue {
        severity: Severity::Critical,
        category: Category::Security,
        title: "Hardcoded Password".into(),
        description: "Password is hardcoded in source code".into(),
        line: Some(5),
        column: None,
        code_snippet: Some("password = \"admin123\"".into()),
        suggested_fix: Some("Move password to environment variable".into()),
        cwe_id: Some("CWE-798".into()),
        owasp_category: None,
        rule_id: Some("hardcoded-password".into()),
        source: IssueSource::RuleEngine,
    }
}

#[tokio::test]
async fn duplicate_deliveries_converge_to_one_review() {
    let storage = Storage::in_memory().await.unwrap();
    let first = ingest_pr_event(&storage).await;
    let second = ingest_pr_event(&storage).await;
    assert_eq!(first, second, "same change request must reuse one review row");
}

#[tokio::test]
async fn completed_run_persists_aggregates_and_issues() {
    let storage = Storage::in_memory().await.unwrap();
    let review_id = ingest_pr_event(&storage).await;

    storage.mark_review_processing("9001").await.unwrap();
    let outcome = ReviewOutcome {
        score: 80,
        counts: IssueCounts {
            critical: 1,
            ..Default::default()
        },
        gate_passed: false,
        grade: "B".into(),
        remediation_minutes: 60,
    };
    storage
        .complete_review(
            &review_id,
            &outcome,
            &[("src/config.js".to_string(), critical_issue())],
        )
        .await
        .unwrap();

    let review = storage.get_review("9001").await.unwrap().unwrap();
    assert_eq!(review.status, "completed");
    assert_eq!(review.score, Some(80));
    assert_eq!(review.critical_count, 1);
    assert_eq!(review.gate_passed, Some(false));
    assert_eq!(review.grade.as_deref(), Some("B"));
    assert_eq!(review.remediation_minutes, Some(60));

    let issues = storage.list_issues(&review.id).await.unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].severity, "CRITICAL");
    assert_eq!(issues[0].file_path, "src/config.js");
    assert_eq!(issues[0].rule_id.as_deref(), Some("hardcoded-password"));
}

#[tokio::test]
async fn failed_run_produces_no_issues() {
    let storage = Storage::in_memory().await.unwrap();
    let review_id = ingest_pr_event(&storage).await;

    storage.mark_review_processing("9001").await.unwrap();
    storage.mark_review_failed("9001", "analysis failed").await.unwrap();

    let review = storage.get_review("9001").await.unwrap().unwrap();
    assert_eq!(review.status, "failed");
    assert_eq!(review.error.as_deref(), Some("analysis failed"));
    assert!(storage.list_issues(&review_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn queue_and_reviews_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();

    {
        let storage = Storage::new(dir.path()).await.unwrap();
        ingest_pr_event(&storage).await;
    }

    // A fresh process over the same data directory sees the durable state.
    let storage = Storage::new(dir.path()).await.unwrap();
    let review = storage.get_review("9001").await.unwrap().unwrap();
    assert_eq!(review.status, "pending");
    let job = storage.claim_due_job().await.unwrap().expect("job survived restart");
    assert_eq!(job.review_external_id, "9001");
}

#[tokio::test]
async fn new_revision_resets_review_for_reanalysis() {
    let storage = Storage::in_memory().await.unwrap();
    let review_id = ingest_pr_event(&storage).await;

    storage.mark_review_processing("9001").await.unwrap();
    let outcome = ReviewOutcome {
        score: 95,
        counts: IssueCounts::default(),
        gate_passed: true,
        grade: "A".into(),
        remediation_minutes: 0,
    };
    storage.complete_review(&review_id, &outcome, &[]).await.unwrap();

    // A new commit re-ingests the same change request: the row resets to
    // pending but keeps its identity.
    let again = ingest_pr_event(&storage).await;
    assert_eq!(again, review_id);
    let review = storage.get_review("9001").await.unwrap().unwrap();
    assert_eq!(review.status, "pending");
}
