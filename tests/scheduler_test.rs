//! Integration tests for the durable job scheduler.

use chrono::Utc;
use reviewd::provider::Provider;
use reviewd::scheduler::{
    backoff::{next_backoff, BackoffConfig},
    rate_limit::{JobThrottle, SlidingWindow},
    AnalysisJob,
};
use reviewd::storage::Storage;

// ── Sliding window tests ─────────────────────────────────────────────────────

#[tokio::test]
async fn sliding_window_counts_correctly() {
    let mut window = SlidingWindow::new(60, 5);
    let now = Utc::now();

    assert!(!window.is_limited(now));
    assert_eq!(window.count_in_window(now), 0);

    for _ in 0..5 {
        window.record_event(now);
    }
    assert!(window.is_limited(now), "should be limited at max count");
    assert_eq!(window.count_in_window(now), 5);

    let future = now + chrono::Duration::seconds(61);
    assert!(
        !window.is_limited(future),
        "should not be limited after window expires"
    );
}

#[tokio::test]
async fn throttle_caps_job_starts() {
    let throttle = JobThrottle::new(3);
    for _ in 0..3 {
        assert!(throttle.try_acquire().await.is_ok());
    }
    let wait = throttle
        .try_acquire()
        .await
        .expect_err("fourth start should be throttled");
    assert!(wait <= std::time::Duration::from_secs(60));
}

// ── Backoff tests ────────────────────────────────────────────────────────────

#[test]
fn backoff_progression() {
    let cfg = BackoffConfig::default(); // base 2s, max 60s, x2

    let b0 = next_backoff(0, &cfg);
    let b3 = next_backoff(3, &cfg);
    let b20 = next_backoff(20, &cfg);

    assert!(b0.as_millis() > 0, "attempt 0 should have positive delay");
    assert!(
        b3.as_millis() > b0.as_millis(),
        "attempt 3 should be longer than attempt 0 (got {}ms vs {}ms)",
        b3.as_millis(),
        b0.as_millis()
    );

    let max_with_headroom = cfg.max_ms + (cfg.max_ms as f64 * cfg.jitter_fraction) as u64;
    assert!(
        b20.as_millis() as u64 <= max_with_headroom,
        "attempt 20 should not exceed max_ms+jitter ({}ms)",
        b20.as_millis()
    );
}

// ── Durable queue tests ──────────────────────────────────────────────────────

#[tokio::test]
async fn queue_survives_retry_cycle() {
    let storage = Storage::in_memory().await.unwrap();
    let job_id = storage
        .enqueue_job(
            Provider::GitHub,
            "octo",
            "repo",
            7,
            "abc123",
            None,
            "pr-700",
            "Add feature",
            "https://example.com/pr/7",
        )
        .await
        .unwrap();

    // First attempt claims the job exclusively.
    let row = storage.claim_due_job().await.unwrap().expect("job is due");
    assert_eq!(row.id, job_id);
    assert_eq!(row.attempts, 0);
    assert!(storage.claim_due_job().await.unwrap().is_none());

    // Attempt 1 fails; retry scheduled in the past so it is due immediately.
    let past = (Utc::now() - chrono::Duration::seconds(1)).to_rfc3339();
    storage
        .retry_job(&job_id, 1, &past, "transient provider failure")
        .await
        .unwrap();
    let row = storage.claim_due_job().await.unwrap().expect("retry is due");
    assert_eq!(row.attempts, 1);
    assert_eq!(row.last_error.as_deref(), Some("transient provider failure"));

    // Attempt 2 fails for good.
    storage.fail_job(&job_id, 2, "still broken").await.unwrap();
    assert!(storage.claim_due_job().await.unwrap().is_none());
    let row = storage.get_job(&job_id).await.unwrap().unwrap();
    assert_eq!(row.status, "failed");
}

#[tokio::test]
async fn backoff_deadline_defers_claims() {
    let storage = Storage::in_memory().await.unwrap();
    let job_id = storage
        .enqueue_job(
            Provider::Bitbucket,
            "ws",
            "repo",
            3,
            "fff",
            None,
            "ws/repo:pr:3",
            "t",
            "u",
        )
        .await
        .unwrap();
    let _ = storage.claim_due_job().await.unwrap().unwrap();

    let future = (Utc::now() + chrono::Duration::seconds(300)).to_rfc3339();
    storage.retry_job(&job_id, 1, &future, "rate limited").await.unwrap();
    assert!(
        storage.claim_due_job().await.unwrap().is_none(),
        "job with a future run_after must not be claimable"
    );
}

#[tokio::test]
async fn crash_recovery_requeues_running_jobs() {
    let storage = Storage::in_memory().await.unwrap();
    storage
        .enqueue_job(
            Provider::GitLab,
            "grp",
            "proj",
            4,
            "ca",
            None,
            "mr-4",
            "t",
            "u",
        )
        .await
        .unwrap();
    let row = storage.claim_due_job().await.unwrap().unwrap();

    // Simulated restart: the running job goes back to the queue and decodes
    // to the same payload.
    assert_eq!(storage.requeue_stale_running_jobs().await.unwrap(), 1);
    let replay = storage.claim_due_job().await.unwrap().unwrap();
    assert_eq!(replay.id, row.id);

    let job = AnalysisJob::from_row(&replay).unwrap();
    assert_eq!(job.provider, Provider::GitLab);
    assert_eq!(job.number, 4);
    assert_eq!(job.review_external_id, "mr-4");
}
