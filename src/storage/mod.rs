// SPDX-License-Identifier: MIT
//! SQLite persistence for installations, repositories, reviews, issues, the
//! durable job queue, and posted-comment references.
//!
//! All cross-job state lives here; workers share nothing in-process. The
//! review `external_id` upsert is the sole synchronization primitive —
//! concurrent duplicate deliveries of one event converge to one row.

use anyhow::Result;
use chrono::Utc;
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use std::{path::Path, str::FromStr};
use uuid::Uuid;

use crate::analysis::model::Issue;
use crate::error::ReviewdError;
use crate::maintainability::IssueCounts;
use crate::provider::Provider;

/// Default timeout for individual SQLite queries.
/// Prevents hung queries from blocking a worker slot indefinitely.
const QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Execute a future with the standard query timeout.
async fn with_timeout<T>(
    fut: impl std::future::Future<Output = Result<T, ReviewdError>>,
) -> Result<T, ReviewdError> {
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(ReviewdError::Persistence(format!(
            "database query timed out after {}s",
            QUERY_TIMEOUT.as_secs()
        ))),
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

// ─── Rows ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InstallationRow {
    pub id: String,
    pub provider: String,
    pub account_login: String,
    pub account_id: String,
    /// Provider API token for this installation. Empty means "use the
    /// daemon-level fallback token from config".
    pub token: String,
    pub base_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RepositoryRow {
    pub id: String,
    pub installation_id: String,
    pub provider: String,
    pub external_id: String,
    pub name: String,
    pub full_name: String,
    pub default_branch: String,
    pub private: bool,
    pub enabled: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct ReviewRow {
    pub id: String,
    pub repository_id: String,
    pub provider: String,
    /// Natural dedupe key: the provider-global change-request id.
    pub external_id: String,
    pub number: i64,
    pub title: String,
    pub url: String,
    pub state: String,
    pub head_sha: String,
    /// pending → processing → completed | failed (monotonic per run).
    pub status: String,
    pub score: Option<i64>,
    pub critical_count: i64,
    pub high_count: i64,
    pub medium_count: i64,
    pub low_count: i64,
    pub info_count: i64,
    pub gate_passed: Option<bool>,
    pub grade: Option<String>,
    pub remediation_minutes: Option<i64>,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct IssueRow {
    pub id: String,
    pub review_id: String,
    /// Groups the issues of one analysis run; a re-run replaces the set.
    pub run_id: String,
    pub file_path: String,
    pub line: Option<i64>,
    pub column_no: Option<i64>,
    pub severity: String,
    pub category: String,
    pub title: String,
    pub description: String,
    pub code_snippet: Option<String>,
    pub suggested_fix: Option<String>,
    pub cwe_id: Option<String>,
    pub owasp_category: Option<String>,
    pub rule_id: Option<String>,
    pub source: String,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRow {
    pub id: String,
    pub provider: String,
    pub owner: String,
    pub repo: String,
    pub number: i64,
    pub head_sha: String,
    /// Compare base for branch-push jobs (`number = 0`).
    pub base_sha: Option<String>,
    pub review_external_id: String,
    pub title: String,
    pub url: String,
    /// queued → running → done | failed (queued again on retry).
    pub status: String,
    pub attempts: i64,
    pub run_after: String,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReviewCommentRow {
    pub id: String,
    pub review_id: String,
    pub provider_comment_id: String,
    pub file_path: String,
    pub line: Option<i64>,
    pub body: String,
    pub created_at: String,
}

/// Everything the publisher persists for one completed run.
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub score: u8,
    pub counts: IssueCounts,
    pub gate_passed: bool,
    pub grade: String,
    pub remediation_minutes: u64,
}

// ─── Storage ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("reviewd.db");
        let opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true);
        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory storage for tests. Pinned to one connection — every pooled
    /// `:memory:` connection would otherwise be its own empty database.
    pub async fn in_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        // raw_sql runs the whole multi-statement schema script.
        sqlx::raw_sql(SCHEMA).execute(pool).await?;
        Ok(())
    }

    /// Liveness probe for the health endpoint.
    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    // ─── Installations ───────────────────────────────────────────────────────

    pub async fn upsert_installation(
        &self,
        provider: Provider,
        account_id: &str,
        account_login: &str,
        token: Option<&str>,
    ) -> Result<InstallationRow, ReviewdError> {
        let ts = now();
        let id = Uuid::new_v4().to_string();
        with_timeout(async {
            sqlx::query(
                r#"INSERT INTO installations (id, provider, account_login, account_id, token, created_at, updated_at)
                   VALUES (?, ?, ?, ?, COALESCE(?, ''), ?, ?)
                   ON CONFLICT(provider, account_id) DO UPDATE SET
                     account_login = excluded.account_login,
                     token = CASE WHEN excluded.token != '' THEN excluded.token ELSE installations.token END,
                     updated_at = excluded.updated_at"#,
            )
            .bind(&id)
            .bind(provider.as_str())
            .bind(account_login)
            .bind(account_id)
            .bind(token)
            .bind(&ts)
            .bind(&ts)
            .execute(&self.pool)
            .await?;

            let row = sqlx::query_as::<_, InstallationRow>(
                "SELECT * FROM installations WHERE provider = ? AND account_id = ?",
            )
            .bind(provider.as_str())
            .bind(account_id)
            .fetch_one(&self.pool)
            .await?;
            Ok(row)
        })
        .await
    }

    pub async fn get_installation(
        &self,
        installation_id: &str,
    ) -> Result<Option<InstallationRow>, ReviewdError> {
        with_timeout(async {
            let row = sqlx::query_as::<_, InstallationRow>(
                "SELECT * FROM installations WHERE id = ?",
            )
            .bind(installation_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        })
        .await
    }

    pub async fn delete_installation(
        &self,
        provider: Provider,
        account_id: &str,
    ) -> Result<(), ReviewdError> {
        with_timeout(async {
            sqlx::query("DELETE FROM installations WHERE provider = ? AND account_id = ?")
                .bind(provider.as_str())
                .bind(account_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    // ─── Repositories ────────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_repository(
        &self,
        installation_id: &str,
        provider: Provider,
        external_id: &str,
        name: &str,
        full_name: &str,
        default_branch: &str,
        private: bool,
    ) -> Result<RepositoryRow, ReviewdError> {
        let ts = now();
        let id = Uuid::new_v4().to_string();
        with_timeout(async {
            sqlx::query(
                r#"INSERT INTO repositories
                     (id, installation_id, provider, external_id, name, full_name, default_branch, private, created_at, updated_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                   ON CONFLICT(provider, external_id) DO UPDATE SET
                     installation_id = excluded.installation_id,
                     name = excluded.name,
                     full_name = excluded.full_name,
                     default_branch = excluded.default_branch,
                     private = excluded.private,
                     updated_at = excluded.updated_at"#,
            )
            .bind(&id)
            .bind(installation_id)
            .bind(provider.as_str())
            .bind(external_id)
            .bind(name)
            .bind(full_name)
            .bind(default_branch)
            .bind(private)
            .bind(&ts)
            .bind(&ts)
            .execute(&self.pool)
            .await?;

            let row = sqlx::query_as::<_, RepositoryRow>(
                "SELECT * FROM repositories WHERE provider = ? AND external_id = ?",
            )
            .bind(provider.as_str())
            .bind(external_id)
            .fetch_one(&self.pool)
            .await?;
            Ok(row)
        })
        .await
    }

    pub async fn find_repository(
        &self,
        provider: Provider,
        full_name: &str,
    ) -> Result<Option<RepositoryRow>, ReviewdError> {
        with_timeout(async {
            let row = sqlx::query_as::<_, RepositoryRow>(
                "SELECT * FROM repositories WHERE provider = ? AND full_name = ? AND enabled = 1",
            )
            .bind(provider.as_str())
            .bind(full_name)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        })
        .await
    }

    // ─── Reviews ─────────────────────────────────────────────────────────────

    /// Create or refresh a review for a change request. The `external_id`
    /// unique constraint makes duplicate deliveries converge on one row;
    /// a new revision resets the row to `pending` for the next run.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_review(
        &self,
        repository_id: &str,
        provider: Provider,
        external_id: &str,
        number: u64,
        title: &str,
        url: &str,
        state: &str,
        head_sha: &str,
    ) -> Result<ReviewRow, ReviewdError> {
        let ts = now();
        let id = Uuid::new_v4().to_string();
        with_timeout(async {
            sqlx::query(
                r#"INSERT INTO reviews
                     (id, repository_id, provider, external_id, number, title, url, state, head_sha, status, created_at, updated_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?)
                   ON CONFLICT(external_id) DO UPDATE SET
                     title = excluded.title,
                     url = excluded.url,
                     state = excluded.state,
                     head_sha = excluded.head_sha,
                     status = 'pending',
                     error = NULL,
                     updated_at = excluded.updated_at"#,
            )
            .bind(&id)
            .bind(repository_id)
            .bind(provider.as_str())
            .bind(external_id)
            .bind(number as i64)
            .bind(title)
            .bind(url)
            .bind(state)
            .bind(head_sha)
            .bind(&ts)
            .bind(&ts)
            .execute(&self.pool)
            .await?;

            let row = sqlx::query_as::<_, ReviewRow>(
                "SELECT * FROM reviews WHERE external_id = ?",
            )
            .bind(external_id)
            .fetch_one(&self.pool)
            .await?;
            Ok(row)
        })
        .await
    }

    pub async fn get_review(&self, external_id: &str) -> Result<Option<ReviewRow>, ReviewdError> {
        with_timeout(async {
            let row =
                sqlx::query_as::<_, ReviewRow>("SELECT * FROM reviews WHERE external_id = ?")
                    .bind(external_id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        })
        .await
    }

    /// pending → processing. Guarded so a duplicate pickup is a no-op.
    pub async fn mark_review_processing(&self, external_id: &str) -> Result<(), ReviewdError> {
        with_timeout(async {
            sqlx::query(
                "UPDATE reviews SET status = 'processing', updated_at = ? WHERE external_id = ? AND status = 'pending'",
            )
            .bind(now())
            .bind(external_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    /// Terminal failure. Never demotes a completed review.
    pub async fn mark_review_failed(
        &self,
        external_id: &str,
        error: &str,
    ) -> Result<(), ReviewdError> {
        with_timeout(async {
            sqlx::query(
                r#"UPDATE reviews SET status = 'failed', error = ?, updated_at = ?
                   WHERE external_id = ? AND status IN ('pending', 'processing')"#,
            )
            .bind(error)
            .bind(now())
            .bind(external_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    /// Terminal success: set the aggregate outcome and replace the issue set
    /// for this run, atomically. Re-running a job converges to the same state.
    pub async fn complete_review(
        &self,
        review_id: &str,
        outcome: &ReviewOutcome,
        issues: &[(String, Issue)],
    ) -> Result<String, ReviewdError> {
        let ts = now();
        let run_id = Uuid::new_v4().to_string();
        with_timeout(async {
            let mut tx = self.pool.begin().await.map_err(ReviewdError::from)?;

            sqlx::query(
                r#"UPDATE reviews SET
                     status = 'completed',
                     score = ?,
                     critical_count = ?, high_count = ?, medium_count = ?, low_count = ?, info_count = ?,
                     gate_passed = ?, grade = ?, remediation_minutes = ?,
                     error = NULL, updated_at = ?, completed_at = ?
                   WHERE id = ? AND status IN ('pending', 'processing')"#,
            )
            .bind(outcome.score as i64)
            .bind(outcome.counts.critical as i64)
            .bind(outcome.counts.high as i64)
            .bind(outcome.counts.medium as i64)
            .bind(outcome.counts.low as i64)
            .bind(outcome.counts.info as i64)
            .bind(outcome.gate_passed)
            .bind(&outcome.grade)
            .bind(outcome.remediation_minutes as i64)
            .bind(&ts)
            .bind(&ts)
            .bind(review_id)
            .execute(&mut *tx)
            .await?;

            // Issues reflect the latest run only; a re-run replaces them.
            sqlx::query("DELETE FROM issues WHERE review_id = ?")
                .bind(review_id)
                .execute(&mut *tx)
                .await?;

            for (file_path, issue) in issues {
                sqlx::query(
                    r#"INSERT INTO issues
                         (id, review_id, run_id, file_path, line, column_no, severity, category,
                          title, description, code_snippet, suggested_fix, cwe_id, owasp_category,
                          rule_id, source, created_at)
                       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
                )
                .bind(Uuid::new_v4().to_string())
                .bind(review_id)
                .bind(&run_id)
                .bind(file_path)
                .bind(issue.line.map(|l| l as i64))
                .bind(issue.column.map(|c| c as i64))
                .bind(issue.severity.as_str())
                .bind(issue.category.as_str())
                .bind(&issue.title)
                .bind(&issue.description)
                .bind(&issue.code_snippet)
                .bind(&issue.suggested_fix)
                .bind(&issue.cwe_id)
                .bind(&issue.owasp_category)
                .bind(&issue.rule_id)
                .bind(issue.source.as_str())
                .bind(&ts)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await.map_err(ReviewdError::from)?;
            Ok(run_id)
        })
        .await
    }

    pub async fn list_issues(&self, review_id: &str) -> Result<Vec<IssueRow>, ReviewdError> {
        with_timeout(async {
            let rows = sqlx::query_as::<_, IssueRow>(
                r#"SELECT * FROM issues WHERE review_id = ?
                   ORDER BY CASE severity
                     WHEN 'CRITICAL' THEN 0 WHEN 'HIGH' THEN 1 WHEN 'MEDIUM' THEN 2
                     WHEN 'LOW' THEN 3 ELSE 4 END, file_path, line"#,
            )
            .bind(review_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        })
        .await
    }

    // ─── Posted comments ─────────────────────────────────────────────────────

    pub async fn insert_comment_ref(
        &self,
        review_id: &str,
        provider_comment_id: &str,
        file_path: &str,
        line: Option<u32>,
        body: &str,
    ) -> Result<(), ReviewdError> {
        with_timeout(async {
            sqlx::query(
                r#"INSERT INTO review_comments (id, review_id, provider_comment_id, file_path, line, body, created_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(review_id)
            .bind(provider_comment_id)
            .bind(file_path)
            .bind(line.map(|l| l as i64))
            .bind(body)
            .bind(now())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    // ─── Job queue ───────────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub async fn enqueue_job(
        &self,
        provider: Provider,
        owner: &str,
        repo: &str,
        number: u64,
        head_sha: &str,
        base_sha: Option<&str>,
        review_external_id: &str,
        title: &str,
        url: &str,
    ) -> Result<String, ReviewdError> {
        let ts = now();
        let id = Uuid::new_v4().to_string();
        with_timeout(async {
            sqlx::query(
                r#"INSERT INTO jobs
                     (id, provider, owner, repo, number, head_sha, base_sha, review_external_id, title, url,
                      status, attempts, run_after, created_at, updated_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'queued', 0, ?, ?, ?)"#,
            )
            .bind(&id)
            .bind(provider.as_str())
            .bind(owner)
            .bind(repo)
            .bind(number as i64)
            .bind(head_sha)
            .bind(base_sha)
            .bind(review_external_id)
            .bind(title)
            .bind(url)
            .bind(&ts)
            .bind(&ts)
            .bind(&ts)
            .execute(&self.pool)
            .await?;
            Ok(id)
        })
        .await
    }

    /// Claim the oldest due queued job, if any. The `status = 'queued'`
    /// guard on the UPDATE makes the claim atomic across workers.
    pub async fn claim_due_job(&self) -> Result<Option<JobRow>, ReviewdError> {
        with_timeout(async {
            loop {
                let candidate = sqlx::query_as::<_, JobRow>(
                    r#"SELECT * FROM jobs
                       WHERE status = 'queued' AND run_after <= ?
                       ORDER BY created_at LIMIT 1"#,
                )
                .bind(now())
                .fetch_optional(&self.pool)
                .await?;

                let Some(job) = candidate else {
                    return Ok(None);
                };

                let claimed = sqlx::query(
                    "UPDATE jobs SET status = 'running', updated_at = ? WHERE id = ? AND status = 'queued'",
                )
                .bind(now())
                .bind(&job.id)
                .execute(&self.pool)
                .await?;

                if claimed.rows_affected() == 1 {
                    return Ok(Some(job));
                }
                // Lost the race to another worker; look again.
            }
        })
        .await
    }

    pub async fn complete_job(&self, job_id: &str) -> Result<(), ReviewdError> {
        with_timeout(async {
            sqlx::query("UPDATE jobs SET status = 'done', updated_at = ? WHERE id = ?")
                .bind(now())
                .bind(job_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    /// Requeue a failed attempt with a backoff deadline.
    pub async fn retry_job(
        &self,
        job_id: &str,
        attempts: u32,
        run_after: &str,
        error: &str,
    ) -> Result<(), ReviewdError> {
        with_timeout(async {
            sqlx::query(
                r#"UPDATE jobs SET status = 'queued', attempts = ?, run_after = ?, last_error = ?, updated_at = ?
                   WHERE id = ?"#,
            )
            .bind(attempts as i64)
            .bind(run_after)
            .bind(error)
            .bind(now())
            .bind(job_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    pub async fn fail_job(&self, job_id: &str, attempts: u32, error: &str) -> Result<(), ReviewdError> {
        with_timeout(async {
            sqlx::query(
                "UPDATE jobs SET status = 'failed', attempts = ?, last_error = ?, updated_at = ? WHERE id = ?",
            )
            .bind(attempts as i64)
            .bind(error)
            .bind(now())
            .bind(job_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    /// Crash recovery: jobs left `running` by a dead process go back to the
    /// queue on startup. Idempotent processing makes the replay safe.
    pub async fn requeue_stale_running_jobs(&self) -> Result<u64, ReviewdError> {
        with_timeout(async {
            let result = sqlx::query(
                "UPDATE jobs SET status = 'queued', updated_at = ? WHERE status = 'running'",
            )
            .bind(now())
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        })
        .await
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<JobRow>, ReviewdError> {
        with_timeout(async {
            let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        })
        .await
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS installations (
  id TEXT PRIMARY KEY,
  provider TEXT NOT NULL,
  account_login TEXT NOT NULL,
  account_id TEXT NOT NULL,
  token TEXT NOT NULL DEFAULT '',
  base_url TEXT,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  UNIQUE(provider, account_id)
);

CREATE TABLE IF NOT EXISTS repositories (
  id TEXT PRIMARY KEY,
  installation_id TEXT NOT NULL,
  provider TEXT NOT NULL,
  external_id TEXT NOT NULL,
  name TEXT NOT NULL,
  full_name TEXT NOT NULL,
  default_branch TEXT NOT NULL DEFAULT 'main',
  private INTEGER NOT NULL DEFAULT 0,
  enabled INTEGER NOT NULL DEFAULT 1,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  UNIQUE(provider, external_id)
);

CREATE TABLE IF NOT EXISTS reviews (
  id TEXT PRIMARY KEY,
  repository_id TEXT NOT NULL,
  provider TEXT NOT NULL,
  external_id TEXT NOT NULL UNIQUE,
  number INTEGER NOT NULL,
  title TEXT NOT NULL DEFAULT '',
  url TEXT NOT NULL DEFAULT '',
  state TEXT NOT NULL DEFAULT '',
  head_sha TEXT NOT NULL DEFAULT '',
  status TEXT NOT NULL DEFAULT 'pending',
  score INTEGER,
  critical_count INTEGER NOT NULL DEFAULT 0,
  high_count INTEGER NOT NULL DEFAULT 0,
  medium_count INTEGER NOT NULL DEFAULT 0,
  low_count INTEGER NOT NULL DEFAULT 0,
  info_count INTEGER NOT NULL DEFAULT 0,
  gate_passed INTEGER,
  grade TEXT,
  remediation_minutes INTEGER,
  error TEXT,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  completed_at TEXT
);

CREATE TABLE IF NOT EXISTS issues (
  id TEXT PRIMARY KEY,
  review_id TEXT NOT NULL,
  run_id TEXT NOT NULL,
  file_path TEXT NOT NULL,
  line INTEGER,
  column_no INTEGER,
  severity TEXT NOT NULL,
  category TEXT NOT NULL,
  title TEXT NOT NULL,
  description TEXT NOT NULL DEFAULT '',
  code_snippet TEXT,
  suggested_fix TEXT,
  cwe_id TEXT,
  owasp_category TEXT,
  rule_id TEXT,
  source TEXT NOT NULL,
  created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_issues_review ON issues(review_id);

CREATE TABLE IF NOT EXISTS jobs (
  id TEXT PRIMARY KEY,
  provider TEXT NOT NULL,
  owner TEXT NOT NULL,
  repo TEXT NOT NULL,
  number INTEGER NOT NULL,
  head_sha TEXT NOT NULL DEFAULT '',
  base_sha TEXT,
  review_external_id TEXT NOT NULL,
  title TEXT NOT NULL DEFAULT '',
  url TEXT NOT NULL DEFAULT '',
  status TEXT NOT NULL DEFAULT 'queued',
  attempts INTEGER NOT NULL DEFAULT 0,
  run_after TEXT NOT NULL,
  last_error TEXT,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_jobs_due ON jobs(status, run_after);

CREATE TABLE IF NOT EXISTS review_comments (
  id TEXT PRIMARY KEY,
  review_id TEXT NOT NULL,
  provider_comment_id TEXT NOT NULL,
  file_path TEXT NOT NULL,
  line INTEGER,
  body TEXT NOT NULL,
  created_at TEXT NOT NULL
);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::model::{Category, IssueSource, Severity};

    async fn seeded_review(storage: &Storage) -> ReviewRow {
        let installation = storage
            .upsert_installation(Provider::GitHub, "42", "octo", Some("tok"))
            .await
            .unwrap();
        let repo = storage
            .upsert_repository(
                &installation.id,
                Provider::GitHub,
                "7",
                "repo",
                "octo/repo",
                "main",
                false,
            )
            .await
            .unwrap();
        storage
            .upsert_review(
                &repo.id,
                Provider::GitHub,
                "pr-100",
                3,
                "Add feature",
                "https://example.com/pr/3",
                "open",
                "abc123",
            )
            .await
            .unwrap()
    }

    fn sample_issue() -> Issue {
        Issue {
            severity: Severity::Critical,
            category: Category::Security,
            title: "Hardcoded Password".into(),
            description: "bad".into(),
            line: Some(5),
            column: None,
            code_snippet: None,
            suggested_fix: None,
            cwe_id: Some("CWE-798".into()),
            owasp_category: None,
            rule_id: Some("hardcoded-password".into()),
            source: IssueSource::RuleEngine,
        }
    }

    #[tokio::test]
    async fn review_upsert_is_idempotent() {
        let storage = Storage::in_memory().await.unwrap();
        let first = seeded_review(&storage).await;
        let second = seeded_review(&storage).await;
        assert_eq!(first.id, second.id, "same external id must reuse the row");
    }

    #[tokio::test]
    async fn status_transitions_are_monotonic() {
        let storage = Storage::in_memory().await.unwrap();
        let review = seeded_review(&storage).await;

        storage.mark_review_processing(&review.external_id).await.unwrap();
        let outcome = ReviewOutcome {
            score: 80,
            counts: IssueCounts::default(),
            gate_passed: true,
            grade: "A".into(),
            remediation_minutes: 0,
        };
        storage
            .complete_review(&review.id, &outcome, &[])
            .await
            .unwrap();

        // A late failure must not demote the completed review.
        storage
            .mark_review_failed(&review.external_id, "late error")
            .await
            .unwrap();
        let row = storage.get_review(&review.external_id).await.unwrap().unwrap();
        assert_eq!(row.status, "completed");
        assert_eq!(row.score, Some(80));
    }

    #[tokio::test]
    async fn rerun_replaces_issues() {
        let storage = Storage::in_memory().await.unwrap();
        let review = seeded_review(&storage).await;
        let outcome = ReviewOutcome {
            score: 60,
            counts: IssueCounts { critical: 1, ..Default::default() },
            gate_passed: false,
            grade: "B".into(),
            remediation_minutes: 60,
        };

        storage.mark_review_processing(&review.external_id).await.unwrap();
        storage
            .complete_review(
                &review.id,
                &outcome,
                &[("a.js".to_string(), sample_issue()), ("b.js".to_string(), sample_issue())],
            )
            .await
            .unwrap();
        assert_eq!(storage.list_issues(&review.id).await.unwrap().len(), 2);

        // New run on the same review: the issue set is replaced, not appended.
        let review = seeded_review(&storage).await;
        storage.mark_review_processing(&review.external_id).await.unwrap();
        storage
            .complete_review(
                &review.id,
                &outcome,
                &[("a.js".to_string(), sample_issue())],
            )
            .await
            .unwrap();
        assert_eq!(storage.list_issues(&review.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn job_claim_is_exclusive_and_retryable() {
        let storage = Storage::in_memory().await.unwrap();
        let job_id = storage
            .enqueue_job(Provider::GitLab, "grp", "proj", 9, "sha9", None, "mr-9", "t", "u")
            .await
            .unwrap();

        let claimed = storage.claim_due_job().await.unwrap().unwrap();
        assert_eq!(claimed.id, job_id);
        // Already running — nothing left to claim.
        assert!(storage.claim_due_job().await.unwrap().is_none());

        // Retry in the future: not due yet.
        let future = (Utc::now() + chrono::Duration::seconds(3600)).to_rfc3339();
        storage.retry_job(&job_id, 1, &future, "boom").await.unwrap();
        assert!(storage.claim_due_job().await.unwrap().is_none());

        // Retry in the past: due again.
        let past = (Utc::now() - chrono::Duration::seconds(1)).to_rfc3339();
        storage.retry_job(&job_id, 2, &past, "boom").await.unwrap();
        let reclaimed = storage.claim_due_job().await.unwrap().unwrap();
        assert_eq!(reclaimed.attempts, 2);
    }

    #[tokio::test]
    async fn stale_running_jobs_are_requeued() {
        let storage = Storage::in_memory().await.unwrap();
        storage
            .enqueue_job(Provider::GitHub, "o", "r", 1, "s", None, "pr-1", "t", "u")
            .await
            .unwrap();
        let _ = storage.claim_due_job().await.unwrap().unwrap();
        assert_eq!(storage.requeue_stale_running_jobs().await.unwrap(), 1);
        assert!(storage.claim_due_job().await.unwrap().is_some());
    }
}
