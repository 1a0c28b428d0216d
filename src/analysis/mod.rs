// SPDX-License-Identifier: MIT
//! Per-file analysis pipeline.
//!
//! Stage order per file: language detection → structural parse (JS/TS) →
//! security/pattern scan → quality/duplication scan → conditional AI
//! augmentation → issue fusion → per-file score. Any stage may contribute
//! zero issues; only language detection can exclude a file, and that happens
//! upstream. Files are processed in small concurrent batches to bound memory
//! and API pressure.

pub mod ai;
pub mod iac;
pub mod language;
pub mod model;
pub mod quality;
pub mod rules;
pub mod scan;
pub mod structure;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::analysis::ai::AiReviewer;
use crate::analysis::language::Language;
use crate::analysis::model::{CodeStructure, FileAnalysis, Issue, Severity};
use crate::policy::RepoPolicy;

/// Files analyzed concurrently within one job.
pub const FILE_BATCH_SIZE: usize = 5;

/// AI augmentation trigger: a file this long is "complex".
const COMPLEX_LINES: usize = 400;
/// AI augmentation trigger: this many functions make a file "complex".
const COMPLEX_FUNCTIONS: usize = 8;
/// AI augmentation trigger: a clean file this long still gets a second look.
const LARGE_LINES: usize = 300;

/// One fetched source file queued for analysis.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: String,
    pub code: String,
}

/// Analyze one file through every pipeline stage.
pub async fn analyze_file(
    ai: &AiReviewer,
    file: &SourceFile,
    policy: &RepoPolicy,
) -> FileAnalysis {
    let Some(lang) = language::detect_language(&file.path) else {
        // Unsupported files are filtered out upstream; an unknown path here
        // yields an empty result rather than a panic.
        return FileAnalysis {
            path: file.path.clone(),
            language: "unknown".to_string(),
            structure: CodeStructure::default(),
            issues: Vec::new(),
            score: 0,
            summary: "Language is not supported for analysis".to_string(),
            ai_ran: false,
        };
    };

    // 1. Structural parse (JS/TS only; empty structure on failure).
    let code_structure = structure::parse_structure(&file.code, lang, &file.path);

    // 2. Security scan + IaC checks — the "pattern" issue set that drives
    //    scoring and the AI trigger.
    let mut pattern_issues = scan::scan(&file.code, lang, &file.path);
    pattern_issues.extend(iac::analyze_iac(&file.code, lang));

    // 3. Quality: code smells + duplicate blocks.
    let mut quality_issues = quality::analyze_smells(&code_structure, &file.path);
    quality_issues.extend(quality::analyze_duplicates(&file.code, policy, &file.path));

    // 4. Conditional AI augmentation. The call is bounded to files where it
    //    can add signal: confirmed CRITICAL/HIGH findings, complex files, or
    //    large files the pattern scan came back clean on.
    let line_count = file.code.lines().count();
    let has_severe = pattern_issues
        .iter()
        .any(|i| matches!(i.severity, Severity::Critical | Severity::High));
    let is_complex =
        line_count > COMPLEX_LINES || code_structure.functions.len() > COMPLEX_FUNCTIONS;
    let is_large = line_count > LARGE_LINES;
    let should_augment =
        ai.enabled() && (has_severe || is_complex || (pattern_issues.is_empty() && is_large));

    debug!(
        path = file.path,
        lines = line_count,
        functions = code_structure.functions.len(),
        has_severe,
        is_complex,
        should_augment,
        "AI augmentation decision"
    );

    let mut ai_review = None;
    if should_augment {
        match ai
            .review(&file.code, &file.path, lang, &code_structure, &pattern_issues)
            .await
        {
            Ok(review) => ai_review = Some(review),
            Err(err) if err.is_quota() => {
                warn!(
                    path = file.path,
                    "AI review skipped, quota exceeded — continuing with pattern results"
                );
            }
            Err(err) => {
                warn!(path = file.path, error = %err, "AI review failed — continuing with pattern results");
            }
        }
    }

    // 5. Fusion + score.
    let (ai_weight, pattern_weight) = ai.blend_weights();
    let score = compute_score_weighted(
        &pattern_issues,
        ai_review.as_ref().map(|r| r.score),
        ai_weight,
        pattern_weight,
    );
    let summary = build_summary(&code_structure, &pattern_issues, ai_review.as_ref());
    let ai_ran = ai_review.is_some();
    let ai_issues = ai_review.map(|r| r.issues).unwrap_or_default();

    let mut rule_issues = pattern_issues;
    rule_issues.extend(quality_issues);
    let issues = fuse_issues(rule_issues, ai_issues);

    info!(
        path = file.path,
        language = lang.as_str(),
        issues = issues.len(),
        score,
        ai_ran,
        "file analysis complete"
    );

    FileAnalysis {
        path: file.path.clone(),
        language: lang.as_str().to_string(),
        structure: code_structure,
        issues,
        score,
        summary,
        ai_ran,
    }
}

/// Analyze a set of files with bounded parallelism.
pub async fn analyze_files(
    ai: &AiReviewer,
    files: &[SourceFile],
    policy: &RepoPolicy,
) -> Vec<FileAnalysis> {
    info!(files = files.len(), "starting multi-file analysis");
    let mut results = Vec::with_capacity(files.len());
    for batch in files.chunks(FILE_BATCH_SIZE) {
        let analyses = join_all(batch.iter().map(|f| analyze_file(ai, f, policy))).await;
        results.extend(analyses);
    }
    info!(files = files.len(), "multi-file analysis complete");
    results
}

/// Concatenate rule-engine and AI issues, dropping AI issues that duplicate
/// an existing issue on the same line with the same (case-insensitive)
/// title, then sort by severity rank. The sort is stable, so within one
/// severity the original stage order is preserved.
pub fn fuse_issues(rule_issues: Vec<Issue>, ai_issues: Vec<Issue>) -> Vec<Issue> {
    let mut combined = rule_issues;
    for ai_issue in ai_issues {
        let duplicate = combined.iter().any(|existing| {
            existing.line == ai_issue.line
                && existing.title.to_lowercase() == ai_issue.title.to_lowercase()
        });
        if !duplicate {
            combined.push(ai_issue);
        }
    }
    combined.sort_by_key(|i| i.severity.rank());
    combined
}

/// Per-file score: start at 100 and subtract per pattern security issue by
/// severity (CRITICAL 20, HIGH 10, MEDIUM 5, LOW 2). When the AI stage ran,
/// blend as `round(ai * 0.6 + pattern * 0.4)`. Clamped to 0..=100.
///
/// The 0.6/0.4 split matches the upstream behavior; it is exposed as a
/// tunable via the `[ai]` config section.
pub fn compute_score(pattern_issues: &[Issue], ai_score: Option<u8>) -> u8 {
    compute_score_weighted(pattern_issues, ai_score, 0.6, 0.4)
}

pub fn compute_score_weighted(
    pattern_issues: &[Issue],
    ai_score: Option<u8>,
    ai_weight: f64,
    pattern_weight: f64,
) -> u8 {
    let mut score: i64 = 100;
    for issue in pattern_issues {
        score -= match issue.severity {
            Severity::Critical => 20,
            Severity::High => 10,
            Severity::Medium => 5,
            Severity::Low => 2,
            Severity::Info => 0,
        };
    }

    let blended = match ai_score {
        Some(ai) => (ai as f64 * ai_weight + score as f64 * pattern_weight).round() as i64,
        None => score,
    };
    blended.clamp(0, 100) as u8
}

fn build_summary(
    code_structure: &CodeStructure,
    pattern_issues: &[Issue],
    ai_review: Option<&ai::AiReview>,
) -> String {
    let mut parts = vec![format!(
        "Found {} functions, {} classes",
        code_structure.functions.len(),
        code_structure.classes.len()
    )];

    if code_structure.complexity > 10 {
        parts.push(format!("High complexity ({})", code_structure.complexity));
    }

    if pattern_issues.is_empty() {
        parts.push("No security issues detected".to_string());
    } else {
        let critical = pattern_issues
            .iter()
            .filter(|i| i.severity == Severity::Critical)
            .count();
        let high = pattern_issues
            .iter()
            .filter(|i| i.severity == Severity::High)
            .count();
        if critical > 0 {
            parts.push(format!("{critical} CRITICAL security issues"));
        }
        if high > 0 {
            parts.push(format!("{high} HIGH security issues"));
        }
    }

    if let Some(review) = ai_review {
        if !review.summary.is_empty() {
            parts.push(review.summary.clone());
        }
    }

    let mut summary = parts.join(". ");
    summary.push('.');
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::model::{Category, IssueSource};

    fn issue(severity: Severity, title: &str, line: Option<u32>, source: IssueSource) -> Issue {
        Issue {
            severity,
            category: Category::Security,
            title: title.to_string(),
            description: String::new(),
            line,
            column: None,
            code_snippet: None,
            suggested_fix: None,
            cwe_id: None,
            owasp_category: None,
            rule_id: None,
            source,
        }
    }

    #[test]
    fn fusion_orders_by_severity() {
        let fused = fuse_issues(
            vec![
                issue(Severity::Low, "a", Some(1), IssueSource::RuleEngine),
                issue(Severity::Critical, "b", Some(2), IssueSource::RuleEngine),
            ],
            vec![issue(Severity::High, "c", Some(3), IssueSource::Ai)],
        );
        let ranks: Vec<u8> = fused.iter().map(|i| i.severity.rank()).collect();
        let mut sorted = ranks.clone();
        sorted.sort();
        assert_eq!(ranks, sorted);
        assert_eq!(fused[0].title, "b");
    }

    #[test]
    fn fusion_drops_ai_duplicates_case_insensitively() {
        let fused = fuse_issues(
            vec![issue(
                Severity::High,
                "Hardcoded Password",
                Some(5),
                IssueSource::RuleEngine,
            )],
            vec![
                issue(Severity::High, "HARDCODED PASSWORD", Some(5), IssueSource::Ai),
                issue(Severity::High, "Hardcoded Password", Some(9), IssueSource::Ai),
            ],
        );
        // Same line + same title is a duplicate; same title on another line is not.
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn score_subtracts_by_severity() {
        let issues = vec![
            issue(Severity::Critical, "a", None, IssueSource::RuleEngine),
            issue(Severity::High, "b", None, IssueSource::RuleEngine),
            issue(Severity::Medium, "c", None, IssueSource::RuleEngine),
            issue(Severity::Low, "d", None, IssueSource::RuleEngine),
        ];
        assert_eq!(compute_score(&issues, None), 100 - 20 - 10 - 5 - 2);
    }

    #[test]
    fn score_blends_when_ai_ran() {
        let issues = vec![issue(Severity::Critical, "a", None, IssueSource::RuleEngine)];
        // pattern = 80, ai = 90 → 90*0.6 + 80*0.4 = 86
        assert_eq!(compute_score(&issues, Some(90)), 86);
    }

    #[test]
    fn score_clamps_at_zero() {
        let issues: Vec<Issue> = (0..10)
            .map(|_| issue(Severity::Critical, "a", None, IssueSource::RuleEngine))
            .collect();
        assert_eq!(compute_score(&issues, None), 0);
    }
}
