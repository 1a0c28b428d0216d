// SPDX-License-Identifier: MIT
//! Per-repository review policy, loaded from `.reviewd.yml` at the head
//! revision of the change request.
//!
//! `parse` always returns a usable policy: a missing or unparseable file
//! falls back to hard-coded defaults, and out-of-range values are clamped
//! away during sanitization. Policy is applied after issue fusion and before
//! persistence/publication — disabled categories and rules never reach the
//! stored issues or the posted comments.

use std::collections::HashMap;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::analysis::model::{Category, Issue, Severity};

/// Well-known path of the policy file inside a repository.
pub const POLICY_FILE_PATH: &str = ".reviewd.yml";

// ─── Sections ─────────────────────────────────────────────────────────────────

/// Category toggles. Anything not explicitly disabled stays enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CategoryToggles {
    pub security: bool,
    pub quality: bool,
    pub style: bool,
    pub performance: bool,
    pub best_practice: bool,
}

impl Default for CategoryToggles {
    fn default() -> Self {
        Self {
            security: true,
            quality: true,
            style: true,
            performance: true,
            best_practice: true,
        }
    }
}

/// Quality-gate thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QualityGate {
    /// Any CRITICAL issue fails the gate when set.
    pub block_on_critical: bool,
    /// Minimum average score (0–100). Unset means no score threshold.
    pub min_score: Option<u8>,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            block_on_critical: true,
            min_score: None,
        }
    }
}

/// Paths excluded from analysis entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreSection {
    pub paths: Vec<String>,
}

/// Duplicate-detection tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DuplicationSection {
    /// Sliding-window size in lines (clamped to 3..=20).
    pub min_lines: usize,
    /// Globs for paths that skip the duplication check.
    pub ignore_patterns: Vec<String>,
}

impl Default for DuplicationSection {
    fn default() -> Self {
        Self {
            min_lines: 8,
            ignore_patterns: Vec::new(),
        }
    }
}

/// Per-rule disables and severity overrides, keyed by rule id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RulesSection {
    pub disable: Vec<String>,
    pub severity_overrides: HashMap<String, String>,
}

// ─── Policy ───────────────────────────────────────────────────────────────────

/// The effective review policy for one repository at one revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RepoPolicy {
    pub categories: CategoryToggles,
    pub quality_gate: QualityGate,
    pub ignore: IgnoreSection,
    pub duplication: DuplicationSection,
    pub rules: RulesSection,

    #[serde(skip)]
    ignore_set: Option<GlobSet>,
    #[serde(skip)]
    dup_ignore_set: Option<GlobSet>,
}

impl Default for RepoPolicy {
    fn default() -> Self {
        let mut policy = Self {
            categories: CategoryToggles::default(),
            quality_gate: QualityGate::default(),
            ignore: IgnoreSection::default(),
            duplication: DuplicationSection::default(),
            rules: RulesSection::default(),
            ignore_set: None,
            dup_ignore_set: None,
        };
        policy.rebuild_matchers();
        policy
    }
}

impl RepoPolicy {
    /// Parse raw policy YAML. `None`, empty, or invalid input yields the
    /// default policy — this never fails.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };
        if raw.trim().is_empty() {
            return Self::default();
        }

        match serde_yaml::from_str::<RepoPolicy>(raw) {
            Ok(mut policy) => {
                policy.sanitize();
                policy.rebuild_matchers();
                policy
            }
            Err(err) => {
                warn!(error = %err, "failed to parse repository policy, using defaults");
                Self::default()
            }
        }
    }

    /// Clamp out-of-range values and drop invalid severity overrides.
    fn sanitize(&mut self) {
        if !(3..=20).contains(&self.duplication.min_lines) {
            self.duplication.min_lines = DuplicationSection::default().min_lines;
        }
        if let Some(score) = self.quality_gate.min_score {
            if score > 100 {
                self.quality_gate.min_score = None;
            }
        }
        self.rules
            .severity_overrides
            .retain(|_, v| Severity::from_str(v).is_some());
    }

    /// Recompile the glob matchers after mutating `ignore` or `duplication`.
    pub fn rebuild_matchers(&mut self) {
        self.ignore_set = build_globset(&self.ignore.paths);
        self.dup_ignore_set = build_globset(&self.duplication.ignore_patterns);
    }

    /// Whether a changed file is excluded from analysis.
    pub fn is_path_ignored(&self, path: &str) -> bool {
        matches_globs(&self.ignore_set, path)
    }

    /// Whether a file skips the duplicate-block check.
    pub fn is_duplication_ignored(&self, path: &str) -> bool {
        matches_globs(&self.dup_ignore_set, path)
    }

    /// Category toggle for an issue category. MAINTAINABILITY rides on the
    /// quality toggle.
    pub fn is_category_enabled(&self, category: Category) -> bool {
        match category {
            Category::Security => self.categories.security,
            Category::Performance => self.categories.performance,
            Category::Quality | Category::Maintainability => self.categories.quality,
            Category::BestPractice => self.categories.best_practice,
        }
    }

    /// Drop issues whose category is disabled.
    pub fn filter_by_category(&self, issues: Vec<Issue>) -> Vec<Issue> {
        issues
            .into_iter()
            .filter(|i| self.is_category_enabled(i.category))
            .collect()
    }

    /// Drop disabled rule ids and rewrite severities per overrides.
    /// Override keys match the rule id (case-insensitive) or the exact title.
    pub fn apply_rule_overrides(&self, issues: Vec<Issue>) -> Vec<Issue> {
        if self.rules.disable.is_empty() && self.rules.severity_overrides.is_empty() {
            return issues;
        }

        let disabled: Vec<String> = self
            .rules
            .disable
            .iter()
            .map(|s| s.to_lowercase())
            .collect();

        issues
            .into_iter()
            .filter(|issue| !disabled.contains(&issue.effective_rule_id()))
            .map(|mut issue| {
                let override_value = self
                    .rules
                    .severity_overrides
                    .get(&issue.effective_rule_id())
                    .or_else(|| self.rules.severity_overrides.get(&issue.title));
                if let Some(sev) = override_value.and_then(|v| Severity::from_str(v)) {
                    issue.severity = sev;
                }
                issue
            })
            .collect()
    }

    /// Deterministic quality-gate decision from aggregated (filtered) issue
    /// counts and the mean per-file score.
    pub fn gate_passed(&self, critical_count: usize, avg_score: f64) -> bool {
        if self.quality_gate.block_on_critical && critical_count > 0 {
            return false;
        }
        if let Some(min) = self.quality_gate.min_score {
            if avg_score < min as f64 {
                return false;
            }
        }
        true
    }
}

fn build_globset(patterns: &[String]) -> Option<GlobSet> {
    if patterns.is_empty() {
        return None;
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(err) => warn!(pattern, error = %err, "invalid ignore glob skipped"),
        }
    }
    builder.build().ok()
}

/// Match the full path, or — for basename-style patterns — the final path
/// component.
fn matches_globs(set: &Option<GlobSet>, path: &str) -> bool {
    let Some(set) = set else { return false };
    if set.is_match(path) {
        return true;
    }
    path.rsplit('/')
        .next()
        .map(|base| base != path && set.is_match(base))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::model::IssueSource;

    fn issue(rule_id: &str, severity: Severity, category: Category) -> Issue {
        Issue {
            severity,
            category,
            title: rule_id.replace('-', " "),
            description: String::new(),
            line: Some(1),
            column: None,
            code_snippet: None,
            suggested_fix: None,
            cwe_id: None,
            owasp_category: None,
            rule_id: Some(rule_id.to_string()),
            source: IssueSource::RuleEngine,
        }
    }

    #[test]
    fn missing_or_garbage_input_yields_defaults() {
        for raw in [None, Some(""), Some("   "), Some(": not yaml {{{")] {
            let policy = RepoPolicy::parse(raw);
            assert!(policy.categories.security);
            assert!(policy.quality_gate.block_on_critical);
            assert_eq!(policy.duplication.min_lines, 8);
        }
    }

    #[test]
    fn parses_full_policy_file() {
        let raw = r#"
categories:
  security: true
  quality: false
qualityGate:
  blockOnCritical: false
  minScore: 80
ignore:
  paths:
    - "vendor/**"
    - "*.min.js"
duplication:
  minLines: 5
  ignorePatterns:
    - "**/fixtures/**"
rules:
  disable:
    - insecure-http
  severityOverrides:
    hardcoded-password: HIGH
"#;
        let policy = RepoPolicy::parse(Some(raw));
        assert!(!policy.categories.quality);
        assert!(!policy.quality_gate.block_on_critical);
        assert_eq!(policy.quality_gate.min_score, Some(80));
        assert_eq!(policy.duplication.min_lines, 5);
        assert!(policy.is_path_ignored("vendor/lib/util.go"));
        assert!(policy.is_path_ignored("dist/app.min.js"));
        assert!(!policy.is_path_ignored("src/app.js"));
        assert!(policy.is_duplication_ignored("tests/fixtures/sample.js"));
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let raw = "duplication:\n  minLines: 50\nqualityGate:\n  minScore: 100\n";
        let policy = RepoPolicy::parse(Some(raw));
        assert_eq!(policy.duplication.min_lines, 8);
        assert_eq!(policy.quality_gate.min_score, Some(100));
    }

    #[test]
    fn category_filter_drops_disabled_categories() {
        let raw = "categories:\n  security: false\n";
        let policy = RepoPolicy::parse(Some(raw));
        let issues = vec![
            issue("a", Severity::Critical, Category::Security),
            issue("b", Severity::Low, Category::Quality),
        ];
        let kept = policy.filter_by_category(issues);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].rule_id.as_deref(), Some("b"));
    }

    #[test]
    fn maintainability_rides_on_quality_toggle() {
        let raw = "categories:\n  quality: false\n";
        let policy = RepoPolicy::parse(Some(raw));
        assert!(!policy.is_category_enabled(Category::Maintainability));
    }

    #[test]
    fn rule_disable_and_severity_override() {
        let raw = r#"
rules:
  disable:
    - Insecure-HTTP
  severityOverrides:
    hardcoded-password: MEDIUM
    bogus-rule: NOT_A_SEVERITY
"#;
        let policy = RepoPolicy::parse(Some(raw));
        let issues = vec![
            issue("insecure-http", Severity::Medium, Category::Security),
            issue("hardcoded-password", Severity::Critical, Category::Security),
        ];
        let kept = policy.apply_rule_overrides(issues);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].rule_id.as_deref(), Some("hardcoded-password"));
        assert_eq!(kept[0].severity, Severity::Medium);
    }

    #[test]
    fn gate_determinism() {
        let mut policy = RepoPolicy::default();
        policy.quality_gate.block_on_critical = true;
        assert!(!policy.gate_passed(1, 100.0));
        assert!(policy.gate_passed(0, 0.0));

        policy.quality_gate.block_on_critical = false;
        policy.quality_gate.min_score = Some(80);
        assert!(!policy.gate_passed(1, 79.0));
        assert!(policy.gate_passed(1, 80.0));
    }
}
