// SPDX-License-Identifier: MIT
//! Data models for the analysis pipeline.
//!
//! All types are `Serialize`/`Deserialize` so they can be returned from the
//! REST API and stored in the `reviews` and `issues` SQLite tables.

use serde::{Deserialize, Serialize};

// ─── Severity ─────────────────────────────────────────────────────────────────

/// Issue severity, aligned across the rule engine and the AI reviewer.
///
/// Declaration order makes `Critical` compare greatest, so `a > b` means
/// "a is more severe than b".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Sort rank: CRITICAL < HIGH < MEDIUM < LOW < INFO (most severe first).
    pub fn rank(self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
            Severity::Info => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
            Severity::Info => "INFO",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "CRITICAL" => Some(Severity::Critical),
            "HIGH" => Some(Severity::High),
            "MEDIUM" => Some(Severity::Medium),
            "LOW" => Some(Severity::Low),
            "INFO" => Some(Severity::Info),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Category ─────────────────────────────────────────────────────────────────

/// Thematic grouping of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Security,
    Performance,
    Quality,
    BestPractice,
    Maintainability,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Security => "SECURITY",
            Category::Performance => "PERFORMANCE",
            Category::Quality => "QUALITY",
            Category::BestPractice => "BEST_PRACTICE",
            Category::Maintainability => "MAINTAINABILITY",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "SECURITY" => Some(Category::Security),
            "PERFORMANCE" => Some(Category::Performance),
            "QUALITY" => Some(Category::Quality),
            "BEST_PRACTICE" => Some(Category::BestPractice),
            "MAINTAINABILITY" => Some(Category::Maintainability),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Issue ────────────────────────────────────────────────────────────────────

/// Which stage produced an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSource {
    /// Pattern rules, quality checks, and IaC checks.
    RuleEngine,
    /// The external AI reviewer.
    Ai,
}

impl IssueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueSource::RuleEngine => "rule_engine",
            IssueSource::Ai => "ai",
        }
    }
}

/// A single finding against one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub category: Category,
    pub title: String,
    pub description: String,
    /// 1-based line number, when the finding is anchored to a line.
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub code_snippet: Option<String>,
    pub suggested_fix: Option<String>,
    /// CWE identifier, e.g. `"CWE-798"`.
    pub cwe_id: Option<String>,
    /// OWASP Top-10 category, e.g. `"A03:2021 – Injection"`.
    pub owasp_category: Option<String>,
    /// Stable rule id used for policy disable/severity overrides.
    pub rule_id: Option<String>,
    pub source: IssueSource,
}

impl Issue {
    /// Effective rule id for policy matching: the explicit id, or the
    /// slugified title when a stage did not assign one (AI issues).
    pub fn effective_rule_id(&self) -> String {
        match &self.rule_id {
            Some(id) => id.to_lowercase(),
            None => slugify(&self.title),
        }
    }
}

/// Lowercase, spaces to dashes, strip anything that is not `[a-z0-9-]`.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_whitespace() {
            out.push('-');
        } else {
            for lc in c.to_lowercase() {
                if lc.is_ascii_alphanumeric() || lc == '-' {
                    out.push(lc);
                }
            }
        }
    }
    out
}

// ─── Code structure ───────────────────────────────────────────────────────────

/// A function found by the structural parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub name: String,
    /// 1-based line of the declaration.
    pub line: u32,
    pub param_count: usize,
    /// Cyclomatic complexity: base 1, +1 per branch construct in the body.
    pub complexity: u32,
}

/// A class found by the structural parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassInfo {
    pub name: String,
    pub line: u32,
    pub method_count: usize,
}

/// Structural inventory of one file. Empty for languages without a parser
/// and for files that fail to parse — the pattern stages still run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeStructure {
    pub functions: Vec<FunctionInfo>,
    pub classes: Vec<ClassInfo>,
    pub import_count: usize,
    /// Sum of per-function complexities.
    pub complexity: u32,
}

// ─── Per-file result ──────────────────────────────────────────────────────────

/// Complete analysis result for a single changed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub path: String,
    pub language: String,
    pub structure: CodeStructure,
    /// Fused, severity-ordered issues (rule engine + AI, deduplicated).
    pub issues: Vec<Issue>,
    /// 0–100 score for this file.
    pub score: u8,
    pub summary: String,
    /// Whether the AI augmentation stage actually ran for this file.
    pub ai_ran: bool,
}

impl FileAnalysis {
    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::Low > Severity::Info);
    }

    #[test]
    fn severity_rank_is_most_severe_first() {
        assert!(Severity::Critical.rank() < Severity::High.rank());
        assert!(Severity::Info.rank() > Severity::Low.rank());
    }

    #[test]
    fn slugify_titles() {
        assert_eq!(slugify("Hardcoded Password"), "hardcoded-password");
        assert_eq!(slugify("Use of eval()"), "use-of-eval");
        assert_eq!(slugify("  Weak Hash (MD5) "), "weak-hash-md5");
    }

    #[test]
    fn severity_roundtrip() {
        for s in [
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
            Severity::Info,
        ] {
            assert_eq!(Severity::from_str(s.as_str()), Some(s));
        }
        assert_eq!(Severity::from_str("bogus"), None);
    }
}
