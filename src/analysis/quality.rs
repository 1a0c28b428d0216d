// SPDX-License-Identifier: MIT
//! Quality checks: code smells from the structural inventory, plus windowed
//! duplicate-block detection.

use std::collections::HashMap;

use tracing::debug;

use crate::analysis::model::{Category, CodeStructure, Issue, IssueSource, Severity};
use crate::policy::RepoPolicy;

/// A function with more parameters than this is flagged.
const MAX_PARAMS: usize = 4;
/// A function at or above this cyclomatic complexity is flagged.
const HIGH_COMPLEXITY: u32 = 15;
/// Duplicate issues reported per file are capped here.
const MAX_DUPLICATE_ISSUES: usize = 8;
/// Normalized windows shorter than this are too trivial to flag.
const MIN_NORMALIZED_LEN: usize = 20;

/// Code smells derived from the structural inventory: too many parameters
/// (LOW) and high cyclomatic complexity (MEDIUM).
pub fn analyze_smells(structure: &CodeStructure, path: &str) -> Vec<Issue> {
    let mut issues = Vec::new();

    for f in &structure.functions {
        if f.param_count > MAX_PARAMS {
            issues.push(Issue {
                severity: Severity::Low,
                category: Category::Maintainability,
                title: "Too many parameters".to_string(),
                description: format!(
                    "Function \"{}\" has {} parameters. Consider using an options object or breaking the function.",
                    f.name, f.param_count
                ),
                line: Some(f.line),
                column: None,
                code_snippet: None,
                suggested_fix: Some(
                    "Reduce parameters (e.g. use options object or split function)".to_string(),
                ),
                cwe_id: None,
                owasp_category: None,
                rule_id: Some("too-many-parameters".to_string()),
                source: IssueSource::RuleEngine,
            });
        }
        if f.complexity >= HIGH_COMPLEXITY {
            issues.push(Issue {
                severity: Severity::Medium,
                category: Category::Maintainability,
                title: "High cyclomatic complexity".to_string(),
                description: format!(
                    "Function \"{}\" has complexity {}. Consider simplifying or splitting.",
                    f.name, f.complexity
                ),
                line: Some(f.line),
                column: None,
                code_snippet: None,
                suggested_fix: Some(
                    "Extract branches into smaller functions or simplify conditionals".to_string(),
                ),
                cwe_id: None,
                owasp_category: None,
                rule_id: Some("high-complexity".to_string()),
                source: IssueSource::RuleEngine,
            });
        }
    }

    debug!(path, issues = issues.len(), "code smell analysis");
    issues
}

/// Duplicate-block detection: slide a window of `policy.duplication.min_lines`
/// lines over the file, normalize each window (trim, collapse whitespace,
/// drop blank lines), and report every normalized block occurring at two or
/// more distinct positions as one LOW issue anchored to the first occurrence.
///
/// Files matching a duplication ignore glob are skipped entirely by the
/// caller via [`RepoPolicy::is_duplication_ignored`].
pub fn analyze_duplicates(code: &str, policy: &RepoPolicy, path: &str) -> Vec<Issue> {
    if policy.is_duplication_ignored(path) {
        debug!(path, "duplication check skipped by ignore pattern");
        return Vec::new();
    }

    let block_size = policy.duplication.min_lines;
    let lines: Vec<&str> = code.lines().collect();
    if lines.len() < block_size {
        return Vec::new();
    }

    // normalized block -> 1-based start lines of each occurrence, in order.
    let mut occurrences: HashMap<String, Vec<u32>> = HashMap::new();
    let mut first_seen: Vec<String> = Vec::new();

    for start in 0..=(lines.len() - block_size) {
        let normalized: Vec<String> = lines[start..start + block_size]
            .iter()
            .map(|l| collapse_whitespace(l.trim()))
            .filter(|l| !l.is_empty())
            .collect();
        let key = normalized.join("\n");
        if key.len() < MIN_NORMALIZED_LEN {
            continue;
        }
        let entry = occurrences.entry(key.clone()).or_default();
        if entry.is_empty() {
            first_seen.push(key);
        }
        entry.push(start as u32 + 1);
    }

    let mut issues = Vec::new();
    for key in first_seen {
        let positions = &occurrences[&key];
        if positions.len() < 2 {
            continue;
        }
        if issues.len() >= MAX_DUPLICATE_ISSUES {
            debug!(path, cap = MAX_DUPLICATE_ISSUES, "duplicate issue cap reached");
            break;
        }
        let shown: Vec<String> = positions.iter().take(3).map(|l| l.to_string()).collect();
        issues.push(Issue {
            severity: Severity::Low,
            category: Category::Quality,
            title: "Duplicate code block".to_string(),
            description: format!(
                "Similar {}-line block appears {} times (e.g. lines {}). Consider extracting to a function.",
                block_size,
                positions.len(),
                shown.join(", ")
            ),
            line: Some(positions[0]),
            column: None,
            code_snippet: None,
            suggested_fix: Some(
                "Extract duplicated logic into a shared function or module".to_string(),
            ),
            cwe_id: None,
            owasp_category: None,
            rule_id: Some("duplicate-code-block".to_string()),
            source: IssueSource::RuleEngine,
        });
    }

    debug!(path, issues = issues.len(), "duplicate analysis");
    issues
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::model::FunctionInfo;
    use crate::policy::RepoPolicy;

    fn structure_with(functions: Vec<FunctionInfo>) -> CodeStructure {
        CodeStructure {
            functions,
            ..CodeStructure::default()
        }
    }

    #[test]
    fn flags_too_many_parameters() {
        let s = structure_with(vec![FunctionInfo {
            name: "wide".into(),
            line: 10,
            param_count: 5,
            complexity: 2,
        }]);
        let issues = analyze_smells(&s, "a.js");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Low);
        assert_eq!(issues[0].line, Some(10));
    }

    #[test]
    fn four_parameters_is_fine() {
        let s = structure_with(vec![FunctionInfo {
            name: "ok".into(),
            line: 1,
            param_count: 4,
            complexity: 14,
        }]);
        assert!(analyze_smells(&s, "a.js").is_empty());
    }

    #[test]
    fn flags_high_complexity_at_threshold() {
        let s = structure_with(vec![FunctionInfo {
            name: "gnarly".into(),
            line: 3,
            param_count: 1,
            complexity: 15,
        }]);
        let issues = analyze_smells(&s, "a.js");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Medium);
    }

    #[test]
    fn repeated_block_reported_once_at_first_occurrence() {
        let policy = RepoPolicy::default(); // min_lines = 8
        let block: Vec<String> = (0..8)
            .map(|i| format!("let value_{i} = compute_step({i}) + offset;"))
            .collect();
        let mut lines: Vec<String> = block.clone();
        // Separator long enough that windows spanning it don't also repeat.
        for i in 0..10 {
            lines.push(format!("console.log('separator {i}');"));
        }
        lines.extend(block);
        let code = lines.join("\n");

        let issues = analyze_duplicates(&code, &policy, "dup.js");
        let dups: Vec<_> = issues
            .iter()
            .filter(|i| i.title == "Duplicate code block")
            .collect();
        assert_eq!(dups.len(), 1, "exactly one duplicate issue expected");
        assert_eq!(dups[0].line, Some(1), "anchored to the first occurrence");
    }

    #[test]
    fn short_windows_are_not_flagged() {
        let policy = RepoPolicy::default();
        let code = "a\nb\nc\na\nb\nc\na\nb\nc\na\nb\nc\n";
        assert!(analyze_duplicates(code, &policy, "tiny.js").is_empty());
    }

    #[test]
    fn duplication_ignore_glob_skips_file() {
        let mut policy = RepoPolicy::default();
        policy.duplication.ignore_patterns = vec!["**/generated/**".to_string()];
        policy.rebuild_matchers();
        let block = "let a = 1;\nlet b = 2;\nlet c = 3;\nlet d = 4;\nlet e = 5;\nlet f = 6;\nlet g = 7;\nlet h = 8;\n";
        let code = format!("{block}\n// spacer one\n// spacer two\n// spacer three\n// spacer four\n// spacer five\n// spacer six\n// spacer seven\n// spacer eight\n{block}");
        assert!(!analyze_duplicates(&code, &policy, "src/app.js").is_empty());
        assert!(analyze_duplicates(&code, &policy, "src/generated/app.js").is_empty());
    }
}
