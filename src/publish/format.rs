// SPDX-License-Identifier: MIT
//! Markdown formatting for summary and inline review comments.

use crate::analysis::model::{FileAnalysis, Issue, IssueSource, Severity};

/// Critical/high issues listed in full in the summary before eliding.
const SUMMARY_TOP_ISSUES: usize = 10;

/// Build the one-per-run summary comment.
pub fn format_summary_comment(
    results: &[FileAnalysis],
    number: u64,
    gate_passed: bool,
) -> String {
    let total_files = results.len();
    let analyzed_files = results.len();
    let all_issues: Vec<&Issue> = results.iter().flat_map(|r| r.issues.iter()).collect();

    let critical = count(&all_issues, Severity::Critical);
    let high = count(&all_issues, Severity::High);
    let medium = count(&all_issues, Severity::Medium);
    let low = count(&all_issues, Severity::Low);

    let avg_score = if results.is_empty() {
        100.0
    } else {
        results.iter().map(|r| r.score as f64).sum::<f64>() / results.len() as f64
    };

    let mut comment = format!("## 🔍 Code Analysis Results for #{number}\n\n");

    if !gate_passed {
        comment.push_str("### ❌ Quality gate failed\n\n");
        if critical > 0 {
            comment.push_str("- **Critical issues** must be resolved before merge.\n");
        } else {
            comment.push_str("- **Minimum score** threshold not met.\n");
        }
        comment.push('\n');
    }

    comment.push_str(&format!(
        "{} **Quality Score: {}/100**\n\n",
        score_marker(avg_score),
        avg_score.round() as i64
    ));

    comment.push_str("### 📊 Summary\n\n");
    comment.push_str(&format!(
        "- **Files Analyzed:** {analyzed_files}/{total_files}\n"
    ));
    comment.push_str(&format!("- **Total Issues:** {}\n", all_issues.len()));
    comment.push_str(&format!(
        "- **Critical:** {critical} | **High:** {high} | **Medium:** {medium} | **Low:** {low}\n\n"
    ));

    if critical + high > 0 {
        comment.push_str("### ⚠️ Critical & High Priority Issues\n\n");
        let mut index = 1;
        for result in results {
            for issue in result
                .issues
                .iter()
                .filter(|i| matches!(i.severity, Severity::Critical | Severity::High))
            {
                if index > SUMMARY_TOP_ISSUES {
                    break;
                }
                comment.push_str(&format!(
                    "{index}. {} **{}**\n",
                    severity_badge(issue.severity),
                    issue.title
                ));
                let location = match issue.line {
                    Some(line) => format!("`{}` (line {line})", result.path),
                    None => format!("`{}`", result.path),
                };
                comment.push_str(&format!("   - File: {location}\n"));
                comment.push_str(&format!("   - {}\n", issue.description));
                if let Some(fix) = &issue.suggested_fix {
                    comment.push_str(&format!("   - 💡 **Fix:** {fix}\n"));
                }
                comment.push('\n');
                index += 1;
            }
        }
        let shown = (index - 1).min(SUMMARY_TOP_ISSUES);
        if critical + high > shown {
            comment.push_str(&format!(
                "*... and {} more critical/high issues*\n\n",
                critical + high - shown
            ));
        }
    }

    if all_issues.is_empty() {
        comment.push_str("### ✅ No Issues Found\n\n");
        comment.push_str("Great job! No security or quality issues detected.\n\n");
    }

    comment.push_str("---\n\n");
    comment.push_str("*This analysis was performed automatically by reviewd*\n");
    comment
}

/// Build one inline comment for a CRITICAL/HIGH issue.
pub fn format_inline_comment(issue: &Issue) -> String {
    let mut comment = format!("{} **{}**\n\n", severity_badge(issue.severity), issue.title);
    comment.push_str(&format!("{}\n\n", issue.description));

    if let Some(snippet) = &issue.code_snippet {
        comment.push_str(&format!("```\n{snippet}\n```\n\n"));
    }
    if let Some(fix) = &issue.suggested_fix {
        comment.push_str("### 💡 Suggested Fix\n\n");
        comment.push_str(&format!("{fix}\n\n"));
    }
    if let Some(cwe) = &issue.cwe_id {
        comment.push_str(&format!("**CWE:** {cwe}\n"));
    }
    if let Some(owasp) = &issue.owasp_category {
        comment.push_str(&format!("**OWASP:** {owasp}\n"));
    }

    comment.push_str("\n---\n");
    let source = match issue.source {
        IssueSource::RuleEngine => "Security Scanner",
        IssueSource::Ai => "AI Analysis",
    };
    comment.push_str(&format!("*Detected by {source}*\n"));
    comment
}

fn count(issues: &[&Issue], severity: Severity) -> usize {
    issues.iter().filter(|i| i.severity == severity).count()
}

fn score_marker(score: f64) -> &'static str {
    if score >= 90.0 {
        "🟢"
    } else if score >= 70.0 {
        "🟡"
    } else if score >= 50.0 {
        "🟠"
    } else {
        "🔴"
    }
}

fn severity_badge(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "🔴 **CRITICAL**",
        Severity::High => "🟠 **HIGH**",
        Severity::Medium => "🟡 **MEDIUM**",
        Severity::Low => "🟢 **LOW**",
        Severity::Info => "ℹ️ **INFO**",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::model::{Category, CodeStructure};

    fn analysis_with(issues: Vec<Issue>, score: u8) -> FileAnalysis {
        FileAnalysis {
            path: "src/app.js".to_string(),
            language: "javascript".to_string(),
            structure: CodeStructure::default(),
            issues,
            score,
            summary: String::new(),
            ai_ran: false,
        }
    }

    fn critical_issue() -> Issue {
        Issue {
            severity: Severity::Critical,
            category: Category::Security,
            title: "Hardcoded Password".to_string(),
            description: "Password is hardcoded in source code".to_string(),
            line: Some(5),
            column: None,
            code_snippet: Some("password = \"admin123\"".to_string()),
            suggested_fix: Some("Move password to environment variable".to_string()),
            cwe_id: Some("CWE-798".to_string()),
            owasp_category: None,
            rule_id: Some("hardcoded-password".to_string()),
            source: IssueSource::RuleEngine,
        }
    }

    #[test]
    fn summary_lists_critical_issues_with_location() {
        let comment =
            format_summary_comment(&[analysis_with(vec![critical_issue()], 80)], 42, true);
        assert!(comment.contains("Code Analysis Results for #42"));
        assert!(comment.contains("**Critical:** 1"));
        assert!(comment.contains("`src/app.js` (line 5)"));
        assert!(comment.contains("💡 **Fix:**"));
        assert!(!comment.contains("Quality gate failed"));
    }

    #[test]
    fn summary_announces_gate_failure() {
        let comment =
            format_summary_comment(&[analysis_with(vec![critical_issue()], 40)], 7, false);
        assert!(comment.contains("Quality gate failed"));
        assert!(comment.contains("Critical issues"));
    }

    #[test]
    fn clean_run_celebrates() {
        let comment = format_summary_comment(&[analysis_with(vec![], 100)], 1, true);
        assert!(comment.contains("No Issues Found"));
        assert!(comment.contains("100/100"));
    }

    #[test]
    fn inline_comment_carries_cwe_and_source() {
        let comment = format_inline_comment(&critical_issue());
        assert!(comment.contains("🔴 **CRITICAL**"));
        assert!(comment.contains("CWE-798"));
        assert!(comment.contains("Detected by Security Scanner"));
        assert!(comment.contains("```\npassword = \"admin123\"\n```"));
    }
}
