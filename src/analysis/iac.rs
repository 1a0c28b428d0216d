// SPDX-License-Identifier: MIT
//! Infrastructure-as-code textual checks for Terraform and Dockerfile.
//!
//! These languages never get a structural parse; a handful of high-signal
//! line checks runs instead, feeding the same per-file issue stream.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::analysis::language::Language;
use crate::analysis::model::{Category, Issue, IssueSource, Severity};

static TF_SECRET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)(password|secret)\s*=\s*["'][^"']+["']"#).expect("tf secret regex"));
static TF_PUBLIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)allow_public_access\s*=\s*true").expect("tf public regex"));
static DOCKER_USER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^USER\s+").expect("docker user regex"));
static DOCKER_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^RUN\s").expect("docker run regex"));
static DOCKER_EXPOSE_SSH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^EXPOSE\s+22\b").expect("docker expose regex"));
static DOCKER_CURL_SH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)RUN\s+.*\bcurl\s+.*\|\s*sh\b").expect("docker curl regex"));

/// Run the IaC checks appropriate for `language`; empty for anything that is
/// not Terraform or a Dockerfile.
pub fn analyze_iac(code: &str, language: Language) -> Vec<Issue> {
    match language {
        Language::Terraform => analyze_terraform(code),
        Language::Dockerfile => analyze_dockerfile(code),
        _ => Vec::new(),
    }
}

fn iac_issue(
    severity: Severity,
    rule_id: &str,
    title: &str,
    description: &str,
    line: u32,
    fix: &str,
) -> Issue {
    Issue {
        severity,
        category: Category::Security,
        title: title.to_string(),
        description: description.to_string(),
        line: Some(line),
        column: None,
        code_snippet: None,
        suggested_fix: Some(fix.to_string()),
        cwe_id: None,
        owasp_category: None,
        rule_id: Some(rule_id.to_string()),
        source: IssueSource::RuleEngine,
    }
}

fn analyze_terraform(code: &str) -> Vec<Issue> {
    let mut issues = Vec::new();
    for (idx, line) in code.lines().enumerate() {
        let line_num = idx as u32 + 1;
        if TF_SECRET.is_match(line) {
            issues.push(iac_issue(
                Severity::Critical,
                "tf-hardcoded-secret",
                "Hardcoded secret in Terraform",
                "Sensitive value should not be in source; use variable or vault",
                line_num,
                "Use var.secret_name or a secrets backend (e.g. Vault, AWS Secrets Manager)",
            ));
        }
        if TF_PUBLIC.is_match(line) {
            issues.push(iac_issue(
                Severity::High,
                "tf-public-access",
                "Public access enabled",
                "Resource may be exposed to the internet",
                line_num,
                "Set to false or restrict with CIDR/list",
            ));
        }
    }
    issues
}

fn analyze_dockerfile(code: &str) -> Vec<Issue> {
    let mut issues = Vec::new();
    let mut has_user = false;
    let mut has_run = false;

    for (idx, line) in code.lines().enumerate() {
        let line_num = idx as u32 + 1;
        if DOCKER_USER.is_match(line) {
            has_user = true;
        }
        if DOCKER_RUN.is_match(line) {
            has_run = true;
        }
        if DOCKER_EXPOSE_SSH.is_match(line) {
            issues.push(iac_issue(
                Severity::Medium,
                "docker-expose-ssh",
                "SSH port exposed",
                "Exposing 22 can be a risk; prefer exec",
                line_num,
                "Avoid EXPOSE 22; use docker exec instead",
            ));
        }
        if DOCKER_CURL_SH.is_match(line) {
            issues.push(iac_issue(
                Severity::High,
                "docker-curl-pipe-sh",
                "Unsafe RUN with pipe to shell",
                "Piping download to sh is unsafe",
                line_num,
                "Download to file, verify, then run",
            ));
        }
    }

    if has_run && !has_user {
        issues.push(iac_issue(
            Severity::Medium,
            "docker-root-user",
            "Container may run as root",
            "No USER directive; default is root",
            1,
            "Add USER nonroot (or similar) after installing dependencies",
        ));
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terraform_hardcoded_secret() {
        let code = "resource \"aws_db_instance\" \"db\" {\n  password = \"hunter2\"\n}";
        let issues = analyze_iac(code, Language::Terraform);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Critical);
        assert_eq!(issues[0].line, Some(2));
    }

    #[test]
    fn dockerfile_without_user_flags_root() {
        let code = "FROM alpine:3.20\nRUN apk add --no-cache curl\nCMD [\"./run\"]";
        let issues = analyze_iac(code, Language::Dockerfile);
        assert!(issues
            .iter()
            .any(|i| i.rule_id.as_deref() == Some("docker-root-user")));
    }

    #[test]
    fn dockerfile_with_user_is_quiet() {
        let code = "FROM alpine:3.20\nRUN apk add --no-cache curl\nUSER app\nCMD [\"./run\"]";
        let issues = analyze_iac(code, Language::Dockerfile);
        assert!(issues.is_empty());
    }

    #[test]
    fn curl_pipe_sh_is_flagged() {
        let code = "RUN curl -sSf https://example.com/install.sh | sh";
        let issues = analyze_iac(code, Language::Dockerfile);
        assert!(issues
            .iter()
            .any(|i| i.rule_id.as_deref() == Some("docker-curl-pipe-sh")));
    }

    #[test]
    fn other_languages_are_untouched() {
        assert!(analyze_iac("password = \"x\"", Language::Python).is_empty());
    }
}
