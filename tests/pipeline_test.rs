//! Integration tests for the per-file analysis pipeline.

use reviewd::analysis::ai::AiReviewer;
use reviewd::analysis::model::{Category, Severity};
use reviewd::analysis::{analyze_file, analyze_files, SourceFile};
use reviewd::config::AiConfig;
use reviewd::policy::RepoPolicy;

fn disabled_ai() -> AiReviewer {
    AiReviewer::new(AiConfig::default())
}

fn file(path: &str, code: &str) -> SourceFile {
    SourceFile {
        path: path.to_string(),
        code: code.to_string(),
    }
}

#[tokio::test]
async fn hardcoded_password_yields_critical_issue_on_its_line() {
    let code = "const db = connect();\nconst retries = 3;\nlet user = null;\nlet ok = false;\npassword = \"admin123\"\n";
    let result = analyze_file(&disabled_ai(), &file("src/config.js", code), &RepoPolicy::default()).await;

    let hit = result
        .issues
        .iter()
        .find(|i| i.rule_id.as_deref() == Some("hardcoded-password"))
        .expect("hardcoded-password rule should fire");
    assert_eq!(hit.severity, Severity::Critical);
    assert_eq!(hit.category, Category::Security);
    assert_eq!(hit.line, Some(5));
    assert_eq!(hit.cwe_id.as_deref(), Some("CWE-798"));

    // CRITICAL 20 off a base of 100, no AI blend.
    assert_eq!(result.score, 80);
    assert!(!result.ai_ran);
}

#[tokio::test]
async fn fused_issues_are_severity_ordered() {
    // eval (CRITICAL), Math.random (MEDIUM), plus a LOW duplicate block.
    let mut lines: Vec<String> = vec![
        "eval(userInput);".to_string(),
        "const jitter = Math.random();".to_string(),
    ];
    let block: Vec<String> = (0..8)
        .map(|i| format!("applyMigrationStep({i}, schema, options);"))
        .collect();
    lines.extend(block.clone());
    for i in 0..10 {
        lines.push(format!("log.info('between {i}');"));
    }
    lines.extend(block);

    let result = analyze_file(
        &disabled_ai(),
        &file("src/run.js", &lines.join("\n")),
        &RepoPolicy::default(),
    )
    .await;

    assert!(result.issues.len() >= 3);
    for pair in result.issues.windows(2) {
        assert!(
            pair[0].severity.rank() <= pair[1].severity.rank(),
            "issues must be ordered most-severe first"
        );
    }
    let dup_count = result
        .issues
        .iter()
        .filter(|i| i.title == "Duplicate code block")
        .count();
    assert_eq!(dup_count, 1, "repeated block reported exactly once");
}

#[tokio::test]
async fn ai_failure_degrades_to_pattern_only() {
    // An unreachable AI endpoint with a key configured: the augmentation
    // stage is attempted (critical finding) and must fail without failing
    // the file.
    let ai = AiReviewer::new(AiConfig {
        api_key: Some("test-key".to_string()),
        endpoint: "http://127.0.0.1:9".to_string(),
        request_timeout_secs: 2,
        ..AiConfig::default()
    });
    let code = "eval(payload);\n";
    let result = analyze_file(&ai, &file("src/danger.js", code), &RepoPolicy::default()).await;

    assert!(!result.ai_ran, "AI must not be marked as run after a failure");
    assert!(result
        .issues
        .iter()
        .any(|i| i.rule_id.as_deref() == Some("js-eval")));
    // Score comes purely from the pattern weighting: 100 - 20.
    assert_eq!(result.score, 80);
}

#[tokio::test]
async fn batch_analysis_processes_every_file() {
    let files: Vec<SourceFile> = (0..12)
        .map(|i| file(&format!("src/mod_{i}.py"), "import os\nos.system(cmd)\n"))
        .collect();
    let results = analyze_files(&disabled_ai(), &files, &RepoPolicy::default()).await;
    assert_eq!(results.len(), 12);
    for result in &results {
        assert!(result
            .issues
            .iter()
            .any(|i| i.rule_id.as_deref() == Some("py-command-injection-system")));
    }
}

#[tokio::test]
async fn duplication_policy_window_is_respected() {
    // A 5-line repeated block is invisible at the default window (8) but
    // caught when the policy shrinks the window.
    let block: Vec<String> = (0..5)
        .map(|i| format!("writeCheckpoint(segment_{i}, offset_{i});"))
        .collect();
    let mut lines = block.clone();
    for i in 0..8 {
        lines.push(format!("trace('separator {i}');"));
    }
    lines.extend(block);
    let code = lines.join("\n");

    let default_result = analyze_file(
        &disabled_ai(),
        &file("src/ckpt.js", &code),
        &RepoPolicy::default(),
    )
    .await;
    assert!(!default_result
        .issues
        .iter()
        .any(|i| i.title == "Duplicate code block"));

    let tuned = RepoPolicy::parse(Some("duplication:\n  minLines: 5\n"));
    let tuned_result = analyze_file(&disabled_ai(), &file("src/ckpt.js", &code), &tuned).await;
    assert!(tuned_result
        .issues
        .iter()
        .any(|i| i.title == "Duplicate code block"));
}

#[tokio::test]
async fn terraform_files_run_iac_checks() {
    let code = "resource \"aws_s3_bucket\" \"b\" {\n  allow_public_access = true\n}\n";
    let result = analyze_file(&disabled_ai(), &file("infra/main.tf", code), &RepoPolicy::default()).await;
    assert!(result
        .issues
        .iter()
        .any(|i| i.rule_id.as_deref() == Some("tf-public-access")));
}
