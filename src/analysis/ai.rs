// SPDX-License-Identifier: MIT
//! External AI reviewer client.
//!
//! The AI service is an opaque black box: a bounded prompt goes in, a
//! structured review (summary, issue list, 0–100 score) comes out over an
//! OpenAI-compatible chat-completions API. Quota and transport failures are
//! reported as typed errors so the pipeline can degrade to pattern-only
//! results — an AI failure never fails a file's analysis.

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::analysis::language::Language;
use crate::analysis::model::{Category, CodeStructure, Issue, IssueSource, Severity};
use crate::config::AiConfig;
use crate::error::AiError;

/// Lines kept from the tail when a file exceeds `max_code_lines`.
const TAIL_CONTEXT_LINES: usize = 100;

/// Structured result of one AI review call.
#[derive(Debug, Clone)]
pub struct AiReview {
    pub summary: String,
    pub issues: Vec<Issue>,
    pub suggestions: Vec<String>,
    /// 0–100, where 100 is flawless.
    pub score: u8,
}

pub struct AiReviewer {
    http: reqwest::Client,
    config: AiConfig,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewPayload {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    issues: Vec<IssuePayload>,
    #[serde(default)]
    suggestions: Vec<String>,
    #[serde(default)]
    score: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssuePayload {
    #[serde(default)]
    severity: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    line: Option<u32>,
    suggested_fix: Option<String>,
    explanation: Option<String>,
}

impl AiReviewer {
    pub fn new(config: AiConfig) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
                .build()
                .unwrap_or_default(),
            config,
        }
    }

    /// Whether an API key is configured. When disabled, the augmentation
    /// stage is skipped entirely.
    pub fn enabled(&self) -> bool {
        self.config.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// `(ai, pattern)` weights for blending the AI score with the pattern
    /// score when the AI stage ran.
    pub fn blend_weights(&self) -> (f64, f64) {
        (
            self.config.blend_ai_weight,
            self.config.blend_pattern_weight,
        )
    }

    /// Run one review call for a file.
    pub async fn review(
        &self,
        code: &str,
        path: &str,
        language: Language,
        structure: &CodeStructure,
        scan_issues: &[Issue],
    ) -> Result<AiReview, AiError> {
        let Some(api_key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) else {
            return Err(AiError::Disabled);
        };

        let prompt = self.build_prompt(code, path, language, structure, scan_issues);
        let url = format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'));

        let resp = self
            .http
            .post(url)
            .bearer_auth(api_key)
            .json(&json!({
                "model": self.config.model,
                "messages": [
                    { "role": "system", "content": SYSTEM_PROMPT },
                    { "role": "user", "content": prompt },
                ],
                "temperature": 0.3,
                "max_tokens": self.config.max_tokens,
            }))
            .send()
            .await
            .map_err(|e| AiError::Request(e.to_string()))?;

        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| AiError::Request(e.to_string()))?;
        if status == 429 || body.contains("insufficient_quota") || body.contains("quota") {
            return Err(AiError::QuotaExceeded(format!("HTTP {status}")));
        }
        if status >= 400 {
            return Err(AiError::Request(format!("HTTP {status}: {body}")));
        }

        let chat: ChatResponse =
            serde_json::from_str(&body).map_err(|e| AiError::Parse(e.to_string()))?;
        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(AiError::Parse("empty completion".to_string()));
        }

        debug!(path, content_len = content.len(), "AI review response received");
        parse_review(content)
    }

    /// Build the bounded analysis prompt. Long files keep their head plus
    /// the last [`TAIL_CONTEXT_LINES`] lines for context.
    fn build_prompt(
        &self,
        code: &str,
        path: &str,
        language: Language,
        structure: &CodeStructure,
        scan_issues: &[Issue],
    ) -> String {
        let max_lines = self.config.max_code_lines;
        let lines: Vec<&str> = code.lines().collect();
        let bounded_code = if lines.len() > max_lines {
            let head_len = max_lines.saturating_sub(TAIL_CONTEXT_LINES);
            let head = lines[..head_len].join("\n");
            let tail = lines[lines.len() - TAIL_CONTEXT_LINES..].join("\n");
            debug!(
                path,
                original_lines = lines.len(),
                truncated_lines = max_lines,
                "code truncated for AI prompt"
            );
            format!(
                "{head}\n\n// ... ({} lines omitted) ...\n\n{tail}",
                lines.len() - max_lines
            )
        } else {
            code.to_string()
        };

        let mut prompt = format!("Review {} code:\n\n", language.display_name());
        prompt.push_str(&format!("File: {path}\n"));
        prompt.push_str(&format!(
            "Stats: {} funcs, {} classes, complexity {}\n",
            structure.functions.len(),
            structure.classes.len(),
            structure.complexity
        ));

        let critical: Vec<&Issue> = scan_issues
            .iter()
            .filter(|i| matches!(i.severity, Severity::Critical | Severity::High))
            .collect();
        if !critical.is_empty() {
            prompt.push_str(&format!("Security issues found: {}\n", critical.len()));
            for issue in critical.iter().take(2) {
                prompt.push_str(&format!(
                    "- {} (line {})\n",
                    issue.title,
                    issue.line.unwrap_or(0)
                ));
            }
            prompt.push('\n');
        }

        prompt.push_str(&format!("Code:\n```\n{bounded_code}\n```\n\n"));
        prompt.push_str("Find issues the pattern scanner missed. JSON format:\n");
        prompt.push_str(
            r#"{"summary":"...","issues":[{"severity":"HIGH","category":"SECURITY","title":"...","description":"...","line":42,"suggestedFix":"..."}],"suggestions":["..."],"score":85}"#,
        );
        prompt.push('\n');
        prompt
    }
}

const SYSTEM_PROMPT: &str = "You are an expert code reviewer. Analyze code and provide \
constructive feedback focusing on security vulnerabilities, performance issues, code quality \
and maintainability, best practices, and potential bugs. Be specific, actionable, and \
professional. Always provide line numbers when possible.";

/// Extract the JSON object from a completion and map it to an [`AiReview`].
fn parse_review(content: &str) -> Result<AiReview, AiError> {
    let start = content.find('{');
    let end = content.rfind('}');
    let (Some(start), Some(end)) = (start, end) else {
        return Err(AiError::Parse("no JSON object in completion".to_string()));
    };
    if end < start {
        return Err(AiError::Parse("malformed JSON bounds".to_string()));
    }

    let payload: ReviewPayload = serde_json::from_str(&content[start..=end])
        .map_err(|e| AiError::Parse(e.to_string()))?;

    let issues = payload
        .issues
        .into_iter()
        .filter(|i| !i.title.is_empty())
        .map(|i| {
            let mut description = i.description;
            if let Some(explanation) = i.explanation {
                if !explanation.is_empty() {
                    description.push_str("\n\n");
                    description.push_str(&explanation);
                }
            }
            Issue {
                severity: Severity::from_str(&i.severity).unwrap_or(Severity::Info),
                category: Category::from_str(&i.category).unwrap_or(Category::Quality),
                title: i.title,
                description,
                line: i.line,
                column: None,
                code_snippet: None,
                suggested_fix: i.suggested_fix,
                cwe_id: None,
                owasp_category: None,
                rule_id: None,
                source: IssueSource::Ai,
            }
        })
        .collect();

    Ok(AiReview {
        summary: if payload.summary.is_empty() {
            "No summary provided".to_string()
        } else {
            payload.summary
        },
        issues,
        suggestions: payload.suggestions,
        score: payload.score.clamp(0.0, 100.0).round() as u8,
    })
}
