// SPDX-License-Identifier: MIT
//! Daemon configuration.
//!
//! Loaded from a TOML file (default `reviewd.toml` in the data directory),
//! with every section optional and falling back to defaults. Secrets can
//! also arrive via environment variables so they stay out of config files.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

const DEFAULT_PORT: u16 = 8420;

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

// ─── Environment ─────────────────────────────────────────────────────────────

/// Deployment environment. In anything but `Production`, a webhook without a
/// signature is tolerated to ease local testing — an *invalid* signature is
/// always rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }
}

// ─── ServerConfig ─────────────────────────────────────────────────────────────

/// HTTP listener configuration (`[server]`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address; use `0.0.0.0` to accept webhooks from outside.
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: DEFAULT_PORT,
        }
    }
}

// ─── WebhookConfig ────────────────────────────────────────────────────────────

/// Per-provider webhook shared secrets (`[webhooks]`).
///
/// A provider without a secret configured accepts unsigned deliveries only
/// outside production.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// GitHub `X-Hub-Signature-256` HMAC secret.
    pub github_secret: Option<String>,
    /// GitLab `X-Gitlab-Token` shared token.
    pub gitlab_token: Option<String>,
    /// Bitbucket `X-Hub-Signature` HMAC secret.
    pub bitbucket_secret: Option<String>,
}

// ─── ProviderConfig ───────────────────────────────────────────────────────────

/// API tokens and base-URL overrides per provider (`[providers]`).
///
/// Tokens here are the fallback when an installation row carries none (e.g.
/// self-hosted single-tenant deployments).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub github_token: Option<String>,
    pub gitlab_token: Option<String>,
    pub bitbucket_token: Option<String>,
    /// Override for GitHub Enterprise, e.g. `https://github.example.com/api/v3`.
    pub github_api_base: Option<String>,
    /// Override for self-hosted GitLab, e.g. `https://git.example.com/api/v4`.
    pub gitlab_api_base: Option<String>,
    pub bitbucket_api_base: Option<String>,
}

// ─── SchedulerConfig ──────────────────────────────────────────────────────────

/// Job scheduler tuning (`[scheduler]`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Concurrent analysis jobs across the worker pool.
    pub worker_concurrency: usize,
    /// Attempts per job, including the first try.
    pub max_attempts: u32,
    /// Global throughput cap protecting downstream provider APIs.
    pub rate_limit_per_minute: u64,
    /// Idle worker poll interval.
    pub poll_interval_ms: u64,
    /// Initial retry backoff.
    pub backoff_base_ms: u64,
    /// Retry backoff cap.
    pub backoff_max_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: 5,
            max_attempts: 3,
            rate_limit_per_minute: 10,
            poll_interval_ms: 2_000,
            backoff_base_ms: 2_000,
            backoff_max_ms: 60_000,
        }
    }
}

// ─── AiConfig ─────────────────────────────────────────────────────────────────

/// External AI reviewer settings (`[ai]`). Analysis runs pattern-only when
/// no API key is configured.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AiConfig {
    /// OpenAI-compatible API base.
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    /// Prompt bound: files beyond this keep head + tail only.
    pub max_code_lines: usize,
    pub request_timeout_secs: u64,
    /// Weight of the AI score when blending with the pattern score.
    pub blend_ai_weight: f64,
    /// Weight of the pattern score when blending.
    pub blend_pattern_weight: f64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1_000,
            max_code_lines: 2_000,
            request_timeout_secs: 60,
            blend_ai_weight: 0.6,
            blend_pattern_weight: 0.4,
        }
    }
}

// ─── ApiConfig ────────────────────────────────────────────────────────────────

/// REST API settings (`[api]`).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Bearer token required by the CI trigger endpoint. Unset disables the
    /// trigger endpoint entirely.
    pub trigger_token: Option<String>,
}

// ─── NotifyConfig ─────────────────────────────────────────────────────────────

/// Best-effort completion notifications (`[notify]`). Unset disables them.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// HTTP endpoint that receives a JSON notification per completed review.
    pub endpoint: Option<String>,
}

// ─── DaemonConfig ─────────────────────────────────────────────────────────────

/// Root configuration for the daemon.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub webhooks: WebhookConfig,
    pub providers: ProviderConfig,
    pub scheduler: SchedulerConfig,
    pub ai: AiConfig,
    pub api: ApiConfig,
    pub notify: NotifyConfig,
}

impl DaemonConfig {
    /// Load configuration from `path`, falling back to defaults when the
    /// file is missing, then apply environment-variable overrides.
    pub fn load(path: &Path) -> Self {
        let mut config = match std::fs::read_to_string(path) {
            Ok(raw) => match toml::from_str::<DaemonConfig>(&raw) {
                Ok(config) => {
                    info!(path = %path.display(), "configuration loaded");
                    config
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "invalid config file, using defaults");
                    DaemonConfig::default()
                }
            },
            Err(_) => {
                info!(path = %path.display(), "no config file, using defaults");
                DaemonConfig::default()
            }
        };
        config.apply_env_overrides();
        config
    }

    /// Secrets from the environment win over the config file.
    fn apply_env_overrides(&mut self) {
        let overrides: [(&str, &mut Option<String>); 7] = [
            ("REVIEWD_GITHUB_WEBHOOK_SECRET", &mut self.webhooks.github_secret),
            ("REVIEWD_GITLAB_WEBHOOK_TOKEN", &mut self.webhooks.gitlab_token),
            (
                "REVIEWD_BITBUCKET_WEBHOOK_SECRET",
                &mut self.webhooks.bitbucket_secret,
            ),
            ("REVIEWD_GITHUB_TOKEN", &mut self.providers.github_token),
            ("REVIEWD_GITLAB_TOKEN", &mut self.providers.gitlab_token),
            ("REVIEWD_BITBUCKET_TOKEN", &mut self.providers.bitbucket_token),
            ("REVIEWD_AI_API_KEY", &mut self.ai.api_key),
        ];
        for (var, slot) in overrides {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    *slot = Some(value);
                }
            }
        }
        if let Ok(value) = std::env::var("REVIEWD_TRIGGER_TOKEN") {
            if !value.is_empty() {
                self.api.trigger_token = Some(value);
            }
        }
        if let Ok(value) = std::env::var("REVIEWD_ENV") {
            if value.eq_ignore_ascii_case("production") {
                self.environment = Environment::Production;
            }
        }
    }

    /// Fallback provider token from `[providers]` for installations without
    /// their own credentials.
    pub fn provider_token(&self, provider: crate::provider::Provider) -> Option<String> {
        use crate::provider::Provider;
        match provider {
            Provider::GitHub => self.providers.github_token.clone(),
            Provider::GitLab => self.providers.gitlab_token.clone(),
            Provider::Bitbucket => self.providers.bitbucket_token.clone(),
        }
    }

    /// API base override for a provider.
    pub fn provider_api_base(&self, provider: crate::provider::Provider) -> Option<String> {
        use crate::provider::Provider;
        match provider {
            Provider::GitHub => self.providers.github_api_base.clone(),
            Provider::GitLab => self.providers.gitlab_api_base.clone(),
            Provider::Bitbucket => self.providers.bitbucket_api_base.clone(),
        }
    }

    /// Webhook secret for a provider.
    pub fn webhook_secret(&self, provider: crate::provider::Provider) -> Option<&str> {
        use crate::provider::Provider;
        match provider {
            Provider::GitHub => self.webhooks.github_secret.as_deref(),
            Provider::GitLab => self.webhooks.gitlab_token.as_deref(),
            Provider::Bitbucket => self.webhooks.bitbucket_secret.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = DaemonConfig::default();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.scheduler.worker_concurrency, 5);
        assert_eq!(config.scheduler.max_attempts, 3);
        assert_eq!(config.scheduler.rate_limit_per_minute, 10);
        assert!(!config.environment.is_production());
        assert!((config.ai.blend_ai_weight - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn parses_partial_toml() {
        let raw = r#"
environment = "production"

[server]
port = 9000

[scheduler]
worker_concurrency = 2
"#;
        let config: DaemonConfig = toml::from_str(raw).unwrap();
        assert!(config.environment.is_production());
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.scheduler.worker_concurrency, 2);
        // Untouched sections keep their defaults.
        assert_eq!(config.scheduler.max_attempts, 3);
        assert_eq!(config.ai.model, "gpt-4o-mini");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = DaemonConfig::load(Path::new("/nonexistent/reviewd.toml"));
        assert_eq!(config.server.port, DEFAULT_PORT);
    }
}
