// SPDX-License-Identifier: MIT
//! Best-effort completion notifications.
//!
//! Fire-and-forget POST to a configured HTTP endpoint. Delivery failures are
//! logged and never escalated — a lost notification must not affect the
//! review outcome.

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::NotifyConfig;

/// Payload for one review-completed notification.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewNotification {
    pub repository: String,
    pub title: String,
    pub url: String,
    pub score: u8,
    pub total_issues: usize,
    pub critical_issues: usize,
    pub gate_passed: bool,
}

pub struct Notifier {
    http: reqwest::Client,
    endpoint: Option<String>,
}

impl Notifier {
    pub fn new(config: &NotifyConfig) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            endpoint: config.endpoint.clone(),
        }
    }

    /// Send a completion notification. On gate failure, a second event with
    /// kind `gate_failed` follows so subscribers can alert separately.
    pub async fn review_completed(&self, notification: &ReviewNotification) {
        self.send("review_completed", notification).await;
        if !notification.gate_passed {
            self.send("gate_failed", notification).await;
        }
    }

    async fn send(&self, kind: &str, notification: &ReviewNotification) {
        let Some(endpoint) = &self.endpoint else {
            debug!(kind, "notifications disabled, skipping");
            return;
        };
        let body = serde_json::json!({
            "kind": kind,
            "review": notification,
        });
        match self.http.post(endpoint).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(kind, repository = notification.repository, "notification sent");
            }
            Ok(resp) => {
                warn!(kind, status = resp.status().as_u16(), "notification rejected");
            }
            Err(err) => {
                warn!(kind, error = %err, "notification delivery failed");
            }
        }
    }
}
