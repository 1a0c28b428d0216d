// SPDX-License-Identifier: MIT
//! reviewd — automated change-request review daemon.
//!
//! Ingests webhook events from GitHub/GitLab/Bitbucket, schedules durable
//! analysis jobs, runs a multi-stage code-quality/security pipeline over the
//! changed files, evaluates a policy-driven quality gate, and publishes the
//! results back as comments and a commit status.

pub mod analysis;
pub mod api;
pub mod config;
pub mod error;
pub mod ingress;
pub mod maintainability;
pub mod notify;
pub mod policy;
pub mod provider;
pub mod publish;
pub mod scheduler;
pub mod storage;

use std::sync::Arc;

use analysis::ai::AiReviewer;
use config::DaemonConfig;
use notify::Notifier;
use scheduler::rate_limit::{JobThrottle, SharedJobThrottle};
use storage::Storage;

/// Shared application state handed to every route handler and worker.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<DaemonConfig>,
    pub storage: Arc<Storage>,
    /// External AI reviewer client (disabled without an API key).
    pub ai: Arc<AiReviewer>,
    /// Best-effort completion notifications.
    pub notifier: Arc<Notifier>,
    /// Global job-start throughput cap.
    pub throttle: SharedJobThrottle,
    pub started_at: std::time::Instant,
}

impl AppContext {
    pub fn new(config: DaemonConfig, storage: Storage) -> Self {
        let ai = AiReviewer::new(config.ai.clone());
        let notifier = Notifier::new(&config.notify);
        let throttle = Arc::new(JobThrottle::new(config.scheduler.rate_limit_per_minute.max(1)));
        Self {
            config: Arc::new(config),
            storage: Arc::new(storage),
            ai: Arc::new(ai),
            notifier: Arc::new(notifier),
            throttle,
            started_at: std::time::Instant::now(),
        }
    }

    /// The full HTTP surface: webhook ingress + REST API.
    pub fn router(&self) -> axum::Router {
        ingress::router(self.clone()).merge(api::router(self.clone()))
    }
}
