// SPDX-License-Identifier: MIT
//! Exponential backoff with jitter for job retries.
//!
//! Formula: `min(base * multiplier^attempt, max) + jitter`
//! where jitter is derived deterministically from the attempt number.

use std::time::Duration;

// ── Config ───────────────────────────────────────────────────────────────────

/// Configuration for exponential backoff.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Initial backoff in milliseconds.
    pub base_ms: u64,
    /// Maximum backoff cap in milliseconds.
    pub max_ms: u64,
    /// Exponential growth multiplier per attempt.
    pub multiplier: f64,
    /// Jitter as a fraction of the computed backoff (0.0–1.0).
    pub jitter_fraction: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: 2_000,
            max_ms: 60_000,
            multiplier: 2.0,
            jitter_fraction: 0.25,
        }
    }
}

impl BackoffConfig {
    pub fn from_scheduler(config: &crate::config::SchedulerConfig) -> Self {
        Self {
            base_ms: config.backoff_base_ms,
            max_ms: config.backoff_max_ms,
            ..Self::default()
        }
    }
}

// ── Computation ──────────────────────────────────────────────────────────────

/// Calculate the backoff duration before retrying `attempt` (0-indexed).
pub fn next_backoff(attempt: u32, config: &BackoffConfig) -> Duration {
    let base = config.base_ms as f64;
    let raw = base * config.multiplier.powi(attempt as i32);
    let capped = raw.min(config.max_ms as f64);

    // Deterministic pseudo-jitter derived from the attempt number (avoids a
    // rand dep). Simple LCG step seeded with the attempt for spread.
    let jitter_range = capped * config.jitter_fraction;
    let jitter = pseudo_rand(attempt) * jitter_range;
    let with_jitter = (capped + jitter).max(0.0);

    Duration::from_millis(with_jitter as u64)
}

/// Produce a float in [-0.5, 0.5) using an LCG seeded by `attempt`.
fn pseudo_rand(attempt: u32) -> f64 {
    // LCG parameters (Numerical Recipes)
    const A: u64 = 1_664_525;
    const C: u64 = 1_013_904_223;
    const M: u64 = 1u64 << 32;
    let state = A.wrapping_mul(attempt as u64).wrapping_add(C) % M;
    (state as f64 / M as f64) - 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_increases_with_attempt() {
        let cfg = BackoffConfig::default();
        let b0 = next_backoff(0, &cfg);
        let b3 = next_backoff(3, &cfg);
        assert!(
            b3 >= b0,
            "later attempt should generally have longer backoff"
        );
    }

    #[test]
    fn backoff_capped_at_max() {
        let cfg = BackoffConfig::default();
        let b = next_backoff(100, &cfg);
        let max_with_jitter = cfg.max_ms + (cfg.max_ms as f64 * cfg.jitter_fraction) as u64;
        assert!(
            b.as_millis() as u64 <= max_with_jitter,
            "backoff should not greatly exceed max_ms ({}ms > {}ms)",
            b.as_millis(),
            max_with_jitter
        );
    }

    #[test]
    fn base_attempt_is_near_base() {
        let cfg = BackoffConfig {
            base_ms: 2_000,
            max_ms: 60_000,
            multiplier: 2.0,
            jitter_fraction: 0.1,
        };
        let b = next_backoff(0, &cfg);
        assert!(b.as_millis() >= 1_800, "got {}ms", b.as_millis());
        assert!(b.as_millis() <= 2_200, "got {}ms", b.as_millis());
    }
}
