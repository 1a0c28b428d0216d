// SPDX-License-Identifier: MIT
//! Maintainability grade (A–F) and technical debt (remediation minutes),
//! derived from aggregated issue counts.

use serde::{Deserialize, Serialize};

use crate::analysis::model::Severity;

/// Estimated minutes to remediate one issue of each severity.
const MINUTES_CRITICAL: u64 = 60;
const MINUTES_HIGH: u64 = 30;
const MINUTES_MEDIUM: u64 = 15;
const MINUTES_LOW: u64 = 5;
const MINUTES_INFO: u64 = 2;

/// Aggregated issue counts by severity.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct IssueCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
}

impl IssueCounts {
    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low + self.info
    }

    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
            Severity::Info => self.info += 1,
        }
    }
}

/// Letter grade derived from remediation minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn as_str(self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "A" => Some(Grade::A),
            "B" => Some(Grade::B),
            "C" => Some(Grade::C),
            "D" => Some(Grade::D),
            "F" => Some(Grade::F),
            _ => None,
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Total estimated remediation time in minutes.
pub fn remediation_minutes(counts: &IssueCounts) -> u64 {
    counts.critical as u64 * MINUTES_CRITICAL
        + counts.high as u64 * MINUTES_HIGH
        + counts.medium as u64 * MINUTES_MEDIUM
        + counts.low as u64 * MINUTES_LOW
        + counts.info as u64 * MINUTES_INFO
}

/// Map remediation minutes to a letter grade by ascending thresholds.
pub fn grade_for_minutes(minutes: u64) -> Grade {
    match minutes {
        0..=30 => Grade::A,
        31..=60 => Grade::B,
        61..=120 => Grade::C,
        121..=240 => Grade::D,
        _ => Grade::F,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minutes_are_weighted_by_severity() {
        let counts = IssueCounts {
            critical: 1,
            high: 2,
            medium: 1,
            low: 3,
            info: 5,
        };
        assert_eq!(remediation_minutes(&counts), 60 + 60 + 15 + 15 + 10);
    }

    #[test]
    fn grade_thresholds() {
        assert_eq!(grade_for_minutes(0), Grade::A);
        assert_eq!(grade_for_minutes(30), Grade::A);
        assert_eq!(grade_for_minutes(31), Grade::B);
        assert_eq!(grade_for_minutes(60), Grade::B);
        assert_eq!(grade_for_minutes(120), Grade::C);
        assert_eq!(grade_for_minutes(240), Grade::D);
        assert_eq!(grade_for_minutes(241), Grade::F);
    }

    #[test]
    fn one_critical_is_still_a_b_grade() {
        let counts = IssueCounts {
            critical: 1,
            ..IssueCounts::default()
        };
        assert_eq!(grade_for_minutes(remediation_minutes(&counts)), Grade::B);
    }
}
