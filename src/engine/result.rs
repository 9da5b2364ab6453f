//! Result aggregation and exit-code policy.

use crate::{Check, Verdict};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Every verdict was Pass or Skip
pub const EXIT_PASS: u8 = 0;
/// At least one check failed
pub const EXIT_FAIL: u8 = 1;
/// Checks could not run (connection budget exhausted)
pub const EXIT_NOT_RUN: u8 = 2;
/// Usage, configuration or inventory error
pub const EXIT_USAGE: u8 = 3;

/// Result summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResultSummary {
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub total: u32,
    pub total_duration_ms: u64,
}

/// Overall state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pass,
    Fail,
    NotRun,
}

/// How an all-skipped run is judged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitPolicy {
    pub all_skipped_is_pass: bool,
}

impl Default for ExitPolicy {
    fn default() -> Self {
        ExitPolicy {
            all_skipped_is_pass: true,
        }
    }
}

/// Validation report containing all check results
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub timestamp: DateTime<Utc>,
    pub environment: Option<String>,
    /// `user@address:port`, when a target was resolved
    pub target: Option<String>,
    /// Set when no check could run; `checks` is then empty
    pub aborted: Option<String>,
    pub checks: Vec<Check>,
    pub total_duration_ms: u64,
}

impl ValidationReport {
    /// Create a new empty report
    pub fn new() -> Self {
        ValidationReport {
            timestamp: Utc::now(),
            environment: None,
            target: None,
            aborted: None,
            checks: Vec::new(),
            total_duration_ms: 0,
        }
    }

    /// Calculate summary statistics
    pub fn summary(&self) -> ResultSummary {
        let mut summary = ResultSummary::default();

        for check in &self.checks {
            summary.total += 1;
            summary.total_duration_ms += check.duration_ms;

            match &check.verdict {
                Some(Verdict::Pass { .. }) => summary.passed += 1,
                Some(Verdict::Fail { .. }) => summary.failed += 1,
                Some(Verdict::Skip { .. }) | None => summary.skipped += 1,
            }
        }

        summary
    }

    pub fn status(&self) -> RunStatus {
        if self.aborted.is_some() {
            RunStatus::NotRun
        } else if self.summary().failed > 0 {
            RunStatus::Fail
        } else {
            RunStatus::Pass
        }
    }

    /// Process exit code under `policy`
    pub fn exit_code(&self, policy: &ExitPolicy) -> u8 {
        match self.status() {
            RunStatus::NotRun => EXIT_NOT_RUN,
            RunStatus::Fail => EXIT_FAIL,
            RunStatus::Pass => {
                let summary = self.summary();
                let all_skipped = summary.total > 0 && summary.skipped == summary.total;
                if all_skipped && !policy.all_skipped_is_pass {
                    EXIT_FAIL
                } else {
                    EXIT_PASS
                }
            }
        }
    }

    /// Short description of an exit code for reports
    pub fn exit_description(&self, policy: &ExitPolicy) -> &'static str {
        match self.exit_code(policy) {
            EXIT_PASS if self.summary().passed == 0 && self.summary().total > 0 => "all checks skipped",
            EXIT_PASS => "all checks passed",
            EXIT_NOT_RUN => "checks could not run",
            _ if self.summary().failed == 0 => "all checks skipped",
            _ => "failures detected",
        }
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Result aggregator for collecting check results
pub struct ResultAggregator {
    checks: Vec<Check>,
    environment: Option<String>,
    target: Option<String>,
    aborted: Option<String>,
    total_duration_ms: u64,
}

impl ResultAggregator {
    pub fn new() -> Self {
        ResultAggregator {
            checks: Vec::new(),
            environment: None,
            target: None,
            aborted: None,
            total_duration_ms: 0,
        }
    }

    /// Set report metadata
    pub fn set_metadata(&mut self, environment: Option<String>, target: Option<String>) {
        self.environment = environment;
        self.target = target;
    }

    pub fn set_duration(&mut self, total_duration_ms: u64) {
        self.total_duration_ms = total_duration_ms;
    }

    /// Add a completed check result
    pub fn add_result(&mut self, check: Check) {
        self.checks.push(check);
    }

    /// Record that the run could not execute checks; drops any rows
    pub fn abort(&mut self, reason: impl Into<String>) {
        self.checks.clear();
        self.aborted = Some(reason.into());
    }

    /// Check if there are any failures
    pub fn has_failures(&self) -> bool {
        self.checks
            .iter()
            .any(|c| matches!(&c.verdict, Some(Verdict::Fail { .. })))
    }

    /// Create final validation report
    pub fn to_report(&self) -> ValidationReport {
        ValidationReport {
            timestamp: Utc::now(),
            environment: self.environment.clone(),
            target: self.target.clone(),
            aborted: self.aborted.clone(),
            checks: self.checks.clone(),
            total_duration_ms: self.total_duration_ms,
        }
    }
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new()
    }
}
