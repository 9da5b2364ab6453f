//! Check library.
//!
//! Every check is a [`CheckSpec`]: the commands (or probes) it needs and a pure
//! evaluator turning their output into a [`Verdict`]. The orchestrator interprets the
//! table; no check talks to the host on its own.
//!
//! Categories:
//! - Services: daemon state, legacy daemons, time sync
//! - Security: firewall, fail2ban, sshd, kernel, sockets, permissions, accounts
//! - Network: outbound reachability, DNS, web endpoint
//! - Logs: journal noise, recent log activity
//! - Performance: load, memory, disk, latency, concurrency, updates, network latency
//!
//! # Graceful Degradation
//!
//! All evaluators follow these rules:
//! - Policy violated: `Verdict::Fail` naming what was observed and what was expected
//! - Output unparseable: `Verdict::Skip` with the offending text
//! - Optional data absent (file missing, sysctl key unknown): noted, not failed
//! - Fewer results than commands: `Verdict::Skip`
//!
//! Evaluators never panic. Commands are built from policy values only; the
//! target address never appears in a remote command.

pub mod logs;
pub mod network;
pub mod performance;
pub mod security;
pub mod services;

use crate::config::SuiteConfig;
use crate::platform::http::{ProbeBatch, ProbePlan, ReachBatch, ReachPlan};
use crate::platform::inventory::Target;
use crate::platform::ssh::CommandResult;
use crate::{Check, CheckCategory, Verdict};

pub use crate::platform::ssh::shell_quote;

/// Builds the remote commands of a check
pub type CommandsFn = fn(&SuiteConfig) -> Vec<String>;
/// Judges remote command results, one per command in order
pub type EvaluateFn = fn(&[CommandResult], &SuiteConfig) -> Verdict;
/// Builds an HTTP probe plan for the target
pub type PlanFn = fn(&SuiteConfig, &Target) -> ProbePlan;
/// Judges a probe batch
pub type ProbeEvaluateFn = fn(&ProbeBatch, &SuiteConfig) -> Verdict;
pub type ReachPlanFn = fn(&SuiteConfig, &Target) -> ReachPlan;
pub type ReachEvaluateFn = fn(&ReachBatch, &SuiteConfig) -> Verdict;

#[derive(Clone, Copy)]
pub enum CheckKind {
    /// Commands run over the connection
    Remote {
        commands: CommandsFn,
        evaluate: EvaluateFn,
    },
    /// HTTP requests against the target
    Probe {
        plan: PlanFn,
        evaluate: ProbeEvaluateFn,
    },
    /// TCP connects from the runner to the target
    Reach {
        plan: ReachPlanFn,
        evaluate: ReachEvaluateFn,
    },
}

/// One entry of the check table
#[derive(Clone, Copy)]
pub struct CheckSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub category: CheckCategory,
    pub description: &'static str,
    pub kind: CheckKind,
}

impl CheckSpec {
    /// Report row for this check
    pub fn to_check(&self, verdict: Verdict, duration_ms: u64) -> Check {
        Check {
            id: self.id.to_string(),
            name: self.name.to_string(),
            category: self.category,
            description: self.description.to_string(),
            verdict: Some(verdict),
            duration_ms,
        }
    }
}

impl std::fmt::Debug for CheckSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckSpec")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("category", &self.category)
            .finish()
    }
}

/// The full check table in report order
pub fn all_specs() -> Vec<CheckSpec> {
    let mut specs = Vec::new();
    specs.extend(services::specs());
    specs.extend(security::specs());
    specs.extend(network::specs());
    specs.extend(logs::specs());
    specs.extend(performance::specs());
    specs
}

/// Checks for a specific category
pub fn specs_by_category(category: CheckCategory) -> Vec<CheckSpec> {
    match category {
        CheckCategory::Services => services::specs(),
        CheckCategory::Security => security::specs(),
        CheckCategory::Network => network::specs(),
        CheckCategory::Logs => logs::specs(),
        CheckCategory::Performance => performance::specs(),
    }
}

/// Verdict for results shorter than the command list
pub(crate) fn missing_output(expected: usize, got: usize) -> Verdict {
    Verdict::skip(format!("expected {} command results, got {}", expected, got))
}

/// Parse the first whitespace-separated token as a number
pub(crate) fn parse_number(text: &str) -> Option<f64> {
    text.split_whitespace().next()?.trim_end_matches('%').parse().ok()
}

/// `stat` output of one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StatOutput {
    Absent,
    Present { mode: u32, owner: Option<String> },
}

/// Command printing `<octal mode> [owner]` or `absent`
pub(crate) fn stat_command(path: &str, with_owner: bool) -> String {
    let format = if with_owner { "%a %U" } else { "%a" };
    format!(
        "stat -c '{}' {} 2>/dev/null || echo absent",
        format,
        shell_quote(path)
    )
}

pub(crate) fn parse_stat(result: &CommandResult) -> Option<StatOutput> {
    let output = result.output();
    if output == "absent" {
        return Some(StatOutput::Absent);
    }
    let mut fields = output.split_whitespace();
    let mode = u32::from_str_radix(fields.next()?, 8).ok()?;
    Some(StatOutput::Present {
        mode,
        owner: fields.next().map(str::to_string),
    })
}
