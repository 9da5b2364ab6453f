//! Check execution orchestrator.
//!
//! Selects checks from the registered table, acquires one connection to the
//! target, and interprets each check against it in table order.
//!
//! # Graceful Degradation
//!
//! This module handles errors gracefully:
//! - Target unresolved: every selected check is reported as Skip with the reason
//! - Connection budget exhausted: report is marked aborted and carries no rows
//! - Transport failure or timeout inside a check: that check fails, the run continues
//! - Unknown IDs in the only/skip lists: logged and ignored
//! - Empty selection: returns an empty report (not an error)
//!
//! Checks run one at a time; commands inside a check run in order. No function
//! in this module will panic.

use crate::checks::{CheckKind, CheckSpec};
use crate::config::SuiteConfig;
use crate::engine::result::{ResultAggregator, ValidationReport};
use crate::platform::connection::{Connection, ConnectionManager};
use crate::platform::http::Prober;
use crate::platform::inventory::Resolution;
use crate::{CheckCategory, Verdict};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub fail_fast: bool,
    /// Per-command timeout
    pub command_timeout: Duration,
    /// Categories to run (None = all)
    pub categories: Option<Vec<CheckCategory>>,
    /// When non-empty, only these IDs run
    pub only_checks: Vec<String>,
    pub skip_checks: Vec<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            fail_fast: false,
            command_timeout: Duration::from_secs(30),
            categories: None,
            only_checks: Vec::new(),
            skip_checks: Vec::new(),
        }
    }
}

/// Check orchestrator
pub struct CheckOrchestrator {
    config: OrchestratorConfig,
    suite: SuiteConfig,
    manager: ConnectionManager,
    prober: Arc<dyn Prober>,
    checks: Vec<CheckSpec>,
}

impl CheckOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        suite: SuiteConfig,
        manager: ConnectionManager,
        prober: Arc<dyn Prober>,
    ) -> Self {
        CheckOrchestrator {
            config,
            suite,
            manager,
            prober,
            checks: Vec::new(),
        }
    }

    /// Register checks for execution
    pub fn register_checks(&mut self, checks: Vec<CheckSpec>) {
        self.checks.extend(checks);
    }

    /// Checks that will run, in table order.
    ///
    /// Category filter first, then the only list, then the skip list. IDs
    /// compare case-insensitively.
    pub fn selected_specs(&self) -> Vec<CheckSpec> {
        for id in self.config.only_checks.iter().chain(&self.config.skip_checks) {
            if !self.checks.iter().any(|c| c.id.eq_ignore_ascii_case(id)) {
                warn!(check = %id, "unknown check ID ignored");
            }
        }

        self.checks
            .iter()
            .filter(|c| match &self.config.categories {
                Some(categories) => categories.contains(&c.category),
                None => true,
            })
            .filter(|c| self.config.only_checks.is_empty() || listed(&self.config.only_checks, c.id))
            .filter(|c| !listed(&self.config.skip_checks, c.id))
            .copied()
            .collect()
    }

    /// Run the selected checks against the resolved target
    pub async fn run(&self, resolution: Resolution, environment: Option<String>) -> ValidationReport {
        let start = Instant::now();
        let selected = self.selected_specs();
        let mut aggregator = ResultAggregator::new();

        let target = match resolution {
            Resolution::Skip(reason) => {
                info!(reason = %reason, "no target resolved, skipping all checks");
                aggregator.set_metadata(environment, None);
                for spec in &selected {
                    aggregator.add_result(
                        spec.to_check(Verdict::skip(format!("target unresolved: {}", reason)), 0),
                    );
                }
                aggregator.set_duration(start.elapsed().as_millis() as u64);
                return aggregator.to_report();
            }
            Resolution::Resolved(target) => target,
        };

        aggregator.set_metadata(environment, Some(target.to_string()));

        let connection = match self.manager.connect(&target).await {
            Ok(connection) => connection,
            Err(e) => {
                aggregator.abort(e.to_string());
                aggregator.set_duration(start.elapsed().as_millis() as u64);
                return aggregator.to_report();
            }
        };

        for spec in &selected {
            let check_start = Instant::now();
            let verdict = self.execute_check(spec, &connection).await;
            let duration_ms = check_start.elapsed().as_millis() as u64;
            debug!(check = spec.id, verdict = %verdict, duration_ms, "check finished");

            aggregator.add_result(spec.to_check(verdict, duration_ms));

            if self.config.fail_fast && aggregator.has_failures() {
                info!(check = spec.id, "stopping after first failure");
                break;
            }
        }

        aggregator.set_duration(start.elapsed().as_millis() as u64);
        aggregator.to_report()
    }

    /// Interpret one check against the connection
    async fn execute_check(&self, spec: &CheckSpec, connection: &Connection) -> Verdict {
        match spec.kind {
            CheckKind::Remote { commands, evaluate } => {
                let mut results = Vec::new();
                for command in commands(&self.suite) {
                    match connection.execute(&command, self.config.command_timeout).await {
                        Ok(result) => results.push(result),
                        Err(e) => return Verdict::fail(format!("connection-level failure: {}", e)),
                    }
                }
                evaluate(&results, &self.suite)
            }
            CheckKind::Probe { plan, evaluate } => {
                let plan = plan(&self.suite, connection.target());
                let batch = self.prober.probe(&plan).await;
                evaluate(&batch, &self.suite)
            }
            CheckKind::Reach { plan, evaluate } => {
                let plan = plan(&self.suite, connection.target());
                let batch = self.prober.reach(&plan).await;
                evaluate(&batch, &self.suite)
            }
        }
    }
}

fn listed(list: &[String], id: &str) -> bool {
    list.iter().any(|x| x.eq_ignore_ascii_case(id))
}
