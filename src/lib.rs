//! host-preflight library
//!
//! Post-deployment verification of a remote host against an operational and
//! security baseline.
//!
//! A run resolves one target host, acquires an SSH channel to it with bounded
//! retries, executes a declarative table of checks over that channel (plus
//! concurrent HTTP probes against the host), and aggregates the verdicts into a
//! report and an exit code:
//! - Services: required daemons active and enabled, legacy daemons disabled, time sync
//! - Security: firewall, fail2ban jail, SSH hardening, kernel parameters,
//!   listening sockets, file permissions, privileged accounts
//! - Network: outbound connectivity, DNS, web endpoint
//! - Logs: error noise with an allow-list, recent log activity
//! - Performance: load, memory, disk, response latency, concurrent requests
//!
//! # Example
//!
//! ```no_run
//! use host_preflight::{run_preflight, PreflightConfig};
//!
//! # async fn demo() -> Result<(), host_preflight::PreflightError> {
//! let config = PreflightConfig {
//!     target: Some("10.0.0.4".to_string()),
//!     ..Default::default()
//! };
//! let report = run_preflight(config).await?;
//! println!("Checks passed: {}", report.summary().passed);
//! # Ok(())
//! # }
//! ```

pub mod checks;
pub mod cli;
pub mod config;
pub mod engine;
pub mod platform;
pub mod version;

use cli::args::Args;
use config::SuiteConfig;
use engine::orchestrator::{CheckOrchestrator, OrchestratorConfig};
use engine::result::{ExitPolicy, ValidationReport};
use platform::clock::{Clock, TokioClock};
use platform::connection::ConnectionManager;
use platform::http::{HttpProbeRunner, Prober};
use platform::inventory::{HostResolver, Resolution};
use platform::ssh::{SystemSsh, Transport};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Outcome of one check.
///
/// Construct failures through [`Verdict::fail`] so the reason is never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Verdict {
    /// The host meets the policy
    Pass { message: String },
    /// The host violates the policy
    Fail { reason: String },
    /// The check could not produce an answer (target unresolved, output unparseable, ...)
    Skip { reason: String },
}

impl Verdict {
    pub fn pass(message: impl Into<String>) -> Self {
        Verdict::Pass {
            message: message.into(),
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let reason = if reason.trim().is_empty() {
            "check failed without a reported reason".to_string()
        } else {
            reason
        };
        Verdict::Fail { reason }
    }

    pub fn skip(reason: impl Into<String>) -> Self {
        Verdict::Skip {
            reason: reason.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass { .. })
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Verdict::Fail { .. })
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Verdict::Skip { .. })
    }

    /// Message for a pass, reason for a fail or skip
    pub fn detail(&self) -> &str {
        match self {
            Verdict::Pass { message } => message,
            Verdict::Fail { reason } | Verdict::Skip { reason } => reason,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass { message } => write!(f, "PASS: {}", message),
            Verdict::Fail { reason } => write!(f, "FAIL: {}", reason),
            Verdict::Skip { reason } => write!(f, "SKIP: {}", reason),
        }
    }
}

/// Check category for grouping related checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CheckCategory {
    /// Daemon state and time synchronization
    Services,
    /// Firewall, SSH hardening, kernel, sockets, permissions, accounts
    Security,
    /// Outbound connectivity, DNS and the web endpoint
    Network,
    /// Journal noise and log activity
    Logs,
    /// Resource utilization and latency
    Performance,
}

impl CheckCategory {
    /// All categories in report order
    pub const ALL: [CheckCategory; 5] = [
        CheckCategory::Services,
        CheckCategory::Security,
        CheckCategory::Network,
        CheckCategory::Logs,
        CheckCategory::Performance,
    ];
}

impl fmt::Display for CheckCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckCategory::Services => write!(f, "Services"),
            CheckCategory::Security => write!(f, "Security"),
            CheckCategory::Network => write!(f, "Network"),
            CheckCategory::Logs => write!(f, "Logs"),
            CheckCategory::Performance => write!(f, "Performance"),
        }
    }
}

/// A check row in a report.
#[derive(Debug, Clone, Serialize)]
pub struct Check {
    /// Unique identifier (e.g., "SEC-003")
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Check category
    pub category: CheckCategory,
    /// Description of what this check validates
    pub description: String,
    /// Verdict (None if not yet executed)
    pub verdict: Option<Verdict>,
    /// Wall time spent on the check
    pub duration_ms: u64,
}

/// Error types for host-preflight operations.
#[derive(Debug, Error)]
pub enum PreflightError {
    /// The liveness probe never succeeded within the retry budget
    #[error("could not connect after {attempts} attempts: {last_error}")]
    ConnectionFailed { attempts: u32, last_error: String },

    /// The remote channel itself failed (not the remote command)
    #[error("transport failure running '{command}': {message}")]
    Transport { command: String, message: String },

    /// A remote command exceeded its timeout
    #[error("command '{command}' timed out after {timeout_ms}ms")]
    Timeout { command: String, timeout_ms: u64 },

    /// Inventory present but unreadable or malformed
    #[error("invalid inventory {path}: {message}")]
    Inventory { path: String, message: String },

    /// Suite configuration unreadable or malformed
    #[error("invalid configuration {path}: {message}")]
    Config { path: String, message: String },

    /// Address that cannot be handed to the SSH client
    #[error("invalid target address '{0}'")]
    InvalidTarget(String),

    /// HTTP client construction failed
    #[error("HTTP client error: {0}")]
    Http(String),
}

/// Configuration for a preflight run.
#[derive(Debug, Clone, Default)]
pub struct PreflightConfig {
    /// Environment name; also the preferred inventory group
    pub environment: Option<String>,
    /// Explicit target address (highest precedence)
    pub target: Option<String>,
    /// Remote principal override
    pub user: Option<String>,
    /// SSH port override
    pub port: Option<u16>,
    /// Policy values for every check
    pub suite: SuiteConfig,
    /// Categories to run (None = all)
    pub categories: Option<Vec<CheckCategory>>,
    /// Specific checks to skip (by ID)
    pub skip_checks: Vec<String>,
    /// Specific checks to run (by ID)
    pub only_checks: Vec<String>,
    /// Stop on first failure
    pub fail_fast: bool,
    /// How an all-skipped run maps to an exit code
    pub exit_policy: ExitPolicy,
}

impl PreflightConfig {
    /// Create configuration from command line arguments layered over a suite config
    pub fn from_args(args: &Args, mut suite: SuiteConfig) -> Self {
        if let Some(timeout) = args.timeout {
            suite.command_timeout_secs = timeout;
        }
        if let Some(patience) = args.patience {
            suite.connection.patience = patience;
            suite.connection.max_attempts = None;
            suite.connection.interval_secs = None;
        }
        if let Some(ref inventory) = args.inventory {
            suite.inventory.path = inventory.clone();
        }
        if let Some(ref var) = args.address_env {
            suite.inventory.address_env = var.clone();
        }

        PreflightConfig {
            environment: args.env.clone(),
            target: args.target.clone(),
            user: args.user.clone(),
            port: args.port,
            suite,
            categories: args.category.categories(),
            skip_checks: args.skip.clone(),
            only_checks: args.only.clone(),
            fail_fast: args.fail_fast,
            exit_policy: ExitPolicy {
                all_skipped_is_pass: !args.fail_if_all_skipped,
            },
        }
    }

    /// Host resolver reading the address environment variable now
    pub fn resolver(&self) -> HostResolver {
        HostResolver::from_env(&self.suite.inventory)
            .with_explicit(self.target.clone())
            .with_environment(self.environment.clone())
            .with_overrides(self.user.clone(), self.port)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            fail_fast: self.fail_fast,
            command_timeout: self.suite.command_timeout(),
            categories: self.categories.clone(),
            only_checks: self.only_checks.clone(),
            skip_checks: self.skip_checks.clone(),
        }
    }
}

/// Run a preflight against the real host.
///
/// Resolves the target, then connects with the system `ssh` client and probes
/// with an HTTP client. Returns `Err` only when the run cannot start (bad
/// inventory, bad target, HTTP client construction); an exhausted connection
/// budget is reported inside the returned [`ValidationReport`].
pub async fn run_preflight(config: PreflightConfig) -> Result<ValidationReport, PreflightError> {
    let resolution = config.resolver().resolve()?;
    let transport: Arc<dyn Transport> = Arc::new(SystemSsh::from_settings(&config.suite.connection));
    let clock: Arc<dyn Clock> = Arc::new(TokioClock);
    let prober: Arc<dyn Prober> = Arc::new(HttpProbeRunner::new(Duration::from_secs(
        config.suite.probe.request_timeout_secs,
    ))?);

    Ok(run_preflight_with(&config, resolution, transport, clock, prober).await)
}

/// Run a preflight with injected collaborators.
pub async fn run_preflight_with(
    config: &PreflightConfig,
    resolution: Resolution,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    prober: Arc<dyn Prober>,
) -> ValidationReport {
    let manager = ConnectionManager::new(transport, clock, config.suite.connection.retry_policy());
    let mut orchestrator = CheckOrchestrator::new(
        config.orchestrator_config(),
        config.suite.clone(),
        manager,
        prober,
    );
    orchestrator.register_checks(checks::all_specs());
    orchestrator.run(resolution, config.environment.clone()).await
}
