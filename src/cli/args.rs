//! Command line arguments for host-preflight.

use crate::config::Patience;
use crate::CheckCategory;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "host-preflight")]
#[command(version)]
#[command(about = "Post-deployment verification of a remote host over SSH", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Environment name; also the preferred inventory group
    #[arg(short, long, global = true, env = "HOST_PREFLIGHT_ENV")]
    pub env: Option<String>,

    /// Target address, overriding the environment and the inventory
    #[arg(short, long, global = true)]
    pub target: Option<String>,

    /// Remote user
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    /// SSH port
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Inventory file
    #[arg(long, global = true)]
    pub inventory: Option<PathBuf>,

    /// Environment variable holding the target address
    #[arg(long, global = true)]
    pub address_env: Option<String>,

    /// Suite configuration file (YAML)
    #[arg(short, long, global = true, env = "HOST_PREFLIGHT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Connection retry budget
    #[arg(long, value_enum, global = true)]
    pub patience: Option<Patience>,

    /// Category to run
    #[arg(long, value_enum, global = true, default_value_t = CategoryFilter::All)]
    pub category: CategoryFilter,

    /// Run only this check (repeatable)
    #[arg(long, global = true)]
    pub only: Vec<String>,

    /// Skip this check (repeatable)
    #[arg(long, global = true)]
    pub skip: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum, global = true, env = "HOST_PREFLIGHT_FORMAT", default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Per-command timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Stop on first failure
    #[arg(long, global = true)]
    pub fail_fast: bool,

    /// Exit non-zero when every check was skipped
    #[arg(long, global = true)]
    pub fail_if_all_skipped: bool,

    /// Only print failures
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print passing details and info-level logs
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run validation checks (default)
    Check,
    /// List all available checks
    List,
    /// Print version information
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable terminal output
    Text,
    /// Machine-readable JSON
    Json,
    /// JUnit XML for CI/CD integration
    Junit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CategoryFilter {
    All,
    Services,
    Security,
    Network,
    Logs,
    Performance,
}

impl CategoryFilter {
    /// Categories to run (None = all)
    pub fn categories(&self) -> Option<Vec<CheckCategory>> {
        let category = match self {
            CategoryFilter::All => return None,
            CategoryFilter::Services => CheckCategory::Services,
            CategoryFilter::Security => CheckCategory::Security,
            CategoryFilter::Network => CheckCategory::Network,
            CategoryFilter::Logs => CheckCategory::Logs,
            CategoryFilter::Performance => CheckCategory::Performance,
        };
        Some(vec![category])
    }
}

impl Args {
    /// Subcommand, defaulting to `check`
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Check)
    }

    /// Whether to emit ANSI colors; honors NO_COLOR
    pub fn color_enabled(&self) -> bool {
        !self.no_color && std::env::var_os("NO_COLOR").is_none()
    }
}
