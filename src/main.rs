//! host-preflight CLI entry point
//!
//! Post-deployment verification of a remote host over SSH.

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use host_preflight::checks::specs_by_category;
use host_preflight::cli::args::{Args, Command};
use host_preflight::cli::output::get_formatter;
use host_preflight::config::SuiteConfig;
use host_preflight::engine::result::EXIT_USAGE;
use host_preflight::version::get_build_info;
use host_preflight::{run_preflight, CheckCategory, PreflightConfig};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(EXIT_USAGE),
            };
        }
    };

    init_logging(args.verbose);

    match args.command() {
        Command::Version => {
            println!("{}", get_build_info());
            ExitCode::SUCCESS
        }
        Command::List => {
            print_check_list();
            ExitCode::SUCCESS
        }
        Command::Check => run_checks(&args).await,
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_env("HOST_PREFLIGHT_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_check_list() {
    println!("Available checks:");
    for category in CheckCategory::ALL {
        println!();
        println!("{} CHECKS:", category.to_string().to_uppercase());
        for spec in specs_by_category(category) {
            println!("  {:<9}{}", spec.id, spec.name);
        }
    }
}

fn load_config(args: &Args) -> Result<SuiteConfig> {
    match args.config {
        Some(ref path) => SuiteConfig::load(path)
            .with_context(|| format!("failed to load suite configuration from {}", path.display())),
        None => Ok(SuiteConfig::default()),
    }
}

async fn run_checks(args: &Args) -> ExitCode {
    let suite = match load_config(args) {
        Ok(suite) => suite,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let config = PreflightConfig::from_args(args, suite);
    let policy = config.exit_policy;

    let report = match run_preflight(config).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error running checks: {}", e);
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let summary = report.summary();
    info!(
        passed = summary.passed,
        failed = summary.failed,
        skipped = summary.skipped,
        aborted = report.aborted.is_some(),
        "run finished"
    );

    let formatter = get_formatter(&args.format, !args.color_enabled(), args.verbose, args.quiet, policy);
    println!("{}", formatter.format(&report));

    ExitCode::from(report.exit_code(&policy))
}
