//! Output formatting for host-preflight.
//!
//! Provides terminal, JSON, and JUnit XML output formatters.
//!
//! # Graceful Degradation
//!
//! This module handles errors gracefully:
//! - Non-TTY output: Color disabled via NO_COLOR or --no-color
//! - Empty reports: Produces valid output with zero checks
//! - Aborted runs: Reported as a single error entry instead of check rows
//! - Serialization failure: JSON output degrades to an error object
//!
//! All formatters produce valid output for any ValidationReport input.
//! No function in this module will panic.

use crate::cli::args::OutputFormat;
use crate::engine::result::{ExitPolicy, ResultSummary, RunStatus, ValidationReport};
use crate::{Check, CheckCategory, Verdict};
use chrono::SecondsFormat;
use serde::Serialize;

const RULE: &str = "--------------------------------------------------------------------------------";

/// Trait for output formatters
pub trait OutputFormatter {
    /// Format a validation report into a string
    fn format(&self, report: &ValidationReport) -> String;
}

/// Terminal (human-readable) formatter
pub struct TerminalFormatter {
    color: bool,
    verbose: bool,
    quiet: bool,
    policy: ExitPolicy,
}

impl TerminalFormatter {
    pub fn new(color: bool, verbose: bool, quiet: bool, policy: ExitPolicy) -> Self {
        TerminalFormatter {
            color,
            verbose,
            quiet,
            policy,
        }
    }

    fn colorize(&self, text: &str, color_code: &str) -> String {
        if self.color {
            format!("\x1b[{}m{}\x1b[0m", color_code, text)
        } else {
            text.to_string()
        }
    }

    fn green(&self, text: &str) -> String {
        self.colorize(text, "32")
    }

    fn red(&self, text: &str) -> String {
        self.colorize(text, "31")
    }

    fn gray(&self, text: &str) -> String {
        self.colorize(text, "90")
    }

    fn format_row(&self, check: &Check) -> String {
        let status = match &check.verdict {
            Some(Verdict::Pass { .. }) => self.green("[PASS]"),
            Some(Verdict::Fail { .. }) => self.red("[FAIL]"),
            Some(Verdict::Skip { .. }) => self.gray("[SKIP]"),
            None => self.gray("[----]"),
        };
        let detail = check
            .verdict
            .as_ref()
            .map(|v| v.detail().to_string())
            .unwrap_or_else(|| "not executed".to_string());
        let timing = if self.verbose {
            format!(" [{}ms]", check.duration_ms)
        } else {
            String::new()
        };
        format!("  {} {}: {} ({}){}\n", status, check.id, check.name, detail, timing)
    }
}

impl OutputFormatter for TerminalFormatter {
    fn format(&self, report: &ValidationReport) -> String {
        let mut output = String::new();

        output.push_str(RULE);
        output.push('\n');
        output.push_str("host-preflight verification report\n");
        if let Some(ref environment) = report.environment {
            output.push_str(&format!("Environment: {}\n", environment));
        }
        output.push_str(&format!(
            "Target: {}\n",
            report.target.as_deref().unwrap_or("unresolved")
        ));
        output.push_str(&format!("Timestamp: {}\n", format_timestamp(report)));
        output.push_str(RULE);
        output.push_str("\n\n");

        if let Some(ref reason) = report.aborted {
            output.push_str(&format!("{} {}\n\n", self.red("[ABORTED]"), reason));
        }

        for category in CheckCategory::ALL {
            let category_checks: Vec<_> = report
                .checks
                .iter()
                .filter(|c| c.category == category)
                .collect();

            let shown: Vec<_> = category_checks
                .into_iter()
                .filter(|c| !self.quiet || c.verdict.as_ref().is_some_and(Verdict::is_fail))
                .collect();

            if shown.is_empty() {
                continue;
            }

            output.push_str(&format!("{} CHECKS\n", category.to_string().to_uppercase()));
            for check in shown {
                output.push_str(&self.format_row(check));
            }
            output.push('\n');
        }

        let summary = report.summary();
        output.push_str(RULE);
        output.push('\n');
        output.push_str(&format!(
            "SUMMARY: {} passed, {} failed, {} skipped\n",
            summary.passed, summary.failed, summary.skipped
        ));
        output.push_str(&format!(
            "Total time: {:.1}s\n",
            report.total_duration_ms as f64 / 1000.0
        ));
        output.push_str(&format!(
            "Exit code: {} ({})\n",
            report.exit_code(&self.policy),
            report.exit_description(&self.policy)
        ));
        output.push_str(RULE);

        output
    }
}

/// JSON formatter
pub struct JsonFormatter {
    pretty: bool,
    policy: ExitPolicy,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    report: &'a ValidationReport,
    status: RunStatus,
    exit_code: u8,
    summary: ResultSummary,
}

impl JsonFormatter {
    pub fn new(pretty: bool, policy: ExitPolicy) -> Self {
        JsonFormatter { pretty, policy }
    }
}

impl OutputFormatter for JsonFormatter {
    fn format(&self, report: &ValidationReport) -> String {
        let document = JsonReport {
            report,
            status: report.status(),
            exit_code: report.exit_code(&self.policy),
            summary: report.summary(),
        };
        let rendered = if self.pretty {
            serde_json::to_string_pretty(&document)
        } else {
            serde_json::to_string(&document)
        };
        rendered.unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
    }
}

/// JUnit XML formatter
pub struct JunitFormatter;

impl JunitFormatter {
    pub fn new() -> Self {
        JunitFormatter
    }

    fn escape_xml(s: &str) -> String {
        let mut result = String::with_capacity(s.len());
        for c in s.chars() {
            match c {
                '&' => result.push_str("&amp;"),
                '<' => result.push_str("&lt;"),
                '>' => result.push_str("&gt;"),
                '"' => result.push_str("&quot;"),
                '\'' => result.push_str("&apos;"),
                c => result.push(c),
            }
        }
        result
    }
}

impl Default for JunitFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputFormatter for JunitFormatter {
    fn format(&self, report: &ValidationReport) -> String {
        let mut output = String::new();
        output.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");

        let summary = report.summary();
        let errors = usize::from(report.aborted.is_some());
        output.push_str(&format!(
            "<testsuites tests=\"{}\" failures=\"{}\" errors=\"{}\" skipped=\"{}\" time=\"{:.3}\">\n",
            summary.total as usize + errors,
            summary.failed,
            errors,
            summary.skipped,
            report.total_duration_ms as f64 / 1000.0
        ));

        if let Some(ref reason) = report.aborted {
            output.push_str("  <testsuite name=\"connection\" tests=\"1\" failures=\"0\" errors=\"1\" skipped=\"0\" time=\"0.000\">\n");
            output.push_str("    <testcase name=\"connect\" classname=\"host-preflight.connection\" time=\"0.000\">\n");
            output.push_str(&format!(
                "      <error message=\"{}\" />\n",
                Self::escape_xml(reason)
            ));
            output.push_str("    </testcase>\n");
            output.push_str("  </testsuite>\n");
        }

        for category in CheckCategory::ALL {
            let category_checks: Vec<_> = report
                .checks
                .iter()
                .filter(|c| c.category == category)
                .collect();

            if category_checks.is_empty() {
                continue;
            }

            let suite_name = category.to_string().to_lowercase();
            let suite_failures = category_checks
                .iter()
                .filter(|c| matches!(&c.verdict, Some(Verdict::Fail { .. })))
                .count();
            let suite_skipped = category_checks
                .iter()
                .filter(|c| matches!(&c.verdict, Some(Verdict::Skip { .. }) | None))
                .count();
            let suite_time: u64 = category_checks.iter().map(|c| c.duration_ms).sum();

            output.push_str(&format!(
                "  <testsuite name=\"{}\" tests=\"{}\" failures=\"{}\" errors=\"0\" skipped=\"{}\" time=\"{:.3}\">\n",
                suite_name,
                category_checks.len(),
                suite_failures,
                suite_skipped,
                suite_time as f64 / 1000.0
            ));

            for check in category_checks {
                output.push_str(&format!(
                    "    <testcase name=\"{}\" classname=\"host-preflight.{}\" time=\"{:.3}\"",
                    Self::escape_xml(&check.id),
                    suite_name,
                    check.duration_ms as f64 / 1000.0
                ));

                match &check.verdict {
                    Some(Verdict::Pass { message }) => {
                        output.push_str(">\n");
                        output.push_str(&format!(
                            "      <system-out>{}</system-out>\n",
                            Self::escape_xml(message)
                        ));
                        output.push_str("    </testcase>\n");
                    }
                    Some(Verdict::Fail { reason }) => {
                        output.push_str(">\n");
                        output.push_str(&format!(
                            "      <failure message=\"{}\">{}</failure>\n",
                            Self::escape_xml(reason),
                            Self::escape_xml(&check.name)
                        ));
                        output.push_str("    </testcase>\n");
                    }
                    Some(Verdict::Skip { reason }) => {
                        output.push_str(">\n");
                        output.push_str(&format!(
                            "      <skipped message=\"{}\" />\n",
                            Self::escape_xml(reason)
                        ));
                        output.push_str("    </testcase>\n");
                    }
                    None => {
                        output.push_str(" />\n");
                    }
                }
            }

            output.push_str("  </testsuite>\n");
        }

        output.push_str("</testsuites>");
        output
    }
}

/// Get a formatter based on the output format
pub fn get_formatter(
    format: &OutputFormat,
    no_color: bool,
    verbose: bool,
    quiet: bool,
    policy: ExitPolicy,
) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Text => Box::new(TerminalFormatter::new(!no_color, verbose, quiet, policy)),
        OutputFormat::Json => Box::new(JsonFormatter::new(true, policy)),
        OutputFormat::Junit => Box::new(JunitFormatter::new()),
    }
}

fn format_timestamp(report: &ValidationReport) -> String {
    report.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}
