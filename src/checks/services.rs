//! Service state checks.

use crate::checks::{missing_output, shell_quote, CheckKind, CheckSpec};
use crate::config::SuiteConfig;
use crate::platform::ssh::CommandResult;
use crate::{CheckCategory, Verdict};

pub fn specs() -> Vec<CheckSpec> {
    vec![
        CheckSpec {
            id: "SVC-001",
            name: "Critical Services",
            category: CheckCategory::Services,
            description: "Required services are active and enabled at boot",
            kind: CheckKind::Remote {
                commands: critical_commands,
                evaluate: evaluate_critical,
            },
        },
        CheckSpec {
            id: "SVC-002",
            name: "Legacy Services Disabled",
            category: CheckCategory::Services,
            description: "Cleartext remote-access services are not enabled",
            kind: CheckKind::Remote {
                commands: forbidden_commands,
                evaluate: evaluate_forbidden,
            },
        },
        CheckSpec {
            id: "SVC-003",
            name: "Time Synchronization",
            category: CheckCategory::Services,
            description: "chrony is tracking a time source with a small offset",
            kind: CheckKind::Remote {
                commands: time_sync_commands,
                evaluate: evaluate_time_sync,
            },
        },
    ]
}

/// `is-active` for each required service, then `is-enabled` for each boot service
pub fn critical_commands(config: &SuiteConfig) -> Vec<String> {
    let active = config
        .services
        .required_active
        .iter()
        .map(|s| format!("systemctl is-active {}", shell_quote(s)));
    let enabled = config
        .services
        .required_enabled
        .iter()
        .map(|s| format!("systemctl is-enabled {}", shell_quote(s)));
    active.chain(enabled).collect()
}

pub fn evaluate_critical(results: &[CommandResult], config: &SuiteConfig) -> Verdict {
    let policy = &config.services;
    let expected = policy.required_active.len() + policy.required_enabled.len();
    if results.len() < expected {
        return missing_output(expected, results.len());
    }
    if expected == 0 {
        return Verdict::pass("no services required");
    }

    let (active_results, enabled_results) = results.split_at(policy.required_active.len());

    let inactive: Vec<&str> = policy
        .required_active
        .iter()
        .zip(active_results)
        .filter(|(_, r)| !(r.success() && r.output() == "active"))
        .map(|(s, _)| s.as_str())
        .collect();

    let not_enabled: Vec<&str> = policy
        .required_enabled
        .iter()
        .zip(enabled_results)
        .filter(|(_, r)| !(r.success() && r.output() == "enabled"))
        .map(|(s, _)| s.as_str())
        .collect();

    let mut problems = Vec::new();
    if !inactive.is_empty() {
        problems.push(format!("inactive: {}", inactive.join(", ")));
    }
    if !not_enabled.is_empty() {
        problems.push(format!("not enabled at boot: {}", not_enabled.join(", ")));
    }

    if problems.is_empty() {
        Verdict::pass(format!(
            "{} active and enabled",
            policy.required_active.join(", ")
        ))
    } else {
        Verdict::fail(problems.join("; "))
    }
}

pub fn forbidden_commands(config: &SuiteConfig) -> Vec<String> {
    config
        .services
        .forbidden
        .iter()
        .map(|s| format!("systemctl is-enabled {} 2>/dev/null || echo not-found", shell_quote(s)))
        .collect()
}

pub fn evaluate_forbidden(results: &[CommandResult], config: &SuiteConfig) -> Verdict {
    let forbidden = &config.services.forbidden;
    if results.len() < forbidden.len() {
        return missing_output(forbidden.len(), results.len());
    }

    let enabled: Vec<&str> = forbidden
        .iter()
        .zip(results)
        .filter(|(_, r)| r.lines().next() == Some("enabled"))
        .map(|(s, _)| s.as_str())
        .collect();

    if enabled.is_empty() {
        Verdict::pass(format!("none of {} enabled", forbidden.join(", ")))
    } else {
        Verdict::fail(format!("legacy services enabled: {}", enabled.join(", ")))
    }
}

pub fn time_sync_commands(_config: &SuiteConfig) -> Vec<String> {
    vec!["chronyc tracking".to_string()]
}

pub fn evaluate_time_sync(results: &[CommandResult], config: &SuiteConfig) -> Verdict {
    let Some(tracking) = results.first() else {
        return missing_output(1, 0);
    };
    if !tracking.success() {
        return Verdict::fail(tracking.exit_summary());
    }

    let field = |name: &str| {
        tracking.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            (key.trim() == name).then(|| value.trim().to_string())
        })
    };

    if let Some(leap) = field("Leap status") {
        if leap.eq_ignore_ascii_case("not synchronised") {
            return Verdict::fail("chrony reports leap status 'Not synchronised'");
        }
    }

    // "0.000012345 seconds fast of NTP time"
    let limit = config.performance.max_clock_offset_secs;
    match field("System time") {
        Some(text) => match text.split_whitespace().next().and_then(|v| v.parse::<f64>().ok()) {
            Some(offset) if offset.abs() >= limit => Verdict::fail(format!(
                "clock offset {:.3}s, limit {:.3}s",
                offset.abs(),
                limit
            )),
            Some(offset) => Verdict::pass(format!("synchronized, offset {:.6}s", offset.abs())),
            None => Verdict::skip(format!("unparseable system time '{}'", text)),
        },
        None => Verdict::pass("chrony tracking reachable (no offset reported)"),
    }
}
