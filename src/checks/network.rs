//! Network reachability checks.

use crate::checks::{missing_output, shell_quote, CheckKind, CheckSpec};
use crate::config::SuiteConfig;
use crate::platform::http::{ProbeBatch, ProbePlan};
use crate::platform::inventory::Target;
use crate::platform::ssh::CommandResult;
use crate::{CheckCategory, Verdict};

pub fn specs() -> Vec<CheckSpec> {
    vec![
        CheckSpec {
            id: "NET-001",
            name: "Outbound Connectivity",
            category: CheckCategory::Network,
            description: "The host can reach an external address",
            kind: CheckKind::Remote {
                commands: ping_commands,
                evaluate: evaluate_ping,
            },
        },
        CheckSpec {
            id: "NET-002",
            name: "DNS Resolution",
            category: CheckCategory::Network,
            description: "The host resolves an external name",
            kind: CheckKind::Remote {
                commands: dns_commands,
                evaluate: evaluate_dns,
            },
        },
        CheckSpec {
            id: "NET-003",
            name: "Web Endpoint",
            category: CheckCategory::Network,
            description: "The web endpoint answers with an accepted status",
            kind: CheckKind::Probe {
                plan: web_plan,
                evaluate: evaluate_web,
            },
        },
    ]
}

pub fn ping_commands(config: &SuiteConfig) -> Vec<String> {
    vec![format!(
        "ping -c 3 -W 2 {}",
        shell_quote(&config.network.ping_target)
    )]
}

pub fn evaluate_ping(results: &[CommandResult], config: &SuiteConfig) -> Verdict {
    let Some(ping) = results.first() else {
        return missing_output(1, 0);
    };
    // "3 packets transmitted, 3 received, 0% packet loss, time 2003ms"
    let summary = ping.lines().find(|line| line.contains("packet loss"));
    if ping.success() {
        Verdict::pass(summary.unwrap_or("reply received").to_string())
    } else {
        Verdict::fail(format!(
            "no reply from {}{}",
            config.network.ping_target,
            summary.map(|s| format!(" ({})", s)).unwrap_or_default()
        ))
    }
}

pub fn dns_commands(config: &SuiteConfig) -> Vec<String> {
    vec![format!("getent hosts {}", shell_quote(&config.network.dns_name))]
}

pub fn evaluate_dns(results: &[CommandResult], config: &SuiteConfig) -> Verdict {
    let Some(lookup) = results.first() else {
        return missing_output(1, 0);
    };
    let address = lookup
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().next());
    match address {
        Some(address) if lookup.success() => {
            Verdict::pass(format!("{} resolves to {}", config.network.dns_name, address))
        }
        _ => Verdict::fail(format!("cannot resolve {}", config.network.dns_name)),
    }
}

/// Endpoint URL with the target address substituted
pub fn endpoint_for(config: &SuiteConfig, target: &Target) -> String {
    config.probe.url.replace("{address}", &target.url_host())
}

pub fn web_plan(config: &SuiteConfig, target: &Target) -> ProbePlan {
    ProbePlan::single(endpoint_for(config, target))
}

/// Skip verdict when the endpoint never answered and reachability is optional
pub(crate) fn unreachable_verdict(batch: &ProbeBatch, config: &SuiteConfig) -> Option<Verdict> {
    if batch.any_response() {
        return None;
    }
    let error = batch.first_error().unwrap_or("no response");
    if config.probe.require_reachable {
        Some(Verdict::fail(format!("{} unreachable: {}", batch.endpoint, error)))
    } else {
        Some(Verdict::skip(format!("{} not reachable: {}", batch.endpoint, error)))
    }
}

pub fn evaluate_web(batch: &ProbeBatch, config: &SuiteConfig) -> Verdict {
    if let Some(verdict) = unreachable_verdict(batch, config) {
        return verdict;
    }
    let Some(status) = batch.results.iter().find_map(|s| s.status) else {
        return Verdict::skip("no status recorded");
    };
    if config.probe.accepted_statuses.contains(&status) {
        Verdict::pass(format!("{} answered {}", batch.endpoint, status))
    } else {
        Verdict::fail(format!(
            "{} answered {}, accepted: {:?}",
            batch.endpoint, status, config.probe.accepted_statuses
        ))
    }
}
