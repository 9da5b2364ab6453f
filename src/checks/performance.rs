//! Performance baseline checks.
//!
//! Resource utilization is read remotely; latency and concurrency are measured
//! with HTTP probes and TCP connects from the machine running the preflight.
//! Every limit is a ceiling: an observed value equal to the limit fails.

use crate::checks::network::{endpoint_for, unreachable_verdict};
use crate::checks::{missing_output, parse_number, shell_quote, CheckKind, CheckSpec};
use crate::config::SuiteConfig;
use crate::platform::http::{ProbeBatch, ProbePlan, ReachBatch, ReachPlan};
use crate::platform::inventory::Target;
use crate::platform::ssh::CommandResult;
use crate::{CheckCategory, Verdict};

/// Get all performance checks
pub fn specs() -> Vec<CheckSpec> {
    vec![
        CheckSpec {
            id: "PERF-001",
            name: "Load Average",
            category: CheckCategory::Performance,
            description: "One-minute load average below the ceiling",
            kind: CheckKind::Remote {
                commands: load_commands,
                evaluate: evaluate_load,
            },
        },
        CheckSpec {
            id: "PERF-002",
            name: "Memory Utilization",
            category: CheckCategory::Performance,
            description: "Used memory below the ceiling",
            kind: CheckKind::Remote {
                commands: memory_commands,
                evaluate: evaluate_memory,
            },
        },
        CheckSpec {
            id: "PERF-003",
            name: "Disk Utilization",
            category: CheckCategory::Performance,
            description: "Root filesystem usage below the ceiling",
            kind: CheckKind::Remote {
                commands: disk_commands,
                evaluate: evaluate_disk,
            },
        },
        CheckSpec {
            id: "PERF-004",
            name: "Response Latency",
            category: CheckCategory::Performance,
            description: "Web endpoint responds within the latency ceiling",
            kind: CheckKind::Probe {
                plan: latency_plan,
                evaluate: evaluate_latency,
            },
        },
        CheckSpec {
            id: "PERF-005",
            name: "Concurrent Requests",
            category: CheckCategory::Performance,
            description: "Enough of a concurrent request batch succeeds",
            kind: CheckKind::Probe {
                plan: concurrency_plan,
                evaluate: evaluate_concurrency,
            },
        },
        CheckSpec {
            id: "PERF-006",
            name: "SSH Round Trip",
            category: CheckCategory::Performance,
            description: "A trivial remote command completes within the ceiling",
            kind: CheckKind::Remote {
                commands: roundtrip_commands,
                evaluate: evaluate_roundtrip,
            },
        },
        CheckSpec {
            id: "PERF-007",
            name: "Scratch Disk Write",
            category: CheckCategory::Performance,
            description: "A small synced write to /tmp succeeds and is cleaned up",
            kind: CheckKind::Remote {
                commands: scratch_commands,
                evaluate: evaluate_scratch,
            },
        },
        CheckSpec {
            id: "PERF-008",
            name: "Pending Updates",
            category: CheckCategory::Performance,
            description: "Upgradable package count below the ceiling",
            kind: CheckKind::Remote {
                commands: updates_commands,
                evaluate: evaluate_updates,
            },
        },
        CheckSpec {
            id: "PERF-009",
            name: "Network Latency",
            category: CheckCategory::Performance,
            description: "Mean TCP connect time from the runner to the SSH port below the ceiling",
            kind: CheckKind::Reach {
                plan: network_latency_plan,
                evaluate: evaluate_network_latency,
            },
        },
    ]
}

/// Verdict for an observed value against a ceiling
fn ceiling(what: &str, observed: f64, limit: f64, unit: &str, precision: usize) -> Verdict {
    if observed >= limit {
        Verdict::fail(format!(
            "{} {:.p$}{}, limit {:.p$}{}",
            what,
            observed,
            unit,
            limit,
            unit,
            p = precision
        ))
    } else {
        Verdict::pass(format!("{} {:.p$}{}", what, observed, unit, p = precision))
    }
}

// PERF-001

pub fn load_commands(_config: &SuiteConfig) -> Vec<String> {
    vec!["cat /proc/loadavg".to_string()]
}

pub fn evaluate_load(results: &[CommandResult], config: &SuiteConfig) -> Verdict {
    let Some(loadavg) = results.first() else {
        return missing_output(1, 0);
    };
    match parse_number(loadavg.output()) {
        Some(load) if loadavg.success() => {
            ceiling("load average", load, config.performance.max_load, "", 2)
        }
        _ => Verdict::skip(format!("unparseable load average '{}'", loadavg.output())),
    }
}

// PERF-002

pub fn memory_commands(_config: &SuiteConfig) -> Vec<String> {
    vec!["free -b".to_string()]
}

/// Used / total percentage from the `Mem:` row of `free`
pub fn memory_used_pct(free: &str) -> Option<f64> {
    let row = free.lines().find(|line| line.trim_start().starts_with("Mem:"))?;
    let mut fields = row.split_whitespace().skip(1);
    let total: f64 = fields.next()?.parse().ok()?;
    let used: f64 = fields.next()?.parse().ok()?;
    if total <= 0.0 {
        return None;
    }
    Some(used * 100.0 / total)
}

pub fn evaluate_memory(results: &[CommandResult], config: &SuiteConfig) -> Verdict {
    let Some(free) = results.first() else {
        return missing_output(1, 0);
    };
    match memory_used_pct(&free.stdout) {
        // Fractional, so one decimal keeps 84.6 from reading as the 85 limit
        Some(pct) => ceiling("memory usage", pct, config.performance.max_memory_pct, "%", 1),
        None => Verdict::skip("unparseable free output"),
    }
}

// PERF-003

pub fn disk_commands(_config: &SuiteConfig) -> Vec<String> {
    vec!["df -P /".to_string()]
}

/// Use% of the last row of `df -P`
pub fn disk_used_pct(df: &str) -> Option<f64> {
    let row = df.lines().filter(|l| !l.trim().is_empty()).last()?;
    let capacity = row.split_whitespace().nth(4)?;
    capacity.strip_suffix('%')?.parse().ok()
}

pub fn evaluate_disk(results: &[CommandResult], config: &SuiteConfig) -> Verdict {
    let Some(df) = results.first() else {
        return missing_output(1, 0);
    };
    match disk_used_pct(&df.stdout) {
        Some(pct) => ceiling("disk usage", pct, config.performance.max_disk_pct, "%", 0),
        None => Verdict::skip("unparseable df output"),
    }
}

// PERF-004

pub fn latency_plan(config: &SuiteConfig, target: &Target) -> ProbePlan {
    ProbePlan {
        warmup: true,
        ..ProbePlan::single(endpoint_for(config, target))
    }
}

pub fn evaluate_latency(batch: &ProbeBatch, config: &SuiteConfig) -> Verdict {
    if let Some(verdict) = unreachable_verdict(batch, config) {
        return verdict;
    }
    let Some(sample) = batch.results.iter().find(|s| s.status.is_some()) else {
        return Verdict::skip("no response recorded");
    };
    ceiling(
        "response time",
        sample.latency.as_secs_f64(),
        config.performance.max_response_secs,
        "s",
        2,
    )
}

// PERF-005

pub fn concurrency_plan(config: &SuiteConfig, target: &Target) -> ProbePlan {
    ProbePlan {
        endpoint: endpoint_for(config, target),
        concurrency: config.probe.concurrency,
        attempts: config.probe.attempts,
        warmup: false,
    }
}

pub fn evaluate_concurrency(batch: &ProbeBatch, config: &SuiteConfig) -> Verdict {
    if let Some(verdict) = unreachable_verdict(batch, config) {
        return verdict;
    }
    if batch.attempts == 0 {
        return Verdict::skip("no requests planned");
    }

    let successes = batch.successes();
    let min_ratio = config.probe.min_success_ratio;
    let summary = format!(
        "{}/{} requests succeeded ({:.0}%)",
        successes,
        batch.attempts,
        batch.success_ratio() * 100.0
    );
    // Compare counts so 8/10 against 0.8 is exact
    if successes as f64 + 1e-9 >= min_ratio * batch.attempts as f64 {
        Verdict::pass(summary)
    } else {
        Verdict::fail(format!("{}, minimum {:.0}%", summary, min_ratio * 100.0))
    }
}

// PERF-006

pub fn roundtrip_commands(_config: &SuiteConfig) -> Vec<String> {
    vec!["echo host-preflight-roundtrip".to_string()]
}

pub fn evaluate_roundtrip(results: &[CommandResult], config: &SuiteConfig) -> Verdict {
    let Some(echo) = results.first() else {
        return missing_output(1, 0);
    };
    if !echo.success() {
        return Verdict::fail(echo.exit_summary());
    }
    ceiling(
        "SSH round trip",
        echo.duration.as_secs_f64(),
        config.performance.max_ssh_roundtrip_secs,
        "s",
        2,
    )
}

// PERF-007

pub fn scratch_commands(config: &SuiteConfig) -> Vec<String> {
    let path = shell_quote(&config.performance.scratch_file);
    vec![format!(
        "dd if=/dev/zero of={path} bs=1M count={count} conv=fsync 2>&1; status=$?; rm -f {path}; exit $status",
        path = path,
        count = config.performance.scratch_size_mib
    )]
}

pub fn evaluate_scratch(results: &[CommandResult], _config: &SuiteConfig) -> Verdict {
    let Some(dd) = results.first() else {
        return missing_output(1, 0);
    };
    // "10485760 bytes (10 MB, 10 MiB) copied, 0.0213 s, 492 MB/s"
    let summary = dd.lines().find(|line| line.contains("copied"));
    if dd.success() {
        Verdict::pass(summary.unwrap_or("scratch write completed").to_string())
    } else {
        Verdict::fail(format!(
            "scratch write failed with {}: {}",
            dd.exit_code,
            dd.lines().last().unwrap_or("no output")
        ))
    }
}

// PERF-008

pub fn updates_commands(_config: &SuiteConfig) -> Vec<String> {
    vec!["apt list --upgradable 2>/dev/null | grep -c 'upgradable from' || true".to_string()]
}

pub fn evaluate_updates(results: &[CommandResult], config: &SuiteConfig) -> Verdict {
    let Some(count) = results.first() else {
        return missing_output(1, 0);
    };
    match count.output().parse::<u64>() {
        Ok(pending) => {
            let limit = config.performance.max_pending_updates;
            if pending >= limit {
                Verdict::fail(format!("{} pending updates, limit {}", pending, limit))
            } else {
                Verdict::pass(format!("{} pending updates", pending))
            }
        }
        Err(_) => Verdict::skip(format!("unparseable update count '{}'", count.output())),
    }
}

// PERF-009

pub fn network_latency_plan(config: &SuiteConfig, target: &Target) -> ReachPlan {
    ReachPlan {
        address: format!("{}:{}", target.url_host(), target.port),
        attempts: config.performance.latency_samples,
    }
}

pub fn evaluate_network_latency(batch: &ReachBatch, config: &SuiteConfig) -> Verdict {
    if batch.samples.is_empty() {
        return Verdict::skip("no connection attempts planned");
    }
    let failures = batch.failures();
    if failures > 0 {
        return Verdict::fail(format!(
            "{}/{} connections to {} failed: {}",
            failures,
            batch.samples.len(),
            batch.address,
            batch.first_error().unwrap_or("unknown error")
        ));
    }
    match batch.mean() {
        Some(mean) => ceiling(
            "average connect time",
            mean.as_secs_f64() * 1000.0,
            config.performance.max_network_latency_ms,
            "ms",
            1,
        ),
        None => Verdict::skip("no connection recorded"),
    }
}
