//! Log analysis checks.
//!
//! Error-priority journal entries are filtered through an allow-list of
//! known-benign substrings before they are counted; the check fails once the
//! remaining count reaches the configured threshold.

use crate::checks::{missing_output, shell_quote, CheckKind, CheckSpec};
use crate::config::SuiteConfig;
use crate::platform::ssh::CommandResult;
use crate::{CheckCategory, Verdict};
use serde::{Deserialize, Serialize};

/// Substrings marking log lines as benign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllowList(Vec<String>);

impl AllowList {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AllowList(entries.into_iter().map(Into::into).collect())
    }

    /// Whether any entry occurs in `line`
    pub fn is_allowed(&self, line: &str) -> bool {
        self.0
            .iter()
            .any(|entry| !entry.is_empty() && line.contains(entry.as_str()))
    }
}

impl Default for AllowList {
    /// Journal chatter seen on healthy cloud VMs
    fn default() -> Self {
        AllowList::new([
            "-- No entries --",
            "-- Logs begin at",
            "hv_balloon",
            "WALinuxAgent",
            "cloud-init",
            "pam_unix(sudo:auth)",
        ])
    }
}

/// Outcome of applying an allow-list to a set of log lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoiseCount<'a> {
    pub total: usize,
    pub allowed: usize,
    pub noisy: Vec<&'a str>,
}

/// Count non-allow-listed lines; blank lines are ignored
pub fn count_noise<'a>(lines: impl IntoIterator<Item = &'a str>, allow_list: &AllowList) -> NoiseCount<'a> {
    let mut count = NoiseCount {
        total: 0,
        allowed: 0,
        noisy: Vec::new(),
    };
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        count.total += 1;
        if allow_list.is_allowed(line) {
            count.allowed += 1;
        } else {
            count.noisy.push(line);
        }
    }
    count
}

pub fn specs() -> Vec<CheckSpec> {
    vec![
        CheckSpec {
            id: "LOG-001",
            name: "Log Noise",
            category: CheckCategory::Logs,
            description: "Recent error-priority journal entries stay below the noise threshold",
            kind: CheckKind::Remote {
                commands: noise_commands,
                evaluate: evaluate_noise,
            },
        },
        CheckSpec {
            id: "LOG-002",
            name: "Recent Log Activity",
            category: CheckCategory::Logs,
            description: "Log files were written within the last day",
            kind: CheckKind::Remote {
                commands: activity_commands,
                evaluate: evaluate_activity,
            },
        },
    ]
}

pub fn noise_commands(config: &SuiteConfig) -> Vec<String> {
    let window = shell_quote(&config.logs.window);
    vec![
        config.privileged(&format!(
            "journalctl --since {} --priority err --no-pager --quiet",
            window
        )),
        // grep -c exits 1 on zero matches but still prints 0
        format!(
            "{} | grep -c 'Failed password' || true",
            config.privileged(&format!(
                "journalctl _COMM=sshd --since {} --no-pager --quiet",
                window
            ))
        ),
    ]
}

pub fn evaluate_noise(results: &[CommandResult], config: &SuiteConfig) -> Verdict {
    let [journal, failed_auth, ..] = results else {
        return missing_output(2, results.len());
    };
    if !journal.success() {
        return Verdict::skip(format!("journal unavailable: {}", journal.exit_summary()));
    }

    let policy = &config.logs;
    let noise = count_noise(journal.stdout.lines(), &policy.allow_list);
    let failed_logins = failed_auth.output().parse::<u64>().ok();

    if let Some(limit) = policy.max_failed_auth {
        match failed_logins {
            Some(count) if count >= limit => {
                return Verdict::fail(format!(
                    "{} failed SSH password attempts since {}, limit {}",
                    count, policy.window, limit
                ))
            }
            Some(_) => {}
            None => {
                return Verdict::skip(format!(
                    "unparseable failed-login count '{}'",
                    failed_auth.output()
                ))
            }
        }
    }

    let failed_note = failed_logins
        .map(|count| format!(", {} failed SSH password attempts", count))
        .unwrap_or_default();

    if noise.noisy.len() >= policy.noise_threshold {
        Verdict::fail(format!(
            "{} unexpected error lines since {} (threshold {}), first: {}{}",
            noise.noisy.len(),
            policy.window,
            policy.noise_threshold,
            noise.noisy.first().copied().unwrap_or_default(),
            failed_note
        ))
    } else {
        Verdict::pass(format!(
            "{} error lines ({} allow-listed){}",
            noise.total, noise.allowed, failed_note
        ))
    }
}

pub fn activity_commands(config: &SuiteConfig) -> Vec<String> {
    vec![format!(
        "find {} -name '*.log' -mtime -1 2>/dev/null | wc -l",
        shell_quote(&config.logs.log_dir)
    )]
}

pub fn evaluate_activity(results: &[CommandResult], config: &SuiteConfig) -> Verdict {
    let Some(count) = results.first() else {
        return missing_output(1, 0);
    };
    match count.output().parse::<u64>() {
        Ok(0) => Verdict::fail(format!(
            "no log files under {} written in the last day",
            config.logs.log_dir
        )),
        Ok(n) => Verdict::pass(format!("{} log files written in the last day", n)),
        Err(_) => Verdict::skip(format!("unparseable file count '{}'", count.output())),
    }
}
