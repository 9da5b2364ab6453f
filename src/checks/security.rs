//! Security posture checks.
//!
//! Firewall state, intrusion prevention, SSH daemon hardening, kernel network
//! parameters, listening sockets and their count, file permissions and
//! privileged accounts.

use crate::checks::{
    missing_output, parse_stat, shell_quote, stat_command, CheckKind, CheckSpec, StatOutput,
};
use crate::config::{SocketPolicy, SuiteConfig};
use crate::platform::ssh::CommandResult;
use crate::{CheckCategory, Verdict};

/// Get all security checks
pub fn specs() -> Vec<CheckSpec> {
    vec![
        CheckSpec {
            id: "SEC-001",
            name: "Firewall",
            category: CheckCategory::Security,
            description: "ufw is active, denies incoming by default and allows SSH",
            kind: CheckKind::Remote {
                commands: firewall_commands,
                evaluate: evaluate_firewall,
            },
        },
        CheckSpec {
            id: "SEC-002",
            name: "Intrusion Prevention",
            category: CheckCategory::Security,
            description: "fail2ban is running with the SSH jail loaded and configured",
            kind: CheckKind::Remote {
                commands: jail_commands,
                evaluate: evaluate_jail,
            },
        },
        CheckSpec {
            id: "SEC-003",
            name: "SSH Hardening",
            category: CheckCategory::Security,
            description: "sshd_config carries the required hardening directives",
            kind: CheckKind::Remote {
                commands: sshd_commands,
                evaluate: evaluate_sshd,
            },
        },
        CheckSpec {
            id: "SEC-004",
            name: "Kernel Parameters",
            category: CheckCategory::Security,
            description: "Network sysctl values match the hardened baseline",
            kind: CheckKind::Remote {
                commands: kernel_commands,
                evaluate: evaluate_kernel,
            },
        },
        CheckSpec {
            id: "SEC-005",
            name: "Listening Sockets",
            category: CheckCategory::Security,
            description: "Only allowed ports listen on non-loopback addresses",
            kind: CheckKind::Remote {
                commands: socket_commands,
                evaluate: evaluate_sockets,
            },
        },
        CheckSpec {
            id: "SEC-006",
            name: "File Permissions",
            category: CheckCategory::Security,
            description: "Account and SSH files carry exactly the expected modes",
            kind: CheckKind::Remote {
                commands: file_mode_commands,
                evaluate: evaluate_file_modes,
            },
        },
        CheckSpec {
            id: "SEC-007",
            name: "Privileged Accounts",
            category: CheckCategory::Security,
            description: "root is the only UID 0 account and no account has an empty password",
            kind: CheckKind::Remote {
                commands: account_commands,
                evaluate: evaluate_accounts,
            },
        },
        CheckSpec {
            id: "SEC-008",
            name: "Root Account Locked",
            category: CheckCategory::Security,
            description: "root has no usable password",
            kind: CheckKind::Remote {
                commands: root_lock_commands,
                evaluate: evaluate_root_lock,
            },
        },
        CheckSpec {
            id: "SEC-009",
            name: "Log File Permissions",
            category: CheckCategory::Security,
            description: "Security logs are not world-readable",
            kind: CheckKind::Remote {
                commands: log_permission_commands,
                evaluate: evaluate_log_permissions,
            },
        },
        CheckSpec {
            id: "SEC-010",
            name: "Cron File Ownership",
            category: CheckCategory::Security,
            description: "Cron files are owned by root and not group or world writable",
            kind: CheckKind::Remote {
                commands: cron_commands,
                evaluate: evaluate_cron,
            },
        },
        CheckSpec {
            id: "SEC-011",
            name: "Listening Socket Count",
            category: CheckCategory::Security,
            description: "Fewer LISTEN sockets than the ceiling",
            kind: CheckKind::Remote {
                commands: socket_commands,
                evaluate: evaluate_listener_count,
            },
        },
    ]
}

// SEC-001

pub fn firewall_commands(config: &SuiteConfig) -> Vec<String> {
    vec![config.privileged("ufw status verbose")]
}

pub fn evaluate_firewall(results: &[CommandResult], config: &SuiteConfig) -> Verdict {
    let Some(status) = results.first() else {
        return missing_output(1, 0);
    };
    if !status.success() {
        return Verdict::fail(status.exit_summary());
    }

    let text = status.stdout.to_lowercase();
    let mut problems = Vec::new();

    if !text.contains("status: active") {
        problems.push("firewall is not active".to_string());
    }
    if !text.contains("default: deny (incoming)") {
        problems.push("default incoming policy is not deny".to_string());
    }
    if config.firewall.require_management_rule
        && !config
            .firewall
            .management_rule_markers
            .iter()
            .any(|marker| text.contains(&marker.to_lowercase()))
    {
        problems.push("no rule allows the SSH management port".to_string());
    }

    if problems.is_empty() {
        Verdict::pass("active, deny incoming by default, SSH allowed")
    } else {
        Verdict::fail(problems.join("; "))
    }
}

// SEC-002

pub fn jail_commands(config: &SuiteConfig) -> Vec<String> {
    let policy = &config.intrusion;
    let mut commands = vec![
        config.privileged("fail2ban-client status"),
        config.privileged(&format!("fail2ban-client status {}", shell_quote(&policy.jail))),
    ];
    if let Some(ref path) = policy.jail_config {
        let section = format!("^[[:space:]]*\\[{}\\]", policy.jail);
        commands.push(format!(
            "{} && echo present || echo absent",
            config.privileged(&format!("grep -Eq {} {}", shell_quote(&section), shell_quote(path)))
        ));
    }
    commands
}

pub fn evaluate_jail(results: &[CommandResult], config: &SuiteConfig) -> Verdict {
    let policy = &config.intrusion;
    let expected = 2 + usize::from(policy.jail_config.is_some());
    if results.len() < expected {
        return missing_output(expected, results.len());
    }
    let (server, jail) = (&results[0], &results[1]);
    if !server.success() {
        return Verdict::fail(format!("fail2ban not responding: {}", server.exit_summary()));
    }
    if !jail.success() {
        return Verdict::fail(format!(
            "jail {} not loaded: {}",
            config.intrusion.jail,
            jail.exit_summary()
        ));
    }
    if !jail
        .stdout
        .contains(&format!("Status for the jail: {}", policy.jail))
    {
        return Verdict::fail(format!("unexpected status output for jail {}", policy.jail));
    }
    if let (Some(path), Some(section)) = (&policy.jail_config, results.get(2)) {
        if section.output() != "present" {
            return Verdict::fail(format!("no [{}] section in {}", policy.jail, path));
        }
    }

    // "   |- Currently banned: 2"
    let banned = jail.lines().find_map(|line| {
        line.split_once("Currently banned:")
            .and_then(|(_, count)| count.trim().parse::<u64>().ok())
    });
    match banned {
        Some(count) => Verdict::pass(format!(
            "jail {} active, {} address(es) currently banned",
            config.intrusion.jail, count
        )),
        None => Verdict::pass(format!("jail {} active", config.intrusion.jail)),
    }
}

// SEC-003

pub fn sshd_commands(config: &SuiteConfig) -> Vec<String> {
    vec![config.privileged(&format!("cat {}", shell_quote(&config.ssh.config_path)))]
}

fn normalize_directive(line: &str) -> String {
    line.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Value sshd applies for `keyword`, lowercased.
///
/// sshd keeps the first value it reads for a keyword, and lines after the
/// first `Match` only apply to matching connections.
pub fn effective_value(sshd_config: &str, keyword: &str) -> Option<String> {
    let keyword = keyword.to_lowercase();
    for line in sshd_config.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let normalized = normalize_directive(line);
        let (key, value) = normalized
            .split_once(' ')
            .unwrap_or((normalized.as_str(), ""));
        if key == "match" {
            return None;
        }
        if key == keyword {
            return Some(value.to_string());
        }
    }
    None
}

/// Whether the effective setting satisfies `directive`.
///
/// A bare keyword only requires the keyword to be set.
pub fn has_directive(sshd_config: &str, directive: &str) -> bool {
    let wanted = normalize_directive(directive);
    if wanted.is_empty() {
        return true;
    }
    let (keyword, expected) = wanted.split_once(' ').unwrap_or((wanted.as_str(), ""));
    match effective_value(sshd_config, keyword) {
        Some(value) => expected.is_empty() || value == expected,
        None => false,
    }
}

pub fn evaluate_sshd(results: &[CommandResult], config: &SuiteConfig) -> Verdict {
    let Some(content) = results.first() else {
        return missing_output(1, 0);
    };
    if !content.success() {
        return Verdict::fail(format!(
            "cannot read {}: {}",
            config.ssh.config_path,
            content.exit_summary()
        ));
    }

    let missing: Vec<&str> = config
        .ssh
        .required_directives
        .iter()
        .filter(|d| !has_directive(&content.stdout, d))
        .map(String::as_str)
        .collect();

    if missing.is_empty() {
        Verdict::pass(format!(
            "{} required directives present",
            config.ssh.required_directives.len()
        ))
    } else {
        Verdict::fail(format!("missing directives: {}", missing.join(", ")))
    }
}

// SEC-004

pub fn kernel_commands(config: &SuiteConfig) -> Vec<String> {
    config
        .kernel
        .expected
        .keys()
        .map(|key| format!("sysctl -n {}", shell_quote(key)))
        .collect()
}

pub fn evaluate_kernel(results: &[CommandResult], config: &SuiteConfig) -> Verdict {
    let expected = &config.kernel.expected;
    if results.len() < expected.len() {
        return missing_output(expected.len(), results.len());
    }

    let mut wrong = Vec::new();
    let mut absent = Vec::new();
    for ((key, want), result) in expected.iter().zip(results) {
        if !result.success() {
            absent.push(key.as_str());
            continue;
        }
        let got = result.output();
        if got != want.trim() {
            wrong.push(format!("{}={} (expected {})", key, got, want.trim()));
        }
    }

    if !wrong.is_empty() {
        return Verdict::fail(wrong.join(", "));
    }
    let checked = expected.len() - absent.len();
    if absent.is_empty() {
        Verdict::pass(format!("{} parameters as expected", checked))
    } else {
        Verdict::pass(format!(
            "{} parameters as expected, not present: {}",
            checked,
            absent.join(", ")
        ))
    }
}

// SEC-005

pub fn socket_commands(_config: &SuiteConfig) -> Vec<String> {
    vec!["ss -H -tuln".to_string()]
}

/// One listening socket from `ss -tuln`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListeningSocket {
    pub netid: String,
    pub address: String,
    pub port: u16,
}

impl ListeningSocket {
    /// Parse a data line: `Netid State Recv-Q Send-Q Local:Port Peer:Port`
    pub fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 5 {
            return None;
        }
        let (address, port) = fields[4].rsplit_once(':')?;
        Some(ListeningSocket {
            netid: fields[0].to_string(),
            address: address.to_string(),
            port: port.parse().ok()?,
        })
    }

    pub fn is_loopback(&self, policy: &SocketPolicy) -> bool {
        policy
            .loopback_markers
            .iter()
            .any(|marker| self.address.starts_with(marker.as_str()))
    }

    pub fn is_allowed(&self, policy: &SocketPolicy) -> bool {
        self.is_loopback(policy) || policy.allowed_ports.contains(&self.port)
    }
}

pub fn evaluate_sockets(results: &[CommandResult], config: &SuiteConfig) -> Verdict {
    let Some(listing) = results.first() else {
        return missing_output(1, 0);
    };
    if !listing.success() {
        return Verdict::fail(listing.exit_summary());
    }

    let policy = &config.sockets;
    let mut sockets = Vec::new();
    for line in listing.lines() {
        // Tolerate the header when -H is unsupported
        if line.starts_with("Netid") {
            continue;
        }
        match ListeningSocket::parse(line) {
            Some(socket) => sockets.push(socket),
            None => return Verdict::skip(format!("unparseable socket line '{}'", line)),
        }
    }

    let mut problems = Vec::new();
    let unexpected: Vec<String> = sockets
        .iter()
        .filter(|s| !s.is_allowed(policy))
        .map(|s| format!("{} {}:{}", s.netid, s.address, s.port))
        .collect();
    if !unexpected.is_empty() {
        problems.push(format!("unexpected listeners: {}", unexpected.join(", ")));
    }
    if !sockets
        .iter()
        .any(|s| s.port == policy.management_port && !s.is_loopback(policy))
    {
        problems.push(format!(
            "management port {} is not listening on a non-loopback address",
            policy.management_port
        ));
    }

    if problems.is_empty() {
        Verdict::pass(format!("{} listening sockets, all allowed", sockets.len()))
    } else {
        Verdict::fail(problems.join("; "))
    }
}

// SEC-011

pub fn evaluate_listener_count(results: &[CommandResult], config: &SuiteConfig) -> Verdict {
    let Some(listing) = results.first() else {
        return missing_output(1, 0);
    };
    if !listing.success() {
        return Verdict::fail(listing.exit_summary());
    }

    let listening = listing
        .lines()
        .filter(|line| line.split_whitespace().nth(1) == Some("LISTEN"))
        .count();
    let limit = config.sockets.max_listeners;
    if listening >= limit {
        Verdict::fail(format!("{} listening sockets, limit {}", listening, limit))
    } else {
        Verdict::pass(format!("{} listening sockets", listening))
    }
}

// SEC-006

pub fn file_mode_commands(config: &SuiteConfig) -> Vec<String> {
    config
        .files
        .modes
        .keys()
        .map(|path| stat_command(path, false))
        .collect()
}

pub fn evaluate_file_modes(results: &[CommandResult], config: &SuiteConfig) -> Verdict {
    let modes = &config.files.modes;
    if results.len() < modes.len() {
        return missing_output(modes.len(), results.len());
    }

    let mut wrong = Vec::new();
    let mut absent = Vec::new();
    for ((path, want), result) in modes.iter().zip(results) {
        let Ok(want_mode) = u32::from_str_radix(want.trim(), 8) else {
            return Verdict::skip(format!("invalid expected mode '{}' for {}", want, path));
        };
        match parse_stat(result) {
            Some(StatOutput::Absent) => absent.push(path.as_str()),
            Some(StatOutput::Present { mode, .. }) if mode != want_mode => {
                wrong.push(format!("{} mode {:o}, expected {:o}", path, mode, want_mode))
            }
            Some(StatOutput::Present { .. }) => {}
            None => return Verdict::skip(format!("unparseable stat output for {}", path)),
        }
    }

    if !wrong.is_empty() {
        Verdict::fail(wrong.join(", "))
    } else if absent.is_empty() {
        Verdict::pass(format!("{} files with expected modes", modes.len()))
    } else {
        Verdict::pass(format!(
            "{} files with expected modes, absent: {}",
            modes.len() - absent.len(),
            absent.join(", ")
        ))
    }
}

// SEC-007

pub fn account_commands(config: &SuiteConfig) -> Vec<String> {
    vec![
        "awk -F: '$3 == 0 {print $1}' /etc/passwd".to_string(),
        config.privileged("awk -F: '$2 == \"\" {print $1}' /etc/shadow"),
    ]
}

pub fn evaluate_accounts(results: &[CommandResult], _config: &SuiteConfig) -> Verdict {
    let [uid_zero, empty_passwords, ..] = results else {
        return missing_output(2, results.len());
    };
    if !uid_zero.success() {
        return Verdict::fail(uid_zero.exit_summary());
    }
    if !empty_passwords.success() {
        return Verdict::fail(format!("cannot read /etc/shadow: {}", empty_passwords.exit_summary()));
    }

    let mut problems = Vec::new();
    let privileged: Vec<&str> = uid_zero.lines().collect();
    if privileged != ["root"] {
        problems.push(format!("UID 0 accounts: {}", privileged.join(", ")));
    }
    let empty: Vec<&str> = empty_passwords.lines().collect();
    if !empty.is_empty() {
        problems.push(format!("accounts with empty password: {}", empty.join(", ")));
    }

    if problems.is_empty() {
        Verdict::pass("root is the only UID 0 account, no empty passwords")
    } else {
        Verdict::fail(problems.join("; "))
    }
}

// SEC-008

pub fn root_lock_commands(config: &SuiteConfig) -> Vec<String> {
    vec![config.privileged("awk -F: '$1 == \"root\" {print $2}' /etc/shadow")]
}

pub fn evaluate_root_lock(results: &[CommandResult], _config: &SuiteConfig) -> Verdict {
    let Some(entry) = results.first() else {
        return missing_output(1, 0);
    };
    if !entry.success() {
        return Verdict::fail(format!("cannot read /etc/shadow: {}", entry.exit_summary()));
    }
    match entry.lines().next() {
        None => Verdict::skip("no root entry in /etc/shadow"),
        Some(field) if field.starts_with('!') || field.starts_with('*') => {
            Verdict::pass("root password locked")
        }
        Some(_) => Verdict::fail("root account has a usable password"),
    }
}

// SEC-009

pub fn log_permission_commands(config: &SuiteConfig) -> Vec<String> {
    config
        .files
        .not_world_readable
        .iter()
        .map(|path| stat_command(path, false))
        .collect()
}

pub fn evaluate_log_permissions(results: &[CommandResult], config: &SuiteConfig) -> Verdict {
    let paths = &config.files.not_world_readable;
    if results.len() < paths.len() {
        return missing_output(paths.len(), results.len());
    }

    let mut readable = Vec::new();
    let mut present = 0;
    for (path, result) in paths.iter().zip(results) {
        match parse_stat(result) {
            Some(StatOutput::Absent) => {}
            Some(StatOutput::Present { mode, .. }) => {
                present += 1;
                if mode & 0o004 != 0 {
                    readable.push(format!("{} ({:o})", path, mode));
                }
            }
            None => return Verdict::skip(format!("unparseable stat output for {}", path)),
        }
    }

    if readable.is_empty() {
        Verdict::pass(format!("{} log files not world-readable", present))
    } else {
        Verdict::fail(format!("world-readable: {}", readable.join(", ")))
    }
}

// SEC-010

pub fn cron_commands(config: &SuiteConfig) -> Vec<String> {
    config
        .files
        .root_owned
        .iter()
        .map(|path| stat_command(path, true))
        .collect()
}

pub fn evaluate_cron(results: &[CommandResult], config: &SuiteConfig) -> Verdict {
    let paths = &config.files.root_owned;
    if results.len() < paths.len() {
        return missing_output(paths.len(), results.len());
    }

    let mut problems = Vec::new();
    let mut present = 0;
    for (path, result) in paths.iter().zip(results) {
        match parse_stat(result) {
            Some(StatOutput::Absent) => {}
            Some(StatOutput::Present { mode, owner }) => {
                present += 1;
                let owner = owner.unwrap_or_default();
                if owner != "root" {
                    problems.push(format!("{} owned by '{}'", path, owner));
                }
                if mode & 0o022 != 0 {
                    problems.push(format!("{} writable by group or others ({:o})", path, mode));
                }
            }
            None => return Verdict::skip(format!("unparseable stat output for {}", path)),
        }
    }

    if problems.is_empty() {
        Verdict::pass(format!("{} cron files root-owned and not writable by others", present))
    } else {
        Verdict::fail(problems.join("; "))
    }
}
