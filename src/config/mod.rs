//! Suite configuration.
//!
//! Every policy value a check consults lives here. The defaults describe the
//! hardened baseline of a freshly provisioned Ubuntu VM; a YAML file may
//! override any subset of fields:
//!
//! ```yaml
//! services:
//!   required_active: [ssh, chrony]
//! performance:
//!   max_memory_pct: 90
//! logs:
//!   noise_threshold: 5
//!   allow_list: ["hv_balloon"]
//! ```
//!
//! # Graceful Degradation
//!
//! - Missing sections or fields: filled from defaults
//! - Unknown fields: ignored
//! - Unreadable or malformed file: `PreflightError::Config`, the run does not start

use crate::checks::logs::AllowList;
use crate::platform::connection::RetryPolicy;
use crate::PreflightError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Prefix for commands that need root, e.g. `sudo -n`; empty to run as-is
    pub privilege_prefix: String,
    /// Per-command timeout
    pub command_timeout_secs: u64,
    pub connection: ConnectionSettings,
    pub inventory: InventorySettings,
    pub services: ServicePolicy,
    pub firewall: FirewallPolicy,
    pub intrusion: IntrusionPolicy,
    pub ssh: SshPolicy,
    pub kernel: KernelPolicy,
    pub files: FilePolicy,
    pub sockets: SocketPolicy,
    pub logs: LogPolicy,
    pub performance: PerformanceLimits,
    pub probe: ProbeSettings,
    pub network: NetworkPolicy,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        SuiteConfig {
            privilege_prefix: "sudo -n".to_string(),
            command_timeout_secs: 30,
            connection: ConnectionSettings::default(),
            inventory: InventorySettings::default(),
            services: ServicePolicy::default(),
            firewall: FirewallPolicy::default(),
            intrusion: IntrusionPolicy::default(),
            ssh: SshPolicy::default(),
            kernel: KernelPolicy::default(),
            files: FilePolicy::default(),
            sockets: SocketPolicy::default(),
            logs: LogPolicy::default(),
            performance: PerformanceLimits::default(),
            probe: ProbeSettings::default(),
            network: NetworkPolicy::default(),
        }
    }
}

impl SuiteConfig {
    /// Load a suite configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self, PreflightError> {
        let content = std::fs::read_to_string(path).map_err(|e| PreflightError::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_yaml_str(&content).map_err(|message| PreflightError::Config {
            path: path.display().to_string(),
            message,
        })
    }

    /// Parse YAML text; an empty document yields the defaults
    pub fn from_yaml_str(content: &str) -> Result<Self, String> {
        if content.trim().is_empty() {
            return Ok(SuiteConfig::default());
        }
        serde_yaml::from_str(content).map_err(|e| e.to_string())
    }

    /// Prefix a command that needs elevated privileges
    pub fn privileged(&self, command: &str) -> String {
        let prefix = self.privilege_prefix.trim();
        if prefix.is_empty() {
            command.to_string()
        } else {
            format!("{} {}", prefix, command)
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Retry profile selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Patience {
    /// 30 attempts, 10 seconds apart (fresh deployments)
    #[default]
    Patient,
    /// 6 attempts, 5 seconds apart (hosts expected to be up)
    Fast,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub patience: Patience,
    /// Overrides the attempt count of the selected profile
    pub max_attempts: Option<u32>,
    /// Overrides the interval of the selected profile
    pub interval_secs: Option<u64>,
    /// Timeout for each liveness probe
    pub probe_timeout_secs: u64,
    /// Passed to ssh as ConnectTimeout
    pub ssh_connect_timeout_secs: u64,
    pub identity_file: Option<PathBuf>,
    /// Passed to ssh as StrictHostKeyChecking
    pub host_key_checking: String,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        ConnectionSettings {
            patience: Patience::Patient,
            max_attempts: None,
            interval_secs: None,
            probe_timeout_secs: 15,
            ssh_connect_timeout_secs: 10,
            identity_file: None,
            host_key_checking: "accept-new".to_string(),
        }
    }
}

impl ConnectionSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        let mut policy = match self.patience {
            Patience::Patient => RetryPolicy::patient(),
            Patience::Fast => RetryPolicy::fast(),
        };
        if let Some(attempts) = self.max_attempts {
            policy.max_attempts = attempts.max(1);
        }
        if let Some(interval) = self.interval_secs {
            policy.interval = Duration::from_secs(interval);
        }
        policy.probe_timeout = Duration::from_secs(self.probe_timeout_secs);
        policy
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventorySettings {
    pub path: PathBuf,
    /// Groups searched after the environment-named group, in order
    pub groups: Vec<String>,
    /// Environment variable holding an explicit address
    pub address_env: String,
    pub default_user: String,
    pub default_port: u16,
}

impl Default for InventorySettings {
    fn default() -> Self {
        InventorySettings {
            path: PathBuf::from("configuration-management/inventory/hosts.yml"),
            groups: vec!["azure_vms".to_string()],
            address_env: "PREFLIGHT_TARGET_HOST".to_string(),
            default_user: "azureuser".to_string(),
            default_port: 22,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicePolicy {
    pub required_active: Vec<String>,
    pub required_enabled: Vec<String>,
    /// Must not be enabled
    pub forbidden: Vec<String>,
}

impl Default for ServicePolicy {
    fn default() -> Self {
        let critical = vec!["ssh".to_string(), "fail2ban".to_string(), "chrony".to_string()];
        ServicePolicy {
            required_active: critical.clone(),
            required_enabled: critical,
            forbidden: vec!["telnet".to_string(), "rsh".to_string(), "rlogin".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallPolicy {
    pub require_management_rule: bool,
    /// Any of these (case-insensitive) in `ufw status` counts as an SSH allow rule
    pub management_rule_markers: Vec<String>,
}

impl Default for FirewallPolicy {
    fn default() -> Self {
        FirewallPolicy {
            require_management_rule: true,
            management_rule_markers: vec!["22/tcp".to_string(), "ssh".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntrusionPolicy {
    pub jail: String,
    /// Local jail file that must carry a section for the jail; None to skip
    pub jail_config: Option<String>,
}

impl Default for IntrusionPolicy {
    fn default() -> Self {
        IntrusionPolicy {
            jail: "sshd".to_string(),
            jail_config: Some("/etc/fail2ban/jail.local".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshPolicy {
    pub config_path: String,
    /// Directives matched case-insensitively against effective lines
    pub required_directives: Vec<String>,
}

impl Default for SshPolicy {
    fn default() -> Self {
        SshPolicy {
            config_path: "/etc/ssh/sshd_config".to_string(),
            required_directives: [
                "PasswordAuthentication no",
                "PermitRootLogin no",
                "Protocol 2",
                "X11Forwarding no",
                "MaxAuthTries",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelPolicy {
    /// sysctl key to expected value, checked in order
    pub expected: IndexMap<String, String>,
}

impl Default for KernelPolicy {
    fn default() -> Self {
        let expected = [
            "net.ipv4.ip_forward",
            "net.ipv4.conf.all.send_redirects",
            "net.ipv4.conf.default.send_redirects",
            "net.ipv4.conf.all.accept_redirects",
            "net.ipv4.conf.default.accept_redirects",
        ]
        .iter()
        .map(|key| (key.to_string(), "0".to_string()))
        .collect();
        KernelPolicy { expected }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilePolicy {
    /// Path to exact octal mode
    pub modes: IndexMap<String, String>,
    /// Must not carry the world-read bit
    pub not_world_readable: Vec<String>,
    /// Must be owned by root and not group/world writable
    pub root_owned: Vec<String>,
}

impl Default for FilePolicy {
    fn default() -> Self {
        let modes = [
            ("/etc/passwd", "644"),
            ("/etc/shadow", "640"),
            ("/etc/group", "644"),
            ("/etc/ssh/sshd_config", "600"),
        ]
        .iter()
        .map(|(path, mode)| (path.to_string(), mode.to_string()))
        .collect();

        FilePolicy {
            modes,
            not_world_readable: vec![
                "/var/log/auth.log".to_string(),
                "/var/log/syslog".to_string(),
                "/var/log/fail2ban.log".to_string(),
            ],
            root_owned: vec!["/etc/crontab".to_string(), "/etc/cron.deny".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketPolicy {
    /// Ports allowed to listen on non-loopback addresses
    pub allowed_ports: Vec<u16>,
    /// Must be listening
    pub management_port: u16,
    /// Local addresses starting with any of these are loopback
    pub loopback_markers: Vec<String>,
    /// Ceiling on LISTEN sockets, loopback included
    pub max_listeners: usize,
}

impl Default for SocketPolicy {
    fn default() -> Self {
        SocketPolicy {
            allowed_ports: vec![22, 68, 80, 443],
            management_port: 22,
            loopback_markers: vec![
                "127.".to_string(),
                "::1".to_string(),
                "[::1]".to_string(),
                "localhost".to_string(),
            ],
            max_listeners: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogPolicy {
    /// journalctl --since value
    pub window: String,
    /// Fail when this many non-allow-listed error lines are present
    pub noise_threshold: usize,
    pub allow_list: AllowList,
    /// Fail when failed SSH password attempts reach this count
    pub max_failed_auth: Option<u64>,
    pub log_dir: String,
}

impl Default for LogPolicy {
    fn default() -> Self {
        LogPolicy {
            window: "1 hour ago".to_string(),
            noise_threshold: 3,
            allow_list: AllowList::default(),
            max_failed_auth: None,
            log_dir: "/var/log".to_string(),
        }
    }
}

/// Ceilings; an observed value equal to the limit is a violation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceLimits {
    pub max_load: f64,
    pub max_memory_pct: f64,
    pub max_disk_pct: f64,
    pub max_response_secs: f64,
    pub max_ssh_roundtrip_secs: f64,
    pub max_pending_updates: u64,
    pub max_clock_offset_secs: f64,
    /// Mean TCP connect time from the runner to the SSH port
    pub max_network_latency_ms: f64,
    pub latency_samples: usize,
    pub scratch_file: String,
    pub scratch_size_mib: u32,
}

impl Default for PerformanceLimits {
    fn default() -> Self {
        PerformanceLimits {
            max_load: 2.0,
            max_memory_pct: 85.0,
            max_disk_pct: 80.0,
            max_response_secs: 2.0,
            max_ssh_roundtrip_secs: 5.0,
            max_pending_updates: 50,
            max_clock_offset_secs: 1.0,
            max_network_latency_ms: 100.0,
            latency_samples: 5,
            scratch_file: "/tmp/host-preflight-scratch".to_string(),
            scratch_size_mib: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    /// `{address}` is replaced by the target address
    pub url: String,
    pub concurrency: usize,
    pub attempts: usize,
    /// Inclusive lower bound on successes / attempts
    pub min_success_ratio: f64,
    /// When false, HTTP checks skip if the endpoint never answers
    pub require_reachable: bool,
    pub request_timeout_secs: u64,
    /// Statuses accepted by the reachability check
    pub accepted_statuses: Vec<u16>,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        ProbeSettings {
            url: "http://{address}/".to_string(),
            concurrency: 10,
            attempts: 10,
            min_success_ratio: 0.8,
            require_reachable: false,
            request_timeout_secs: 10,
            accepted_statuses: vec![200, 403, 404],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkPolicy {
    pub ping_target: String,
    pub dns_name: String,
}

impl Default for NetworkPolicy {
    fn default() -> Self {
        NetworkPolicy {
            ping_target: "8.8.8.8".to_string(),
            dns_name: "google.com".to_string(),
        }
    }
}
