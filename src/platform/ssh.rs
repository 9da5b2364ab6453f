//! Remote command execution over SSH.
//!
//! The production transport shells out to the local OpenSSH client, so key
//! agents, `~/.ssh/config` and jump hosts behave exactly as they do for an
//! operator at the same terminal.
//!
//! # Graceful Degradation
//!
//! - Non-zero remote exit, including 255: returned as data inside `CommandResult`
//! - ssh client exit 255 without a remote status (connection or auth error):
//!   `PreflightError::Transport`
//! - ssh binary missing or unspawnable: `PreflightError::Transport`
//! - Command exceeds its timeout: `PreflightError::Timeout`, child process killed
//! - Non-UTF8 output: lossy conversion
//!
//! The OpenSSH client reports its own failures as 255, which a remote command
//! may also return. Every command is therefore wrapped so the remote shell
//! appends its status to stdout after [`EXIT_MARKER`]; the marker is stripped
//! before the result is handed back.

use crate::config::ConnectionSettings;
use crate::platform::inventory::Target;
use crate::PreflightError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

/// Exit status the OpenSSH client reserves for its own failures
pub const SSH_CLIENT_ERROR: i32 = 255;

/// Precedes the remote exit status on the last line of wrapped stdout
pub const EXIT_MARKER: &str = "host-preflight-exit=";

/// Single-quote a value for a POSIX shell
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Remote command line reporting the exit status of `command` on stdout
pub fn wrap_command(command: &str) -> String {
    format!(
        "sh -c {}; printf '\\n{}%d' \"$?\"",
        shell_quote(command),
        EXIT_MARKER
    )
}

/// Split wrapped stdout into the command's own output and its exit status
pub fn split_exit_marker(stdout: &str) -> Option<(&str, i32)> {
    let (output, status) = stdout.rsplit_once(&format!("\n{}", EXIT_MARKER))?;
    Some((output, status.trim().parse().ok()?))
}

/// Output of one remote command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout with surrounding whitespace removed
    pub fn output(&self) -> &str {
        self.stdout.trim()
    }

    /// Non-empty trimmed stdout lines
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines().map(str::trim).filter(|l| !l.is_empty())
    }

    /// Short description of a non-zero exit for failure reasons
    pub fn exit_summary(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("'{}' exited with {}", self.command, self.exit_code)
        } else {
            let first = stderr.lines().next().unwrap_or(stderr);
            format!("'{}' exited with {}: {}", self.command, self.exit_code, first)
        }
    }
}

/// A way to run one command on a target
#[async_trait]
pub trait Transport: Send + Sync {
    async fn run(
        &self,
        target: &Target,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandResult, PreflightError>;
}

/// Transport backed by the system `ssh` binary
#[derive(Debug, Clone)]
pub struct SystemSsh {
    program: PathBuf,
    connect_timeout_secs: u64,
    host_key_checking: String,
    identity_file: Option<PathBuf>,
}

impl SystemSsh {
    pub fn from_settings(settings: &ConnectionSettings) -> Self {
        SystemSsh {
            program: PathBuf::from("ssh"),
            connect_timeout_secs: settings.ssh_connect_timeout_secs,
            host_key_checking: settings.host_key_checking.clone(),
            identity_file: settings.identity_file.clone(),
        }
    }

    /// Use a different client binary (wrappers, tests)
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Arguments before the remote command
    pub fn client_args(&self, target: &Target) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
            "-o".to_string(),
            format!("StrictHostKeyChecking={}", self.host_key_checking),
            "-p".to_string(),
            target.port.to_string(),
        ];
        if let Some(ref identity) = self.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        args.push(target.destination());
        args
    }
}

#[async_trait]
impl Transport for SystemSsh {
    async fn run(
        &self,
        target: &Target,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandResult, PreflightError> {
        let mut ssh = Command::new(&self.program);
        ssh.args(self.client_args(target))
            .arg(wrap_command(command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(host = %target, command, "running remote command");
        let start = Instant::now();
        let output = match tokio::time::timeout(timeout, ssh.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(PreflightError::Transport {
                    command: command.to_string(),
                    message: format!("failed to launch {}: {}", self.program.display(), e),
                })
            }
            Err(_) => {
                return Err(PreflightError::Timeout {
                    command: command.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        };
        let duration = start.elapsed();

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let (stdout, exit_code) = match (split_exit_marker(&stdout), output.status.code()) {
            (Some((remote_stdout, remote_code)), _) => (remote_stdout.to_string(), remote_code),
            (None, Some(code)) if code != SSH_CLIENT_ERROR => (stdout.to_string(), code),
            (None, _) => {
                let message = stderr.trim();
                return Err(PreflightError::Transport {
                    command: command.to_string(),
                    message: if message.is_empty() {
                        "ssh client terminated without a remote exit status".to_string()
                    } else {
                        message.to_string()
                    },
                });
            }
        };

        Ok(CommandResult {
            command: command.to_string(),
            exit_code,
            stdout,
            stderr,
            duration,
        })
    }
}
