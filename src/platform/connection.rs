//! Connection acquisition with fixed-interval retries.
//!
//! A [`Connection`] only exists after one liveness probe succeeded. The probe
//! loop is an explicit state machine:
//!
//! ```text
//! Idle -> Probing{1}
//! Probing{n} + ok                   -> Connected{n}
//! Probing{n} + err, n <  max        -> Probing{n+1}   (after one interval)
//! Probing{n} + err, n == max        -> Exhausted{n, err}
//! ```
//!
//! so a budget of N attempts issues exactly N probes and N-1 sleeps. Sleeping
//! goes through [`Clock`], which tests replace with a recording fake.

use crate::platform::clock::Clock;
use crate::platform::inventory::Target;
use crate::platform::ssh::{CommandResult, Transport};
use crate::PreflightError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Marker echoed by the liveness probe
pub const LIVENESS_MARKER: &str = "host-preflight-alive";

/// Retry budget for connection acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    pub probe_timeout: Duration,
}

impl RetryPolicy {
    /// For hosts that may still be booting
    pub fn patient() -> Self {
        RetryPolicy {
            max_attempts: 30,
            interval: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(15),
        }
    }

    /// For hosts that should already be up
    pub fn fast() -> Self {
        RetryPolicy {
            max_attempts: 6,
            interval: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(15),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::patient()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Probing { attempt: u32 },
    Connected { attempts: u32 },
    Exhausted { attempts: u32, last_error: String },
}

impl ConnectionState {
    /// Leave Idle; other states are unchanged
    pub fn start(self) -> Self {
        match self {
            ConnectionState::Idle => ConnectionState::Probing { attempt: 1 },
            other => other,
        }
    }

    /// Apply a probe outcome; only meaningful while probing
    pub fn on_probe(self, outcome: Result<(), String>, max_attempts: u32) -> Self {
        match self {
            ConnectionState::Probing { attempt } => match outcome {
                Ok(()) => ConnectionState::Connected { attempts: attempt },
                Err(last_error) if attempt >= max_attempts.max(1) => ConnectionState::Exhausted {
                    attempts: attempt,
                    last_error,
                },
                Err(_) => ConnectionState::Probing {
                    attempt: attempt + 1,
                },
            },
            other => other,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connected { .. } | ConnectionState::Exhausted { .. }
        )
    }
}

/// A live channel to one target.
///
/// Commands on one connection never overlap; callers sharing it queue on an
/// internal lock.
pub struct Connection {
    target: Target,
    transport: Arc<dyn Transport>,
    exclusive: Mutex<()>,
}

impl Connection {
    fn new(target: Target, transport: Arc<dyn Transport>) -> Self {
        Connection {
            target,
            transport,
            exclusive: Mutex::new(()),
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Run one command. A non-zero exit is data; transport failures and
    /// timeouts are errors.
    pub async fn execute(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandResult, PreflightError> {
        let _guard = self.exclusive.lock().await;
        let result = self.transport.run(&self.target, command, timeout).await;
        match &result {
            Ok(output) => debug!(
                command,
                exit_code = output.exit_code,
                duration_ms = output.duration.as_millis() as u64,
                "command finished"
            ),
            Err(e) => warn!(command, error = %e, "command did not complete"),
        }
        result
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("target", &self.target)
            .finish()
    }
}

/// Establishes connections under a retry policy
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn Transport>, clock: Arc<dyn Clock>, policy: RetryPolicy) -> Self {
        ConnectionManager {
            transport,
            clock,
            policy,
        }
    }

    pub async fn connect(&self, target: &Target) -> Result<Connection, PreflightError> {
        let mut state = ConnectionState::Idle.start();
        info!(
            host = %target,
            max_attempts = self.policy.max_attempts,
            interval_secs = self.policy.interval.as_secs(),
            "connecting"
        );

        loop {
            state = match state {
                ConnectionState::Probing { attempt } => {
                    let outcome = self.probe(target).await;
                    if let Err(ref e) = outcome {
                        debug!(attempt, error = %e, "liveness probe failed");
                    }
                    let next = ConnectionState::Probing { attempt }
                        .on_probe(outcome, self.policy.max_attempts);
                    if let ConnectionState::Probing { .. } = next {
                        self.clock.sleep(self.policy.interval).await;
                    }
                    next
                }
                ConnectionState::Connected { attempts } => {
                    info!(host = %target, attempts, "connected");
                    return Ok(Connection::new(target.clone(), self.transport.clone()));
                }
                ConnectionState::Exhausted {
                    attempts,
                    last_error,
                } => {
                    warn!(host = %target, attempts, error = %last_error, "connection budget exhausted");
                    return Err(PreflightError::ConnectionFailed {
                        attempts,
                        last_error,
                    });
                }
                ConnectionState::Idle => ConnectionState::Idle.start(),
            };
        }
    }

    async fn probe(&self, target: &Target) -> Result<(), String> {
        let command = format!("echo {}", LIVENESS_MARKER);
        match self
            .transport
            .run(target, &command, self.policy.probe_timeout)
            .await
        {
            Ok(result) if result.success() && result.stdout.contains(LIVENESS_MARKER) => Ok(()),
            Ok(result) => Err(format!(
                "liveness probe exited with {} and output '{}'",
                result.exit_code,
                result.output()
            )),
            Err(e) => Err(e.to_string()),
        }
    }
}
