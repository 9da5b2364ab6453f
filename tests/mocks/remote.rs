//! Mock remote host, prober and clock.
//!
//! `MockHost` answers commands from a rule table: the last rule whose pattern
//! occurs in the command wins, unmatched commands exit 127. Presets describe
//! whole machines (hardened, unreachable, flaky) and tests layer single rules
//! on top to break one thing at a time.

use async_trait::async_trait;
use host_preflight::platform::clock::Clock;
use host_preflight::platform::connection::LIVENESS_MARKER;
use host_preflight::platform::http::{ProbeBatch, ProbePlan, ProbeSample, Prober, ReachBatch, ReachPlan};
use host_preflight::platform::inventory::Target;
use host_preflight::platform::ssh::{CommandResult, Transport};
use host_preflight::PreflightError;
use std::sync::Mutex;
use std::time::Duration;

/// How a matched command behaves
#[derive(Debug, Clone)]
pub enum Reply {
    Exit { code: i32, stdout: String, stderr: String },
    TransportError(String),
    Timeout,
}

impl Reply {
    pub fn ok(stdout: &str) -> Self {
        Reply::Exit {
            code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn exit(code: i32, stdout: &str) -> Self {
        Reply::Exit {
            code,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }
}

#[derive(Debug)]
struct Liveness {
    /// Probes to fail before answering; None = never answer
    failures_left: Option<u32>,
}

/// Scripted remote host
#[derive(Debug)]
pub struct MockHost {
    rules: Vec<(String, Reply)>,
    liveness: Mutex<Liveness>,
    commands: Mutex<Vec<String>>,
    probes: Mutex<u32>,
    latency: Duration,
}

impl MockHost {
    /// A host that answers liveness and nothing else
    pub fn new() -> Self {
        MockHost {
            rules: Vec::new(),
            liveness: Mutex::new(Liveness {
                failures_left: Some(0),
            }),
            commands: Mutex::new(Vec::new()),
            probes: Mutex::new(0),
            latency: Duration::from_millis(20),
        }
    }

    /// A host where no probe ever succeeds
    pub fn unreachable() -> Self {
        let host = MockHost::new();
        host.liveness.lock().unwrap().failures_left = None;
        host
    }

    /// A hardened host that fails the first `n` liveness probes
    pub fn flaky(n: u32) -> Self {
        let host = MockHost::hardened();
        host.liveness.lock().unwrap().failures_left = Some(n);
        host
    }

    /// Add a rule; later rules take precedence
    pub fn on(mut self, pattern: &str, reply: Reply) -> Self {
        self.rules.push((pattern.to_string(), reply));
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// A fully compliant Ubuntu VM under the default suite configuration
    pub fn hardened() -> Self {
        MockHost::new()
            // Services
            .on("systemctl is-active", Reply::ok("active\n"))
            .on("systemctl is-enabled", Reply::ok("enabled\n"))
            .on("|| echo not-found", Reply::ok("not-found\n"))
            .on(
                "chronyc tracking",
                Reply::ok(
                    "Reference ID    : A9FEA97B (169.254.169.123)\n\
                     Stratum         : 4\n\
                     System time     : 0.000012345 seconds fast of NTP time\n\
                     Leap status     : Normal\n",
                ),
            )
            // Security
            .on(
                "ufw status verbose",
                Reply::ok(
                    "Status: active\n\
                     Logging: on (low)\n\
                     Default: deny (incoming), allow (outgoing), disabled (routed)\n\
                     \n\
                     To                         Action      From\n\
                     --                         ------      ----\n\
                     22/tcp                     ALLOW IN    Anywhere\n\
                     80/tcp                     ALLOW IN    Anywhere\n",
                ),
            )
            .on(
                "fail2ban-client status",
                Reply::ok("Status\n|- Number of jail:\t1\n`- Jail list:\tsshd\n"),
            )
            .on(
                "fail2ban-client status 'sshd'",
                Reply::ok(
                    "Status for the jail: sshd\n\
                     |- Filter\n\
                     |  |- Currently failed:\t0\n\
                     `- Actions\n   \
                        |- Currently banned:\t2\n",
                ),
            )
            .on("'/etc/fail2ban/jail.local'", Reply::ok("present\n"))
            .on(
                "cat '/etc/ssh/sshd_config'",
                Reply::ok(
                    "# Hardened by provisioning\n\
                     Protocol 2\n\
                     PermitRootLogin no\n\
                     PasswordAuthentication no\n\
                     X11Forwarding no\n\
                     MaxAuthTries 3\n\
                     #PermitEmptyPasswords yes\n",
                ),
            )
            .on("sysctl -n", Reply::ok("0\n"))
            .on(
                "ss -H -tuln",
                Reply::ok(
                    "udp   UNCONN 0      0       10.0.0.4%eth0:68        0.0.0.0:*\n\
                     udp   UNCONN 0      0       127.0.0.53%lo:53        0.0.0.0:*\n\
                     tcp   LISTEN 0      4096    127.0.0.53%lo:53        0.0.0.0:*\n\
                     tcp   LISTEN 0      128           0.0.0.0:22        0.0.0.0:*\n\
                     tcp   LISTEN 0      511           0.0.0.0:80        0.0.0.0:*\n\
                     tcp   LISTEN 0      128              [::]:22           [::]:*\n",
                ),
            )
            .on("stat -c '%a' '/etc/passwd'", Reply::ok("644\n"))
            .on("stat -c '%a' '/etc/shadow'", Reply::ok("640\n"))
            .on("stat -c '%a' '/etc/group'", Reply::ok("644\n"))
            .on("stat -c '%a' '/etc/ssh/sshd_config'", Reply::ok("600\n"))
            .on("stat -c '%a' '/var/log/auth.log'", Reply::ok("640\n"))
            .on("stat -c '%a' '/var/log/syslog'", Reply::ok("640\n"))
            .on("stat -c '%a' '/var/log/fail2ban.log'", Reply::ok("absent\n"))
            .on("stat -c '%a %U' '/etc/crontab'", Reply::ok("644 root\n"))
            .on("stat -c '%a %U' '/etc/cron.deny'", Reply::ok("absent\n"))
            .on("$3 == 0", Reply::ok("root\n"))
            .on("$2 == \"\"", Reply::ok(""))
            .on("$1 == \"root\"", Reply::ok("!*\n"))
            // Network
            .on(
                "ping -c 3",
                Reply::ok(
                    "PING 8.8.8.8 (8.8.8.8) 56(84) bytes of data.\n\
                     \n\
                     --- 8.8.8.8 ping statistics ---\n\
                     3 packets transmitted, 3 received, 0% packet loss, time 2003ms\n",
                ),
            )
            .on("getent hosts", Reply::ok("142.250.74.46   google.com\n"))
            // Logs
            .on(
                "--priority err",
                Reply::ok("Oct 16 09:12:44 vm-web-01 kernel: hv_balloon: Max. dynamic memory size: 8192 MB\n"),
            )
            .on("grep -c 'Failed password'", Reply::ok("0\n"))
            .on("find '/var/log' -name", Reply::ok("14\n"))
            // Performance
            .on("cat /proc/loadavg", Reply::ok("0.15 0.10 0.05 1/187 4821\n"))
            .on(
                "free -b",
                Reply::ok(
                    "               total        used        free      shared  buff/cache   available\n\
                     Mem:      8324300800  2081075200  4161150400     1048576  2082074624  6243225600\n\
                     Swap:              0           0           0\n",
                ),
            )
            .on(
                "df -P /",
                Reply::ok(
                    "Filesystem     1024-blocks    Used Available Capacity Mounted on\n\
                     /dev/root         30428560 6085712  24326464      21% /\n",
                ),
            )
            .on("echo host-preflight-roundtrip", Reply::ok("host-preflight-roundtrip\n"))
            .on(
                "dd if=/dev/zero",
                Reply::ok(
                    "10+0 records in\n\
                     10+0 records out\n\
                     10485760 bytes (10 MB, 10 MiB) copied, 0.0213 s, 492 MB/s\n",
                ),
            )
            .on("apt list --upgradable", Reply::ok("3\n"))
    }

    /// Commands executed after the connection was established
    pub fn commands_run(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Liveness probes received
    pub fn probe_count(&self) -> u32 {
        *self.probes.lock().unwrap()
    }

    fn liveness(&self, command: &str) -> Result<CommandResult, PreflightError> {
        *self.probes.lock().unwrap() += 1;
        let mut liveness = self.liveness.lock().unwrap();
        match liveness.failures_left {
            Some(0) => Ok(self.result(command, 0, &format!("{}\n", LIVENESS_MARKER), "")),
            Some(ref mut n) => {
                *n -= 1;
                Err(PreflightError::Transport {
                    command: command.to_string(),
                    message: "ssh: connect to host port 22: Connection refused".to_string(),
                })
            }
            None => Err(PreflightError::Transport {
                command: command.to_string(),
                message: "ssh: connect to host port 22: Connection timed out".to_string(),
            }),
        }
    }

    fn result(&self, command: &str, exit_code: i32, stdout: &str, stderr: &str) -> CommandResult {
        CommandResult {
            command: command.to_string(),
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            duration: self.latency,
        }
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockHost {
    async fn run(
        &self,
        _target: &Target,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandResult, PreflightError> {
        if command.contains(LIVENESS_MARKER) {
            return self.liveness(command);
        }
        self.commands.lock().unwrap().push(command.to_string());

        let reply = self
            .rules
            .iter()
            .rev()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, reply)| reply.clone());

        match reply {
            Some(Reply::Exit { code, stdout, stderr }) => Ok(self.result(command, code, &stdout, &stderr)),
            Some(Reply::TransportError(message)) => Err(PreflightError::Transport {
                command: command.to_string(),
                message,
            }),
            Some(Reply::Timeout) => Err(PreflightError::Timeout {
                command: command.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
            None => Ok(self.result(command, 127, "", "sh: 1: command not found")),
        }
    }
}

/// Prober answering from a status script
#[derive(Debug)]
pub struct FakeProber {
    /// Status per attempt, cycled; None = no response
    statuses: Vec<Option<u16>>,
    latency: Duration,
    plans: Mutex<Vec<ProbePlan>>,
    /// TCP connect time; None = refused
    connect: Option<Duration>,
    reach_plans: Mutex<Vec<ReachPlan>>,
}

impl FakeProber {
    pub fn statuses(statuses: Vec<Option<u16>>) -> Self {
        FakeProber {
            statuses,
            latency: Duration::from_millis(40),
            plans: Mutex::new(Vec::new()),
            connect: Some(Duration::from_millis(12)),
            reach_plans: Mutex::new(Vec::new()),
        }
    }

    /// Every request answers 200
    pub fn healthy() -> Self {
        Self::statuses(vec![Some(200)])
    }

    /// No request gets a response
    pub fn unreachable() -> Self {
        Self::statuses(vec![None])
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_connect_latency(mut self, latency: Duration) -> Self {
        self.connect = Some(latency);
        self
    }

    /// Every TCP connect is refused
    pub fn refusing_connects(mut self) -> Self {
        self.connect = None;
        self
    }

    pub fn plans(&self) -> Vec<ProbePlan> {
        self.plans.lock().unwrap().clone()
    }

    pub fn reach_plans(&self) -> Vec<ReachPlan> {
        self.reach_plans.lock().unwrap().clone()
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, plan: &ProbePlan) -> ProbeBatch {
        self.plans.lock().unwrap().push(plan.clone());
        let results = (0..plan.attempts)
            .map(|i| match self.statuses.get(i % self.statuses.len().max(1)).copied().flatten() {
                Some(status) => ProbeSample::response(status, self.latency),
                None => ProbeSample::failed(self.latency, "connection refused"),
            })
            .collect();
        ProbeBatch {
            endpoint: plan.endpoint.clone(),
            concurrency: plan.concurrency,
            attempts: plan.attempts,
            results,
        }
    }

    async fn reach(&self, plan: &ReachPlan) -> ReachBatch {
        self.reach_plans.lock().unwrap().push(plan.clone());
        let sample = self
            .connect
            .ok_or_else(|| "Connection refused (os error 111)".to_string());
        ReachBatch {
            address: plan.address.clone(),
            samples: vec![sample; plan.attempts],
        }
    }
}

/// Clock that records sleeps and returns immediately
#[derive(Debug, Default)]
pub struct RecordingClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for RecordingClock {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}
