//! Full run integration tests.
//!
//! Complete runs against the mock host: connection retry, check
//! interpretation, filtering, fail-fast and exit codes.

use crate::mocks::{FakeProber, MockHost, RecordingClock, Reply};
use host_preflight::checks::all_specs;
use host_preflight::config::Patience;
use host_preflight::engine::result::{ExitPolicy, RunStatus, ValidationReport, EXIT_FAIL, EXIT_NOT_RUN, EXIT_PASS};
use host_preflight::platform::inventory::{Resolution, ResolvedFrom, Target};
use host_preflight::{run_preflight_with, Check, CheckCategory, PreflightConfig, Verdict};
use std::sync::Arc;
use std::time::Duration;

const ADDRESS: &str = "10.0.0.4";

fn resolved() -> Resolution {
    Resolution::Resolved(Target::new(ADDRESS, "azureuser", 22, ResolvedFrom::Override).unwrap())
}

fn config() -> PreflightConfig {
    PreflightConfig {
        environment: Some("staging".to_string()),
        ..Default::default()
    }
}

struct Run {
    report: ValidationReport,
    host: Arc<MockHost>,
    clock: Arc<RecordingClock>,
    prober: Arc<FakeProber>,
}

async fn run_with(config: &PreflightConfig, resolution: Resolution, host: MockHost, prober: FakeProber) -> Run {
    let host = Arc::new(host);
    let clock = Arc::new(RecordingClock::new());
    let prober = Arc::new(prober);
    let report = run_preflight_with(config, resolution, host.clone(), clock.clone(), prober.clone()).await;
    Run {
        report,
        host,
        clock,
        prober,
    }
}

async fn run(host: MockHost) -> Run {
    run_with(&config(), resolved(), host, FakeProber::healthy()).await
}

fn find<'a>(report: &'a ValidationReport, id: &str) -> &'a Check {
    report
        .checks
        .iter()
        .find(|c| c.id == id)
        .unwrap_or_else(|| panic!("{} not in report", id))
}

fn verdict<'a>(report: &'a ValidationReport, id: &str) -> &'a Verdict {
    find(report, id).verdict.as_ref().unwrap()
}

fn failed_ids(report: &ValidationReport) -> Vec<&str> {
    report
        .checks
        .iter()
        .filter(|c| c.verdict.as_ref().is_some_and(Verdict::is_fail))
        .map(|c| c.id.as_str())
        .collect()
}

// Healthy runs

#[tokio::test]
async fn test_hardened_host_passes_every_check() {
    let run = run(MockHost::hardened()).await;
    let report = &run.report;

    assert_eq!(report.checks.len(), all_specs().len());
    for check in &report.checks {
        let verdict = check.verdict.as_ref().unwrap();
        assert!(verdict.is_pass(), "{} did not pass: {}", check.id, verdict);
    }
    assert_eq!(report.status(), RunStatus::Pass);
    assert_eq!(report.exit_code(&ExitPolicy::default()), EXIT_PASS);
    assert_eq!(report.target.as_deref(), Some("azureuser@10.0.0.4:22"));
    assert_eq!(report.environment.as_deref(), Some("staging"));
}

#[tokio::test]
async fn test_checks_run_in_table_order() {
    let run = run(MockHost::hardened()).await;
    let ids: Vec<_> = run.report.checks.iter().map(|c| c.id.as_str()).collect();
    let expected: Vec<_> = all_specs().iter().map(|s| s.id).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_remote_commands_never_carry_the_target_address() {
    let run = run(MockHost::hardened()).await;
    let commands = run.host.commands_run();
    assert!(!commands.is_empty());
    for command in commands {
        assert!(!command.contains(ADDRESS), "{}", command);
    }
}

#[tokio::test]
async fn test_pass_messages_carry_observations() {
    let run = run(MockHost::hardened()).await;
    assert_eq!(verdict(&run.report, "PERF-003").detail(), "disk usage 21%");
    assert_eq!(
        verdict(&run.report, "SEC-002").detail(),
        "jail sshd active, 2 address(es) currently banned"
    );
}

// Failures

#[tokio::test]
async fn test_inactive_fail2ban_is_named_alone() {
    let host = MockHost::hardened().on("systemctl is-active 'fail2ban'", Reply::exit(3, "inactive\n"));
    let run = run(host).await;

    assert_eq!(failed_ids(&run.report), vec!["SVC-001"]);
    assert_eq!(verdict(&run.report, "SVC-001").detail(), "inactive: fail2ban");
    assert_eq!(run.report.exit_code(&ExitPolicy::default()), EXIT_FAIL);
}

#[tokio::test]
async fn test_world_readable_auth_log_fails() {
    let host = MockHost::hardened().on("stat -c '%a' '/var/log/auth.log'", Reply::ok("644\n"));
    let run = run(host).await;

    assert_eq!(failed_ids(&run.report), vec!["SEC-009"]);
    assert_eq!(verdict(&run.report, "SEC-009").detail(), "world-readable: /var/log/auth.log (644)");
}

#[tokio::test]
async fn test_unexpected_listener_fails_socket_audit() {
    let host = MockHost::hardened().on(
        "ss -H -tuln",
        Reply::ok(
            "tcp   LISTEN 0      128           0.0.0.0:22        0.0.0.0:*\n\
             tcp   LISTEN 0      80            0.0.0.0:3306      0.0.0.0:*\n",
        ),
    );
    let run = run(host).await;
    assert_eq!(
        verdict(&run.report, "SEC-005").detail(),
        "unexpected listeners: tcp 0.0.0.0:3306"
    );
}

#[tokio::test]
async fn test_log_noise_at_threshold_fails() {
    let host = MockHost::hardened().on(
        "--priority err",
        Reply::ok(
            "Oct 16 09:12:44 vm-web-01 nginx[1201]: bind() to 0.0.0.0:80 failed (98: Address already in use)\n\
             Oct 16 09:12:45 vm-web-01 systemd[1]: Failed to start nginx.service\n\
             Oct 16 09:13:02 vm-web-01 kernel: hv_balloon: Max. dynamic memory size: 8192 MB\n\
             Oct 16 09:14:10 vm-web-01 kernel: EXT4-fs error (device sda1): ext4_find_entry\n",
        ),
    );
    let run = run(host).await;
    assert_eq!(failed_ids(&run.report), vec!["LOG-001"]);
}

#[tokio::test]
async fn test_disk_at_limit_fails() {
    let host = MockHost::hardened().on(
        "df -P /",
        Reply::ok(
            "Filesystem     1024-blocks     Used Available Capacity Mounted on\n\
             /dev/root         30428560 24342848   6085712      80% /\n",
        ),
    );
    let run = run(host).await;
    assert_eq!(verdict(&run.report, "PERF-003").detail(), "disk usage 80%, limit 80%");
}

// Degradation

#[tokio::test]
async fn test_transport_error_fails_only_that_check() {
    let host = MockHost::hardened().on("df -P /", Reply::TransportError("broken pipe".to_string()));
    let run = run(host).await;

    assert_eq!(run.report.checks.len(), all_specs().len());
    assert_eq!(failed_ids(&run.report), vec!["PERF-003"]);
    let reason = verdict(&run.report, "PERF-003").detail();
    assert!(reason.starts_with("connection-level failure:"), "{}", reason);
    assert!(reason.contains("broken pipe"));
    assert!(verdict(&run.report, "PERF-006").is_pass());
}

#[tokio::test]
async fn test_command_timeout_fails_only_that_check() {
    let host = MockHost::hardened().on("chronyc tracking", Reply::Timeout);
    let mut config = config();
    config.suite.command_timeout_secs = 7;
    let run = run_with(&config, resolved(), host, FakeProber::healthy()).await;

    assert_eq!(failed_ids(&run.report), vec!["SVC-003"]);
    assert!(verdict(&run.report, "SVC-003").detail().contains("timed out after 7000ms"));
}

#[tokio::test]
async fn test_unparseable_output_skips() {
    let host = MockHost::hardened().on("cat /proc/loadavg", Reply::ok("cat: /proc/loadavg: No such file\n"));
    let run = run(host).await;

    assert!(verdict(&run.report, "PERF-001").is_skip());
    assert_eq!(run.report.exit_code(&ExitPolicy::default()), EXIT_PASS);
}

#[tokio::test]
async fn test_missing_tool_is_reported_not_panicking() {
    // No rule matches, so every command exits 127
    let run = run(MockHost::new()).await;
    assert_eq!(run.report.checks.len(), all_specs().len());
    assert!(run.report.checks.iter().all(|c| c.verdict.is_some()));
    assert!(verdict(&run.report, "SEC-001").is_fail());
}

// Target resolution

#[tokio::test]
async fn test_unresolved_target_skips_everything() {
    let run = run_with(
        &config(),
        Resolution::Skip("no target address configured".to_string()),
        MockHost::hardened(),
        FakeProber::healthy(),
    )
    .await;

    assert_eq!(run.report.checks.len(), all_specs().len());
    assert!(run.report.checks.iter().all(|c| c.verdict.as_ref().is_some_and(Verdict::is_skip)));
    assert_eq!(run.host.probe_count(), 0);
    assert!(run.host.commands_run().is_empty());

    assert_eq!(run.report.exit_code(&ExitPolicy::default()), EXIT_PASS);
    let strict = ExitPolicy {
        all_skipped_is_pass: false,
    };
    assert_eq!(run.report.exit_code(&strict), EXIT_FAIL);
}

// Connection retry

#[tokio::test]
async fn test_unreachable_host_exhausts_fast_budget() {
    let mut config = config();
    config.suite.connection.patience = Patience::Fast;
    let run = run_with(&config, resolved(), MockHost::unreachable(), FakeProber::healthy()).await;

    assert_eq!(run.host.probe_count(), 6);
    assert_eq!(run.clock.sleeps(), vec![Duration::from_secs(5); 5]);
    assert!(run.host.commands_run().is_empty());
    assert!(run.prober.plans().is_empty());

    let report = &run.report;
    assert!(report.checks.is_empty());
    let aborted = report.aborted.as_deref().unwrap();
    assert!(aborted.contains("after 6 attempts"), "{}", aborted);
    assert_eq!(report.status(), RunStatus::NotRun);
    assert_eq!(report.exit_code(&ExitPolicy::default()), EXIT_NOT_RUN);
}

#[tokio::test]
async fn test_flaky_host_connects_within_budget() {
    let run = run(MockHost::flaky(2)).await;

    assert_eq!(run.host.probe_count(), 3);
    assert_eq!(run.clock.sleeps(), vec![Duration::from_secs(10); 2]);
    assert_eq!(run.report.exit_code(&ExitPolicy::default()), EXIT_PASS);
}

#[tokio::test]
async fn test_explicit_attempt_budget_overrides_profile() {
    let mut config = config();
    config.suite.connection.max_attempts = Some(2);
    config.suite.connection.interval_secs = Some(1);
    let run = run_with(&config, resolved(), MockHost::unreachable(), FakeProber::healthy()).await;

    assert_eq!(run.host.probe_count(), 2);
    assert_eq!(run.clock.sleeps(), vec![Duration::from_secs(1)]);
}

// Selection and fail-fast

#[tokio::test]
async fn test_fail_fast_stops_after_first_failure() {
    let host = MockHost::hardened().on("systemctl is-active 'ssh'", Reply::exit(3, "inactive\n"));
    let mut config = config();
    config.fail_fast = true;
    let run = run_with(&config, resolved(), host, FakeProber::healthy()).await;

    assert_eq!(run.report.checks.len(), 1);
    assert_eq!(run.report.checks[0].id, "SVC-001");
    assert_eq!(run.report.exit_code(&ExitPolicy::default()), EXIT_FAIL);
}

#[tokio::test]
async fn test_category_filter() {
    let mut config = config();
    config.categories = Some(vec![CheckCategory::Security]);
    let run = run_with(&config, resolved(), MockHost::hardened(), FakeProber::healthy()).await;

    assert_eq!(run.report.checks.len(), 11);
    assert!(run.report.checks.iter().all(|c| c.category == CheckCategory::Security));
    assert!(run.prober.plans().is_empty());
    assert!(run.prober.reach_plans().is_empty());
}

#[tokio::test]
async fn test_only_runs_exactly_the_named_check() {
    let mut config = config();
    config.only_checks = vec!["sec-005".to_string()];
    let run = run_with(&config, resolved(), MockHost::hardened(), FakeProber::healthy()).await;

    assert_eq!(run.report.checks.len(), 1);
    assert_eq!(run.host.commands_run(), vec!["ss -H -tuln".to_string()]);
}

#[tokio::test]
async fn test_skip_excludes_checks() {
    let mut config = config();
    config.skip_checks = vec!["PERF-007".to_string(), "PERF-008".to_string()];
    let run = run_with(&config, resolved(), MockHost::hardened(), FakeProber::healthy()).await;

    assert_eq!(run.report.checks.len(), all_specs().len() - 2);
    assert!(run.host.commands_run().iter().all(|c| !c.contains("dd if=/dev/zero")));
}

// Web probes

#[tokio::test]
async fn test_unreachable_web_endpoint_skips_probe_checks() {
    let run = run_with(&config(), resolved(), MockHost::hardened(), FakeProber::unreachable()).await;

    for id in ["NET-003", "PERF-004", "PERF-005"] {
        assert!(verdict(&run.report, id).is_skip(), "{}", id);
    }
    assert_eq!(run.report.exit_code(&ExitPolicy::default()), EXIT_PASS);
}

#[tokio::test]
async fn test_required_web_endpoint_fails_when_unreachable() {
    let mut config = config();
    config.suite.probe.require_reachable = true;
    let run = run_with(&config, resolved(), MockHost::hardened(), FakeProber::unreachable()).await;

    assert_eq!(failed_ids(&run.report), vec!["NET-003", "PERF-004", "PERF-005"]);
}

#[tokio::test]
async fn test_concurrency_ratio_boundary() {
    let eight_of_ten = FakeProber::statuses(
        [Some(200); 8].into_iter().chain([Some(503), None]).collect(),
    );
    let run = run_with(&config(), resolved(), MockHost::hardened(), eight_of_ten).await;
    assert_eq!(verdict(&run.report, "PERF-005").detail(), "8/10 requests succeeded (80%)");

    let seven_of_ten = FakeProber::statuses(
        [Some(200); 7].into_iter().chain([Some(503), None, None]).collect(),
    );
    let run = run_with(&config(), resolved(), MockHost::hardened(), seven_of_ten).await;
    assert_eq!(
        verdict(&run.report, "PERF-005").detail(),
        "7/10 requests succeeded (70%), minimum 80%"
    );
}

#[tokio::test]
async fn test_probe_plans_target_the_resolved_address() {
    let run = run(MockHost::hardened()).await;
    let plans = run.prober.plans();

    assert_eq!(plans.len(), 3);
    assert!(plans.iter().all(|p| p.endpoint == "http://10.0.0.4/"));
    let concurrency = plans.iter().find(|p| p.attempts == 10).unwrap();
    assert_eq!(concurrency.concurrency, 10);
    assert!(plans.iter().any(|p| p.warmup));
}

#[tokio::test]
async fn test_slow_endpoint_fails_latency() {
    let prober = FakeProber::healthy().with_latency(Duration::from_millis(2500));
    let run = run_with(&config(), resolved(), MockHost::hardened(), prober).await;
    assert_eq!(verdict(&run.report, "PERF-004").detail(), "response time 2.50s, limit 2.00s");
}

// Network latency

#[tokio::test]
async fn test_connect_latency_targets_the_ssh_port() {
    let run = run(MockHost::hardened()).await;

    let plans = run.prober.reach_plans();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].address, "10.0.0.4:22");
    assert_eq!(plans[0].attempts, 5);
    assert_eq!(verdict(&run.report, "PERF-009").detail(), "average connect time 12.0ms");
}

#[tokio::test]
async fn test_slow_connects_fail_network_latency() {
    let prober = FakeProber::healthy().with_connect_latency(Duration::from_millis(150));
    let run = run_with(&config(), resolved(), MockHost::hardened(), prober).await;

    assert_eq!(failed_ids(&run.report), vec!["PERF-009"]);
    assert_eq!(
        verdict(&run.report, "PERF-009").detail(),
        "average connect time 150.0ms, limit 100.0ms"
    );
}

#[tokio::test]
async fn test_refused_connects_fail_network_latency() {
    let prober = FakeProber::healthy().refusing_connects();
    let run = run_with(&config(), resolved(), MockHost::hardened(), prober).await;

    assert_eq!(
        verdict(&run.report, "PERF-009").detail(),
        "5/5 connections to 10.0.0.4:22 failed: Connection refused (os error 111)"
    );
    assert_eq!(run.report.exit_code(&ExitPolicy::default()), EXIT_FAIL);
}

#[tokio::test]
async fn test_listener_ceiling_counts_listening_sockets() {
    let listeners: String = (0..10)
        .map(|i| format!("tcp   LISTEN 0      128           0.0.0.0:{}        0.0.0.0:*\n", 8000 + i))
        .collect();
    let host = MockHost::hardened().on("ss -H -tuln", Reply::ok(&listeners));
    let run = run(host).await;

    assert_eq!(verdict(&run.report, "SEC-011").detail(), "10 listening sockets, limit 10");
}

#[tokio::test]
async fn test_missing_jail_section_fails_intrusion_check() {
    let host = MockHost::hardened().on("'/etc/fail2ban/jail.local'", Reply::ok("absent\n"));
    let run = run(host).await;

    assert_eq!(failed_ids(&run.report), vec!["SEC-002"]);
    assert_eq!(
        verdict(&run.report, "SEC-002").detail(),
        "no [sshd] section in /etc/fail2ban/jail.local"
    );
}
