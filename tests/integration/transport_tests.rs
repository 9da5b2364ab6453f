//! Runs over the system ssh transport.
//!
//! A stand-in client executes the remote command line locally, with fake
//! remote tools placed first on PATH.

#![cfg(unix)]

use crate::mocks::FakeProber;
use host_preflight::platform::clock::TokioClock;
use host_preflight::platform::inventory::{Resolution, ResolvedFrom, Target};
use host_preflight::platform::ssh::SystemSsh;
use host_preflight::{run_preflight_with, PreflightConfig};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn executable(path: &Path, body: &str) {
    std::fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// Client running the last argument with `bin` ahead of PATH
fn local_client(dir: &Path, bin: &Path) -> PathBuf {
    let client = dir.join("ssh");
    executable(
        &client,
        &format!(
            "PATH=\"{}:$PATH\"\nexport PATH\nfor last; do :; done\nexec sh -c \"$last\"",
            bin.display()
        ),
    );
    client
}

#[tokio::test]
async fn test_remote_exit_255_reaches_the_evaluator() {
    let dir = tempfile::tempdir().unwrap();
    let bin = dir.path().join("bin");
    std::fs::create_dir(&bin).unwrap();
    executable(
        &bin.join("sysctl"),
        "case \"$2\" in\n\
         net.ipv4.conf.default.send_redirects)\n\
           echo \"sysctl: cannot stat /proc/sys/net/ipv4/conf/default/send_redirects: No such file or directory\" >&2\n\
           exit 255 ;;\n\
         *) echo 0 ;;\n\
         esac",
    );
    let client = local_client(dir.path(), &bin);

    let config = PreflightConfig {
        only_checks: vec!["SEC-004".to_string()],
        ..Default::default()
    };
    let transport = Arc::new(SystemSsh::from_settings(&config.suite.connection).with_program(client));
    let resolution = Resolution::Resolved(Target::new("10.0.0.4", "azureuser", 22, ResolvedFrom::Override).unwrap());

    let report = run_preflight_with(
        &config,
        resolution,
        transport,
        Arc::new(TokioClock),
        Arc::new(FakeProber::healthy()),
    )
    .await;

    assert!(report.aborted.is_none(), "{:?}", report.aborted);
    let verdict = report.checks[0].verdict.as_ref().unwrap();
    assert!(verdict.is_pass(), "{}", verdict);
    assert_eq!(
        verdict.detail(),
        "4 parameters as expected, not present: net.ipv4.conf.default.send_redirects"
    );
}

#[tokio::test]
async fn test_remote_command_exit_status_is_preserved() {
    let dir = tempfile::tempdir().unwrap();
    let bin = dir.path().join("bin");
    std::fs::create_dir(&bin).unwrap();
    executable(&bin.join("systemctl"), "echo inactive\nexit 3");
    let client = local_client(dir.path(), &bin);

    let mut config = PreflightConfig {
        only_checks: vec!["SVC-001".to_string()],
        ..Default::default()
    };
    config.suite.services.required_active = vec!["fail2ban".to_string()];
    config.suite.services.required_enabled = Vec::new();
    let transport = Arc::new(SystemSsh::from_settings(&config.suite.connection).with_program(client));
    let resolution = Resolution::Resolved(Target::new("10.0.0.4", "azureuser", 22, ResolvedFrom::Override).unwrap());

    let report = run_preflight_with(
        &config,
        resolution,
        transport,
        Arc::new(TokioClock),
        Arc::new(FakeProber::healthy()),
    )
    .await;

    let verdict = report.checks[0].verdict.as_ref().unwrap();
    assert_eq!(verdict.detail(), "inactive: fail2ban");
}
