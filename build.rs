//! Build script for host-preflight.
//!
//! Embeds git commit, build date and rustc version so `host-preflight version`
//! can identify the exact binary that produced a report.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=.git/HEAD");

    println!(
        "cargo:rustc-env=HOST_PREFLIGHT_TARGET={}",
        env::var("TARGET").unwrap_or_else(|_| "unknown".to_string())
    );

    if let Some(hash) = command_stdout("git", &["rev-parse", "--short", "HEAD"]) {
        println!("cargo:rustc-env=HOST_PREFLIGHT_GIT_HASH={}", hash);
    }

    if let Some(date) = command_stdout("date", &["-u", "+%Y-%m-%dT%H:%M:%SZ"]) {
        println!("cargo:rustc-env=HOST_PREFLIGHT_BUILD_DATE={}", date);
    }

    // "rustc 1.75.0 (...)" -> "1.75.0"
    if let Some(version) = command_stdout("rustc", &["--version"])
        .and_then(|s| s.split_whitespace().nth(1).map(|v| v.to_string()))
    {
        println!("cargo:rustc-env=HOST_PREFLIGHT_RUSTC_VERSION={}", version);
    }
}

/// Run a build-host command and return its trimmed stdout on success
fn command_stdout(program: &str, args: &[&str]) -> Option<String> {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                String::from_utf8(output.stdout)
                    .ok()
                    .map(|s| s.trim().to_string())
            } else {
                None
            }
        })
}
