//! `srvw` binary behaviour

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn srvw(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("srvw").unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "").unwrap();
    cmd.env("NO_COLOR", "1")
        .env("HOME", dir.path())
        .arg("--config")
        .arg(&config)
        .arg("--state-dir")
        .arg(dir.path().join("state"))
        .arg("--log-dir")
        .arg(dir.path().join("logs"));
    cmd
}

#[test]
fn status_of_unknown_server_is_stopped() {
    let dir = TempDir::new().unwrap();
    srvw(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("review-server is stopped"));
}

#[test]
fn stop_when_stopped_succeeds() {
    let dir = TempDir::new().unwrap();
    srvw(&dir)
        .args(["--name", "docs", "stop"])
        .assert()
        .success()
        .stdout(predicate::str::contains("docs already stopped"));
}

#[test]
fn status_json() {
    let dir = TempDir::new().unwrap();
    srvw(&dir)
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""state": "stopped""#));
}

#[test]
fn start_without_command_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    srvw(&dir)
        .arg("start")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No server command configured"));
}

#[test]
fn invalid_name_is_rejected() {
    let dir = TempDir::new().unwrap();
    srvw(&dir)
        .args(["--name", "../escape", "status"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("path separators"));
}

#[test]
fn version_flag() {
    Command::cargo_bin("srvw")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[cfg(unix)]
#[test]
fn start_then_stop_through_the_binary() {
    let dir = TempDir::new().unwrap();
    srvw(&dir)
        .args(["start", "--", "sleep", "30"])
        .assert()
        .success()
        .stdout(predicate::str::contains("review-server started (PID"));

    srvw(&dir)
        .args(["start", "--", "sleep", "30"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already running"));

    srvw(&dir)
        .args(["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("is running"));

    srvw(&dir)
        .args(["stop", "--grace-ms", "1000", "--poll-ms", "50"])
        .assert()
        .success()
        .stdout(predicate::str::contains("review-server stopped"));
}

#[test]
fn rust_log_applies_without_log_level_flag() {
    let dir = TempDir::new().unwrap();
    let diag = dir.path().join("diag.log");
    srvw(&dir)
        .env("RUST_LOG", "srvwarden=debug")
        .arg("--log-file")
        .arg(&diag)
        .arg("status")
        .assert()
        .success();
    let text = std::fs::read_to_string(&diag).unwrap();
    assert!(text.contains("settings resolved"), "{text}");
}

#[test]
fn quiet_by_default_without_rust_log() {
    let dir = TempDir::new().unwrap();
    let diag = dir.path().join("diag.log");
    srvw(&dir)
        .env_remove("RUST_LOG")
        .arg("--log-file")
        .arg(&diag)
        .arg("status")
        .assert()
        .success();
    let text = std::fs::read_to_string(&diag).unwrap_or_default();
    assert!(!text.contains("settings resolved"), "{text}");
}
