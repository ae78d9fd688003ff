use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn fimd_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("fimd"));
    cmd.env("HOME", home).env("XDG_CONFIG_HOME", home.join(".config"));
    cmd
}

fn write_config(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("fimd.yaml");
    fs::write(&path, body).expect("write config");
    path
}

#[test]
fn check_config_summarizes_a_valid_file() {
    let tmp = TempDir::new().expect("tempdir");
    let config = write_config(
        &tmp,
        r#"
scan_time: "02:00"
scan_day: monday
frequency_secs: 3600
directories:
  - path: /etc
    realtime: true
  - path: /usr/bin
    whodata: true
"#,
    );

    fimd_cmd(tmp.path())
        .arg("--config")
        .arg(&config)
        .arg("check-config")
        .assert()
        .success()
        .stdout(contains("is valid"))
        .stdout(contains("scan frequency: 604800s"))
        .stdout(contains("directories: 2 (1 real-time, 1 whodata)"));
}

#[test]
fn check_config_rejects_relative_directories() {
    let tmp = TempDir::new().expect("tempdir");
    let config = write_config(&tmp, "directories:\n  - path: etc\n    realtime: true\n");

    fimd_cmd(tmp.path())
        .args(["check-config", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(contains("failed to load configuration"));
}

#[test]
fn missing_config_file_is_reported() {
    let tmp = TempDir::new().expect("tempdir");
    fimd_cmd(tmp.path())
        .arg("--config")
        .arg(tmp.path().join("absent.yaml"))
        .arg("check-config")
        .assert()
        .failure()
        .stderr(contains("absent.yaml"));
}

#[test]
fn status_without_daemon_reports_not_running() {
    let tmp = TempDir::new().expect("tempdir");
    let socket = tmp.path().join("control.sock");
    let config = write_config(
        &tmp,
        &format!("control_socket: {}\n", socket.display()),
    );

    fimd_cmd(tmp.path())
        .arg("--config")
        .arg(&config)
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(contains(r#""running": false"#));

    fimd_cmd(tmp.path())
        .arg("--config")
        .arg(&config)
        .arg("stop")
        .assert()
        .success()
        .stdout(contains("daemon is not running"));
}
