use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use tempfile::{TempDir, tempdir};

/// A workspace with a config file, a one-host source dump and a target snapshot.
fn workspace() -> TempDir {
    let dir = tempdir().unwrap();
    let root = dir.path();

    fs::create_dir(root.join("source")).unwrap();
    fs::write(
        root.join("source").join("objects_monitoring01.json"),
        json!([
            {
                "object_type": "host",
                "host_name": "web1",
                "check_interval": "1",
                "retry_interval": "1",
                "max_check_attempts": "3",
                "notifications_enabled": "1"
            },
            {
                "object_type": "service",
                "host_name": "web1",
                "service_description": "PING",
                "check_command": "check_ping_4!100.0,20%",
                "notifications_enabled": "1"
            },
            {
                "object_type": "hostdowntime",
                "host_name": "web1",
                "author": "ops",
                "comment": "rack move",
                "start_time": "1700000000",
                "end_time": "1700003600",
                "duration": "3600",
                "fixed": "1"
            }
        ])
        .to_string(),
    )
    .unwrap();

    fs::write(
        root.join("target.json"),
        json!([
            {
                "name": "web1",
                "type": "Host",
                "attrs": {
                    "check_interval": 120.0,
                    "retry_interval": 60.0,
                    "max_check_attempts": 3,
                    "enable_notifications": true
                }
            },
            {
                "name": "web1!ping",
                "type": "Service",
                "attrs": {
                    "host_name": "web1",
                    "name": "ping",
                    "check_command": "ping",
                    "enable_notifications": true
                }
            }
        ])
        .to_string(),
    )
    .unwrap();

    fs::write(
        root.join("monmig.toml"),
        format!(
            r#"
[source]
snapshot_dir = "{}"

[target]
snapshot = "{}"

[logging]
level = "warn"
"#,
            root.join("source").display(),
            root.join("target.json").display()
        ),
    )
    .unwrap();

    dir
}

fn monmig(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("monmig").unwrap();
    cmd.current_dir(root)
        .env("HOME", root)
        .env("NO_COLOR", "1")
        .env_remove("MONMIG_CONFIG")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(root.join("monmig.toml"));
    cmd
}

fn stdout_json(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("stdout should be valid json")
}

#[test]
fn compare_hosts_reports_interval_drift() {
    let dir = workspace();
    let report = stdout_json(monmig(dir.path()).arg("compare-hosts"));

    assert_eq!(report["command"], "compare-hosts");
    assert_eq!(report["report"]["hosts_compared"], 1);
    let discrepancy = &report["report"]["discrepancies"][0];
    assert_eq!(discrepancy["host"], "web1");
    assert_eq!(discrepancy["diffs"][0]["attribute"], "check_interval");
}

#[test]
fn empty_source_exits_with_error_envelope() {
    let dir = workspace();
    let empty = dir.path().join("empty");
    fs::create_dir(&empty).unwrap();

    monmig(dir.path())
        .arg("--source-dir")
        .arg(&empty)
        .arg("compare-services")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("\"error\":\"empty_source\""));
}

#[test]
fn migrate_downtimes_simulates_by_default() {
    let dir = workspace();
    let before = fs::read_to_string(dir.path().join("target.json")).unwrap();

    let report = stdout_json(
        monmig(dir.path())
            .arg("migrate-downtimes")
            .arg("--scope")
            .arg("host"),
    );

    assert_eq!(report["report"]["mode"], "simulate");
    assert_eq!(report["report"]["summary"]["planned"], 1);
    assert_eq!(report["report"]["summary"]["created"], 0);
    assert_eq!(
        fs::read_to_string(dir.path().join("target.json")).unwrap(),
        before
    );
}

#[test]
fn report_can_be_written_to_a_file() {
    let dir = workspace();
    let out = dir.path().join("report.yaml");

    monmig(dir.path())
        .args(["--format", "yaml", "--output"])
        .arg(&out)
        .arg("compare-services")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let written = fs::read_to_string(&out).unwrap();
    assert!(written.contains("command: compare-services"));
    assert!(written.contains("paired: 1"));
}

#[test]
fn unknown_host_for_active_checks_fails() {
    let dir = workspace();
    monmig(dir.path())
        .args(["set-active-checks", "db9", "--disable", "--apply"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("host_not_found"));
}
