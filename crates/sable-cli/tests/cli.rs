//! End-to-end tests for the `sable` binary.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn sable() -> Command {
    let mut cmd = Command::cargo_bin("sable").unwrap();
    cmd.env_remove("SABLE_CONFIG");
    cmd
}

#[test]
fn test_config_prints_defaults() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("none.json");
    sable()
        .env("SABLE_CONFIG", &missing)
        .env("HOME", temp.path())
        .env("XDG_CONFIG_HOME", temp.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"chunk_size\": 1024"))
        .stdout(predicate::str::contains("\"debounce_ms\": 150"));
}

#[test]
fn test_config_file_overrides() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.json");
    fs::write(&path, r#"{ "process": { "shell": "bash" } }"#).unwrap();

    sable()
        .arg("--config")
        .arg(&path)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"shell\": \"bash\""));
}

#[test]
fn test_invalid_config_fails() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.json");
    fs::write(&path, "{ not json").unwrap();

    sable()
        .arg("--config")
        .arg(&path)
        .arg("config")
        .assert()
        .failure();
}

#[cfg(unix)]
#[test]
fn test_exec_streams_output_and_exit_code() {
    let temp = TempDir::new().unwrap();
    sable()
        .arg("exec")
        .arg("printf hello; exit 4")
        .arg("--dir")
        .arg(temp.path())
        .write_stdin("")
        .assert()
        .code(4)
        .stdout("hello");
}

#[cfg(unix)]
#[test]
fn test_exec_forwards_stdin_lines() {
    sable()
        .arg("exec")
        .arg(r#"IFS= read -r l; printf "<%s>" "$l""#)
        .write_stdin("typed\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("<typed>"));
}

#[test]
fn test_watch_missing_path_fails() {
    let temp = TempDir::new().unwrap();
    sable()
        .arg("watch")
        .arg(temp.path().join("missing"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Path not found"));
}
