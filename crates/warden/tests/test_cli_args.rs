//! CLI argument parsing tests for Warden

use assert_cmd::Command;
use predicates::prelude::*;

fn warden() -> Command {
    Command::new(env!("CARGO_BIN_EXE_warden"))
}

#[test]
fn test_help_flag() {
    warden()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("An agent task runtime"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("tools"));
}

#[test]
fn test_version_flag() {
    warden()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_no_args_shows_usage() {
    warden()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_unknown_subcommand() {
    warden()
        .arg("frobnicate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_serve_help() {
    warden()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--host"))
        .stdout(predicate::str::contains("-p, --port"))
        .stdout(predicate::str::contains("-v, --verbose"));
}

#[test]
fn test_serve_rejects_bad_port() {
    warden()
        .args(["serve", "--port", "99999"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--port"));
}

#[test]
fn test_id_help() {
    warden()
        .args(["id", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-c, --count"))
        .stdout(predicate::str::contains("--parse"));
}

#[test]
fn test_id_rejects_non_numeric_parse() {
    warden()
        .args(["id", "--parse", "abc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_init_and_status_help() {
    warden()
        .args(["init", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialize"));
    warden()
        .args(["status", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("status"));
}
