//! Command execution tests for Warden

mod common;

use common::TestEnv;
use predicates::prelude::*;
use serde_json::Value;

fn stdout_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

// ============================================================================
// Init and status
// ============================================================================

#[test]
fn test_init_creates_config_and_workspace() {
    let env = TestEnv::new().expect("Failed to create test environment");

    env.command()
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initializing Warden"))
        .stdout(predicate::str::contains("Warden initialized"));

    assert!(env.config_file().exists());
    assert!(env.workspace_dir.is_dir());

    let saved: Value =
        serde_json::from_str(&std::fs::read_to_string(env.config_file()).unwrap()).unwrap();
    assert_eq!(saved["deploy"]["port"], 18790);
    assert_eq!(saved["operative"]["model"], "loopback");
}

#[test]
fn test_init_keeps_existing_config() {
    let env = TestEnv::new().expect("Failed to create test environment");
    env.write_config(r#"{"deploy": {"port": 4000}}"#).unwrap();

    env.command().arg("init").assert().success();

    let saved = std::fs::read_to_string(env.config_file()).unwrap();
    assert!(saved.contains("4000"));
}

#[test]
fn test_status_without_config() {
    let env = TestEnv::new().expect("Failed to create test environment");

    env.command()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Warden Status"))
        .stdout(predicate::str::contains("[Missing]"))
        .stdout(predicate::str::contains("Worker id: [Random]"));
}

#[test]
fn test_status_after_init() {
    let env = TestEnv::new().expect("Failed to create test environment");
    env.command().arg("init").assert().success();

    env.command()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("[OK]"))
        .stdout(predicate::str::contains("Model:     loopback"))
        .stdout(predicate::str::contains("Listen:    127.0.0.1:18790"))
        .stdout(predicate::str::contains("Idle:      3600s"))
        .stdout(predicate::str::contains("Tools:     4 of 4 available"));
}

#[test]
fn test_status_reads_overrides() {
    let env = TestEnv::new().expect("Failed to create test environment");
    env.write_config(r#"{"runtime": {"worker_id": 12}}"#).unwrap();

    env.command()
        .arg("status")
        .env("WARDEN_IDLE_TIMEOUT", "90")
        .assert()
        .success()
        .stdout(predicate::str::contains("Idle:      90s"))
        .stdout(predicate::str::contains("Worker id: 12"));
}

#[test]
fn test_status_rejects_bad_worker_id() {
    let env = TestEnv::new().expect("Failed to create test environment");

    env.command()
        .arg("status")
        .env("WARDEN_WORKER_ID", "not-a-number")
        .assert()
        .failure()
        .stderr(predicate::str::contains("WARDEN_WORKER_ID"));
}

#[test]
fn test_malformed_config_fails() {
    let env = TestEnv::new().expect("Failed to create test environment");
    env.write_config("{ not json").unwrap();

    env.command()
        .arg("tools")
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG PARSE ERROR"));
}

// ============================================================================
// Tools
// ============================================================================

#[test]
fn test_tools_prints_signatures() {
    let env = TestEnv::new().expect("Failed to create test environment");

    let output = env.command().arg("tools").output().unwrap();
    assert!(output.status.success());

    let signatures: Value = serde_json::from_str(&stdout_of(&output)).unwrap();
    let names: Vec<&str> = signatures
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["echo", "exec", "sleep", "write_file"]);
    assert_eq!(signatures[0]["parameters"]["required"][0], "text");
}

#[test]
fn test_tools_hides_disabled() {
    let env = TestEnv::new().expect("Failed to create test environment");
    env.write_config(r#"{"toolkit": {"tools": {"exec": false}}}"#)
        .unwrap();

    let output = env.command().arg("tools").output().unwrap();
    assert!(output.status.success());

    let signatures: Value = serde_json::from_str(&stdout_of(&output)).unwrap();
    assert!(signatures
        .as_array()
        .unwrap()
        .iter()
        .all(|s| s["name"] != "exec"));
    assert!(String::from_utf8_lossy(&output.stderr).contains("exec unavailable: disabled"));
}

// ============================================================================
// Identifiers
// ============================================================================

#[test]
fn test_id_generates_increasing_ids() {
    let env = TestEnv::new().expect("Failed to create test environment");

    let output = env
        .command()
        .args(["id", "--count", "3"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let ids: Vec<u64> = stdout_of(&output)
        .lines()
        .map(|line| line.trim().parse().unwrap())
        .collect();
    assert_eq!(ids.len(), 3);
    assert!(ids[0] < ids[1] && ids[1] < ids[2]);
}

#[test]
fn test_id_parse_recovers_worker() {
    let env = TestEnv::new().expect("Failed to create test environment");

    let output = env
        .command()
        .arg("id")
        .env("WARDEN_WORKER_ID", "7")
        .output()
        .unwrap();
    assert!(output.status.success());
    let id = stdout_of(&output).trim().to_string();

    let output = env.command().args(["id", "--parse", &id]).output().unwrap();
    assert!(output.status.success());

    let decoded: Value = serde_json::from_str(&stdout_of(&output)).unwrap();
    assert_eq!(decoded["id"].as_u64().unwrap().to_string(), id);
    assert_eq!(decoded["worker_id"], 7);
    assert!(decoded["timestamp"].as_str().unwrap().starts_with("20"));
}

#[test]
fn test_id_rejects_out_of_range_worker() {
    let env = TestEnv::new().expect("Failed to create test environment");

    env.command()
        .arg("id")
        .env("WARDEN_WORKER_ID", "4096")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid worker id"));
}
