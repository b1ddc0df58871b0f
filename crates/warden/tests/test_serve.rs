//! End-to-end tests against a running `warden serve`

mod common;

use common::TestEnv;
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::process::{Child, Stdio};
use std::time::{Duration, Instant};

/// Kills the server when the test ends, pass or fail
struct Running {
    child: Child,
    addr: SocketAddr,
}

impl Drop for Running {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn start(env: &TestEnv) -> Running {
    start_with(env, &[])
}

fn start_with(env: &TestEnv, vars: &[(&str, &str)]) -> Running {
    let mut child = env
        .process()
        .arg("serve")
        .envs(vars.iter().copied())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to start warden serve");

    let stdout = child.stdout.take().unwrap();
    let mut lines = BufReader::new(stdout).lines();
    let addr = loop {
        let line = lines
            .next()
            .expect("server exited before listening")
            .unwrap();
        if let Some(addr) = line.strip_prefix("◆ Listening on ") {
            break addr.trim().parse().unwrap();
        }
    };
    // Keep draining so the server never blocks on a full pipe
    std::thread::spawn(move || lines.for_each(drop));

    Running { child, addr }
}

fn connect(addr: SocketAddr) -> (TcpStream, BufReader<TcpStream>) {
    let stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    let reader = BufReader::new(stream.try_clone().unwrap());
    (stream, reader)
}

fn send(stream: &mut TcpStream, message: Value) {
    writeln!(stream, "{}", message).unwrap();
}

fn read_message(reader: &mut BufReader<TcpStream>) -> Option<Value> {
    let mut line = String::new();
    match reader.read_line(&mut line).unwrap() {
        0 => None,
        _ => Some(serde_json::from_str(&line).unwrap()),
    }
}

fn read_until_event(reader: &mut BufReader<TcpStream>, event: &str) -> Vec<Value> {
    let mut seen = Vec::new();
    while let Some(message) = read_message(reader) {
        let done = message["event"] == event;
        seen.push(message);
        if done {
            return seen;
        }
    }
    panic!("connection closed before {}: {:?}", event, seen);
}

fn serving_env() -> TestEnv {
    let env = TestEnv::new().expect("Failed to create test environment");
    env.write_config(r#"{"deploy": {"port": 0}, "watchdog": {"enabled": false}}"#)
        .unwrap();
    env
}

#[test]
fn test_chat_round_trip() {
    let env = serving_env();
    let server = start(&env);
    let (mut stream, mut reader) = connect(server.addr);

    send(
        &mut stream,
        json!({"type": "chat", "message_id": "m1", "prompt": "hello there"}),
    );

    let seen = read_until_event(&mut reader, "task_finished");
    assert_eq!(seen[0], json!({"type": "ack", "message_id": "m1"}));
    assert!(seen.iter().any(|m| m["event"] == "task_started"));

    let finished = seen.last().unwrap();
    assert_eq!(finished["message_id"], "m1");
    assert_eq!(finished["data"]["reply"], "hello there");
    assert!(finished["task_id"].as_u64().unwrap() > 0);
}

#[test]
fn test_tool_call_writes_into_workspace() {
    let env = serving_env();
    let server = start(&env);
    let (mut stream, mut reader) = connect(server.addr);

    send(
        &mut stream,
        json!({
            "type": "chat",
            "message_id": "m1",
            "prompt": "/call write_file {\"path\": \"notes/a.txt\", \"content\": \"saved\"}"
        }),
    );

    let seen = read_until_event(&mut reader, "task_finished");
    assert!(seen.iter().any(|m| m["event"] == "tool_completed"));

    let written = std::fs::read_to_string(env.workspace_dir.join("notes/a.txt")).unwrap();
    assert_eq!(written, "saved");
}

#[test]
fn test_protocol_error_closes_connection() {
    let env = serving_env();
    let server = start(&env);
    let (mut stream, mut reader) = connect(server.addr);

    writeln!(stream, "this is not json").unwrap();

    let error = read_message(&mut reader).unwrap();
    assert_eq!(error["type"], "error");
    assert!(read_message(&mut reader).is_none());

    // Other connections are unaffected
    let (mut stream, mut reader) = connect(server.addr);
    send(&mut stream, json!({"type": "init", "message_id": "hello"}));
    assert_eq!(
        read_message(&mut reader).unwrap(),
        json!({"type": "ack", "message_id": "hello"})
    );
}

#[test]
fn test_idle_shutdown() {
    let env = TestEnv::new().expect("Failed to create test environment");
    env.write_config(r#"{"deploy": {"port": 0}, "watchdog": {"check_interval_secs": 1}}"#)
        .unwrap();

    let mut child = env
        .process()
        .arg("serve")
        .env("WARDEN_IDLE_TIMEOUT", "1")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(20);
    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        if Instant::now() > deadline {
            let _ = child.kill();
            panic!("server did not stop on idle");
        }
        std::thread::sleep(Duration::from_millis(100));
    };
    assert!(status.success());

    let mut out = String::new();
    std::io::Read::read_to_string(&mut child.stdout.take().unwrap(), &mut out).unwrap();
    assert!(out.contains("Idle for"), "{}", out);
    assert!(out.contains("◆ Stopped"), "{}", out);
}

#[test]
fn test_shutdown_closes_open_sessions() {
    let env = TestEnv::new().expect("Failed to create test environment");
    env.write_config(r#"{"deploy": {"port": 0}, "watchdog": {"check_interval_secs": 1}}"#)
        .unwrap();
    let mut server = start_with(&env, &[("WARDEN_IDLE_TIMEOUT", "2")]);
    let (mut stream, mut reader) = connect(server.addr);

    send(
        &mut stream,
        json!({"type": "chat", "message_id": "m1", "prompt": "/call sleep {\"seconds\": 60}"}),
    );
    read_until_event(&mut reader, "task_started");

    // The idle shutdown cancels the sleeping task and closes the socket
    while read_message(&mut reader).is_some() {}

    let deadline = Instant::now() + Duration::from_secs(20);
    let status = loop {
        if let Some(status) = server.child.try_wait().unwrap() {
            break status;
        }
        assert!(Instant::now() < deadline, "server did not stop");
        std::thread::sleep(Duration::from_millis(100));
    };
    assert!(status.success());
}
