//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run against the dev data directory
//! and verify outputs.

use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-p", "schedalarm-cli", "--"])
        .args(args)
        .env("SCHEDALARM_ENV", "dev")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

#[test]
fn duration_normalizes_plain_span() {
    let (stdout, _, code) = run_cli(&[
        "duration",
        "2024-03-10T09:00:00Z",
        "2024-03-10T17:00:00Z",
        "daily",
    ]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "480");
}

#[test]
fn duration_folds_negative_span() {
    let (stdout, _, code) = run_cli(&[
        "duration",
        "2024-03-10T09:00:00Z",
        "2024-03-09T17:00:00Z",
        "daily",
    ]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "480");
}

#[test]
fn rejects_unknown_repeat_kind() {
    let (_, stderr, code) = run_cli(&[
        "duration",
        "2024-03-10T09:00:00Z",
        "2024-03-10T17:00:00Z",
        "fortnightly",
    ]);
    assert_ne!(code, 0);
    assert!(stderr.contains("fortnightly"));
}

#[test]
fn schedule_add_list_cancel_cycle() {
    let tag = format!("cli-test-{}", std::process::id());

    let (stdout, stderr, code) = run_cli(&["schedule", "add", "09:00", "480", "daily", &tag]);
    assert_eq!(code, 0, "add failed: {stderr}");
    assert!(stdout.contains("schedule added"));

    let (stdout, _, code) = run_cli(&["schedule", "list", "--tag", &tag]);
    assert_eq!(code, 0);
    let states: serde_json::Value = serde_json::from_str(&stdout).expect("list output is JSON");
    let states = states.as_array().expect("JSON array");
    assert_eq!(states.len(), 1);
    assert_eq!(states[0]["tag"], tag.as_str());
    assert_eq!(states[0]["disabled"], false);

    let (stdout, _, code) = run_cli(&["schedule", "cancel-tag", &tag]);
    assert_eq!(code, 0);
    assert!(stdout.contains("schedules cancelled: 1"));
}

#[test]
fn add_rejects_non_positive_duration() {
    let tag = format!("cli-bad-{}", std::process::id());
    let (_, stderr, code) = run_cli(&["schedule", "add", "09:00", "0", "daily", &tag]);
    assert_ne!(code, 0);
    assert!(stderr.contains("duration"));
}

#[test]
fn cancel_unknown_schedule_fails() {
    let (_, stderr, code) = run_cli(&["schedule", "cancel", "999999"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("not found"));
}
