//! Corruption handling tests for caftrak.
//!
//! These tests verify the system:
//! - Starts empty when the ledger file is missing
//! - Refuses to run on a corrupted ledger and leaves it untouched
//! - Tolerates a damaged health log
//! - Keeps working when the health log cannot be used

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::io::Write as IoWrite;
use tempfile::TempDir;

fn cli(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("caftrak"));
    cmd.env("XDG_CONFIG_HOME", temp_dir.path().join("config"))
        .arg("--data-dir")
        .arg(temp_dir.path().join("data"));
    cmd
}

fn setup_test_dir() -> TempDir {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    fs::create_dir_all(temp_dir.path().join("data")).unwrap();
    temp_dir
}

#[test]
fn test_corrupted_ledger_is_fatal() {
    let temp_dir = setup_test_dir();
    let ledger_path = temp_dir.path().join("data/ledger.json");
    fs::write(&ledger_path, "{ invalid json }}}}").expect("Failed to write corrupted ledger");

    cli(&temp_dir)
        .args(["add", "--mg", "95"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("corrupted"));

    // The data is left for the user to recover
    assert_eq!(
        fs::read_to_string(&ledger_path).unwrap(),
        "{ invalid json }}}}"
    );
}

#[test]
fn test_truncated_ledger_is_fatal() {
    let temp_dir = setup_test_dir();
    let ledger_path = temp_dir.path().join("data/ledger.json");

    // Simulates a torn write from a tool that does not write atomically
    let mut file = fs::File::create(&ledger_path).unwrap();
    write!(
        file,
        r#"[{{"id":"00000000-0000-0000-0000-000000000000","amount_mg":95.0,"consumed_at":"20"#
    )
    .unwrap();
    drop(file);

    cli(&temp_dir).assert().code(2);
}

#[test]
fn test_empty_ledger_file_is_fatal() {
    let temp_dir = setup_test_dir();
    fs::write(temp_dir.path().join("data/ledger.json"), "").unwrap();

    cli(&temp_dir).arg("status").assert().code(2);
}

#[test]
fn test_missing_ledger_starts_empty() {
    let temp_dir = setup_test_dir();

    cli(&temp_dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No doses in the last 24 hours."));
}

#[test]
fn test_damaged_health_log_lines_are_skipped() {
    let temp_dir = setup_test_dir();
    let record = serde_json::json!({
        "external_id": "0b5a6e2c-1d3f-4a7b-9c8d-2e4f6a8b0c1d",
        "amount_mg": 64.0,
        "consumed_at": (chrono::Utc::now() - chrono::Duration::hours(1)).to_rfc3339(),
    });
    fs::write(
        temp_dir.path().join("data/health.jsonl"),
        format!("{{ not json }}\n{}\n{{\"external_id\":\"part", record),
    )
    .unwrap();

    cli(&temp_dir)
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("Synced 1 new doses"));
}

#[test]
fn test_health_log_with_invalid_utf8_still_syncs() {
    let temp_dir = setup_test_dir();
    let record = serde_json::json!({
        "external_id": "9d2e4f60-7a8b-4c1d-8e2f-3a4b5c6d7e8f",
        "amount_mg": 95.0,
        "consumed_at": (chrono::Utc::now() - chrono::Duration::hours(1)).to_rfc3339(),
    });
    let mut contents = vec![0xff, 0xfe, b'\n'];
    contents.extend(format!("{}\n", record).into_bytes());
    fs::write(temp_dir.path().join("data/health.jsonl"), contents).unwrap();

    cli(&temp_dir)
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("Synced 1 new doses"));
}

#[test]
fn test_unusable_health_log_stays_local() {
    let temp_dir = setup_test_dir();
    // A directory where the log file should be makes every read and write fail
    fs::create_dir_all(temp_dir.path().join("data/health.jsonl")).unwrap();

    cli(&temp_dir)
        .args(["add", "--mg", "95"])
        .assert()
        .success();

    let contents = fs::read_to_string(temp_dir.path().join("data/ledger.json")).unwrap();
    let ledger: Vec<serde_json::Value> = serde_json::from_str(&contents).unwrap();
    assert_eq!(ledger.len(), 1);
}
