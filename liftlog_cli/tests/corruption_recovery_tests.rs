//! Corruption recovery tests for liftlog.
//!
//! These tests verify the system can handle:
//! - Corrupted event log lines
//! - Corrupted or missing projection files
//! - Events that were recorded but could not be applied

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::io::Write as IoWrite;
use std::path::Path;
use tempfile::TempDir;

fn cli() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("liftlog"))
}

fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

fn liftlog(data_dir: &Path) -> Command {
    let mut cmd = cli();
    cmd.arg("--data-dir").arg(data_dir).arg("--user").arg("alice");
    cmd
}

fn stdout_json(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("stdout is JSON")
}

fn emit(data_dir: &Path, event_type: &str, payload: &str) {
    liftlog(data_dir)
        .arg("emit")
        .arg(event_type)
        .arg(payload)
        .assert()
        .success();
}

#[test]
fn test_corrupted_log_lines_skipped() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    emit(data_dir, "TemplateCreated", r#"{"template_id": "a", "name": "A"}"#);

    // Simulate a torn write followed by further appends
    let log_path = data_dir.join("users/alice/events.jsonl");
    let mut file = fs::OpenOptions::new()
        .append(true)
        .open(&log_path)
        .expect("Failed to open log");
    writeln!(file, "{{ invalid json").unwrap();
    drop(file);

    emit(data_dir, "TemplateCreated", r#"{"template_id": "b", "name": "B"}"#);

    let events = stdout_json(liftlog(data_dir).arg("events"));
    assert_eq!(events.as_array().unwrap().len(), 2);

    let report = stdout_json(liftlog(data_dir).arg("rebuild"));
    assert_eq!(report["events"], 2);
    assert_eq!(report["applied"], 2);
}

#[test]
fn test_corrupted_projection_restored_by_rebuild() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    emit(data_dir, "WorkoutStarted", r#"{"workout_id": "w1"}"#);

    let projection = data_dir.join("users/alice/projections/current_workout.json");
    fs::write(&projection, "{ invalid json }}}}").expect("Failed to corrupt projection");

    // Unreadable documents read as absent
    let shown = stdout_json(liftlog(data_dir).arg("show").arg("current_workout"));
    assert_eq!(shown, Value::Null);

    liftlog(data_dir).arg("rebuild").assert().success();
    let shown = stdout_json(liftlog(data_dir).arg("show").arg("current_workout"));
    assert_eq!(shown["id"], "w1");
}

#[test]
fn test_missing_projection_directory() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    emit(data_dir, "TemplateCreated", r#"{"template_id": "push", "name": "Push"}"#);
    fs::remove_dir_all(data_dir.join("users/alice/projections")).unwrap();

    let report = stdout_json(liftlog(data_dir).arg("rebuild"));
    assert_eq!(report["applied"], 1);
    let templates = stdout_json(liftlog(data_dir).arg("show").arg("templates"));
    assert_eq!(templates["push"]["name"], "Push");
}

#[test]
fn test_unapplied_event_stays_recorded() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    emit(data_dir, "WorkoutStarted", r#"{"workout_id": "w1"}"#);
    let before = stdout_json(liftlog(data_dir).arg("show").arg("current_workout"));

    liftlog(data_dir)
        .arg("emit")
        .arg("SetDeleted")
        .arg(r#"{"workout_id": "w1", "original_event_id": "6c1f4a52-43cb-4d49-9a0f-9f1d1d2b7f10"}"#)
        .assert()
        .failure()
        .stderr(predicate::str::contains("set not found"));

    let after = stdout_json(liftlog(data_dir).arg("show").arg("current_workout"));
    assert_eq!(before, after);

    let report = stdout_json(liftlog(data_dir).arg("rebuild"));
    assert_eq!(report["events"], 2);
    assert_eq!(report["skipped"], 1);
    let rebuilt = stdout_json(liftlog(data_dir).arg("show").arg("current_workout"));
    assert_eq!(rebuilt, before);
}

#[test]
fn test_empty_data_dir() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().join("does/not/exist");

    let events = stdout_json(liftlog(&data_dir).arg("events"));
    assert_eq!(events, Value::Array(Vec::new()));
    let report = stdout_json(liftlog(&data_dir).arg("rebuild"));
    assert_eq!(report["events"], 0);
}
