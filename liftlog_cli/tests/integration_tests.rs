//! Integration tests for the liftlog binary.
//!
//! These tests verify end-to-end behavior including:
//! - Recording events and reading projections
//! - Template progression and personal records
//! - Validation errors and event listing
//! - CSV export

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Helper to create a test data directory
fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Helper to get the path to the CLI binary
fn cli() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("liftlog"))
}

/// CLI bound to a data directory and the test user
fn liftlog(data_dir: &Path) -> Command {
    let mut cmd = cli();
    cmd.arg("--data-dir").arg(data_dir).arg("--user").arg("alice");
    cmd
}

fn stdout_json(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("stdout is JSON")
}

fn emit(data_dir: &Path, event_type: &str, payload: Value) -> Value {
    stdout_json(
        liftlog(data_dir)
            .arg("emit")
            .arg(event_type)
            .arg(payload.to_string()),
    )
}

fn show(data_dir: &Path, key: &str) -> Value {
    stdout_json(liftlog(data_dir).arg("show").arg(key))
}

#[test]
fn test_cli_help() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Event-sourced strength training log",
        ));
}

#[test]
fn test_user_is_required() {
    let temp_dir = setup_test_dir();
    cli()
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg("show")
        .arg("templates")
        .assert()
        .failure()
        .stderr(predicate::str::contains("user_id"));

    cli()
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg("--user")
        .arg("../bob")
        .arg("show")
        .arg("templates")
        .assert()
        .failure()
        .stderr(predicate::str::contains("user_id"));
}

#[test]
fn test_event_written_to_user_log() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    let out = emit(data_dir, "WorkoutStarted", json!({"workout_id": "w1", "name": "Monday"}));
    assert_eq!(out["event"]["event_type"], "WorkoutStarted");
    assert_eq!(out["event"]["payload"]["workout_id"], "w1");

    let log = fs::read_to_string(data_dir.join("users/alice/events.jsonl")).unwrap();
    assert_eq!(log.lines().count(), 1);
    assert!(data_dir
        .join("users/alice/projections/current_workout.json")
        .exists());

    let workout = show(data_dir, "current_workout");
    assert_eq!(workout["id"], "w1");
    assert_eq!(workout["name"], "Monday");
}

#[test]
fn test_template_workout_progresses() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    emit(
        data_dir,
        "TemplateCreated",
        json!({"template_id": "legs", "name": "Legs", "exercises": [{
            "exercise_id": "barbell_squat", "target_sets": 3, "target_reps": 8,
            "target_weight": 100, "progression": {"type": "linear", "increment": 5}
        }]}),
    );
    emit(
        data_dir,
        "WorkoutStarted",
        json!({"workout_id": "w1", "from_template_id": "legs"}),
    );
    for _ in 0..3 {
        emit(
            data_dir,
            "SetLogged",
            json!({"workout_id": "w1", "exercise_id": "barbell_squat", "weight": 100, "reps": 8}),
        );
    }
    let out = emit(data_dir, "WorkoutCompleted", json!({"workout_id": "w1"}));

    let derived = &out["derived"];
    assert_eq!(derived["stats"]["total_sets"], 3);
    assert_eq!(derived["progressions"][0]["next_weight"], 105.0);
    assert_eq!(derived["progressions"][0]["note"], "+5kg");

    let states = show(data_dir, "progression_states");
    assert_eq!(states["legs:barbell_squat"]["next_weight"], 105.0);
    assert_eq!(show(data_dir, "current_workout"), Value::Null);
    assert_eq!(show(data_dir, "templates")["legs"]["use_count"], 1);
    assert_eq!(
        show(data_dir, "exercise_history:barbell_squat")
            .as_array()
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn test_weight_pr_reported() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    emit(data_dir, "WorkoutStarted", json!({"workout_id": "w1"}));
    let set = |weight: u32| {
        json!({"workout_id": "w1", "exercise_id": "deadlift", "weight": weight, "reps": 1})
    };

    let first = emit(data_dir, "SetLogged", set(110));
    assert!(first["derived"].get("is_pr").is_none());

    let second = emit(data_dir, "SetLogged", set(120));
    assert_eq!(second["derived"]["is_pr"], true);
    assert_eq!(second["derived"]["pr_type"], "weight");

    let records = show(data_dir, "personal_records");
    assert_eq!(records["deadlift"]["max_weight"]["value"], 120.0);
}

#[test]
fn test_validation_error_lists_fields_and_records_nothing() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    liftlog(data_dir)
        .arg("emit")
        .arg("SetLogged")
        .arg(r#"{"workout_id": "w1", "weight": -5, "reps": 3, "rpe": 8}"#)
        .assert()
        .failure()
        .stderr(predicate::str::contains("exercise_id"))
        .stderr(predicate::str::contains("weight"))
        .stderr(predicate::str::contains("rpe: unknown field"));

    liftlog(data_dir)
        .arg("emit")
        .arg("SetLogged")
        .arg("{not json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not valid JSON"));

    liftlog(data_dir)
        .arg("emit")
        .arg("SetLifted")
        .arg("{}")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown event type"));

    let events = stdout_json(liftlog(data_dir).arg("events"));
    assert_eq!(events, json!([]));
}

#[test]
fn test_overlong_identifier_rejected() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    emit(data_dir, "WorkoutStarted", json!({"workout_id": "w1"}));
    let long_id = "bench.press".repeat(30);
    liftlog(data_dir)
        .arg("emit")
        .arg("SetLogged")
        .arg(json!({"workout_id": "w1", "exercise_id": long_id, "weight": 60, "reps": 5}).to_string())
        .assert()
        .failure()
        .stderr(predicate::str::contains("exercise_id: must be at most 64 bytes"));

    emit(data_dir, "WorkoutCompleted", json!({"workout_id": "w1"}));
    let events = stdout_json(liftlog(data_dir).arg("events"));
    assert_eq!(events.as_array().unwrap().len(), 2);
    assert_eq!(show(data_dir, "workout_history")[0]["id"], "w1");
}

#[test]
fn test_payload_from_stdin() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    liftlog(data_dir)
        .arg("emit")
        .arg("TemplateCreated")
        .arg("-")
        .write_stdin(r#"{"template_id": "push", "name": "Push", "exercise_ids": ["bench_press"]}"#)
        .assert()
        .success();

    let templates = show(data_dir, "templates");
    assert_eq!(templates["push"]["exercises"][0]["exercise_id"], "bench_press");
}

#[test]
fn test_events_listing_filters() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    emit(data_dir, "WorkoutStarted", json!({"workout_id": "w1"}));
    emit(
        data_dir,
        "ExerciseAdded",
        json!({"workout_id": "w1", "exercise_id": "dip"}),
    );
    emit(
        data_dir,
        "ExerciseAdded",
        json!({"workout_id": "w1", "exercise_id": "pull_up"}),
    );

    let events = stdout_json(liftlog(data_dir).arg("events"));
    let events = events.as_array().unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0]["payload"]["exercise_id"], "pull_up");

    let added = stdout_json(
        liftlog(data_dir)
            .arg("events")
            .arg("--type")
            .arg("ExerciseAdded")
            .arg("--limit")
            .arg("1"),
    );
    assert_eq!(added.as_array().unwrap().len(), 1);
    assert_eq!(added[0]["payload"]["exercise_id"], "pull_up");
}

#[test]
fn test_unknown_projection_key() {
    let temp_dir = setup_test_dir();
    liftlog(temp_dir.path())
        .arg("show")
        .arg("sessions")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown projection"));
}

#[test]
fn test_export_history_csv() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    emit(data_dir, "WorkoutStarted", json!({"workout_id": "w1"}));
    for reps in [5, 5] {
        emit(
            data_dir,
            "SetLogged",
            json!({"workout_id": "w1", "exercise_id": "bench_press", "weight": 80, "reps": reps}),
        );
    }
    emit(data_dir, "WorkoutCompleted", json!({"workout_id": "w1"}));

    let csv_path = data_dir.join("export/history.csv");
    let out = stdout_json(liftlog(data_dir).arg("export-history").arg(&csv_path));
    assert_eq!(out["rows"], 2);
    assert_eq!(out["workouts"], 1);

    let csv = fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<_> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("workout_id,"));
    assert!(lines[1].contains("bench_press"));
}
