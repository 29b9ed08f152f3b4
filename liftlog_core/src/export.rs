//! CSV export of the workout history.
//!
//! One row per logged set, most recent workout first, so the history can be
//! opened in a spreadsheet or archived outside the event log.

use crate::types::{SetStatus, WorkoutSnapshot};
use crate::Result;
use std::io::Write;
use std::path::Path;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow<'a> {
    workout_id: &'a str,
    workout_name: Option<&'a str>,
    completed_at: String,
    exercise_id: &'a str,
    set_number: usize,
    weight: f64,
    reps: u32,
    unit: &'static str,
    status: &'static str,
}

fn status_label(status: SetStatus) -> &'static str {
    match status {
        SetStatus::Completed => "completed",
        SetStatus::Failed => "failed",
        SetStatus::Skipped => "skipped",
    }
}

/// Write every set of `history` as CSV, returning the number of rows
pub fn write_history_csv<W: Write>(history: &[WorkoutSnapshot], writer: W) -> Result<usize> {
    let mut writer = csv::Writer::from_writer(writer);
    let mut rows = 0;

    for workout in history {
        let completed_at = workout.completed_at.to_rfc3339();
        for exercise in &workout.exercises {
            for (index, set) in exercise.sets.iter().enumerate() {
                writer.serialize(CsvRow {
                    workout_id: &workout.id,
                    workout_name: workout.name.as_deref(),
                    completed_at: completed_at.clone(),
                    exercise_id: &exercise.exercise_id,
                    set_number: index + 1,
                    weight: set.weight,
                    reps: set.reps,
                    unit: set.unit.as_str(),
                    status: status_label(set.status),
                })?;
                rows += 1;
            }
        }
    }

    writer.flush()?;
    Ok(rows)
}

/// Export `history` to a CSV file, replacing any previous export
///
/// The file is fsynced before returning.
pub fn export_history_csv(history: &[WorkoutSnapshot], csv_path: &Path) -> Result<usize> {
    if let Some(parent) = csv_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::File::create(csv_path)?;
    let rows = write_history_csv(history, &file)?;
    file.sync_all()?;

    tracing::info!("Exported {} sets to {:?}", rows, csv_path);
    Ok(rows)
}
