//! Exercise library: read-only reference data about exercises.
//!
//! The core never owns exercise metadata. It reads it through the
//! [`ExerciseLookup`] trait; a built-in default library is provided and can
//! be replaced by a JSON file (`{"exercises": [...]}`).

use crate::progression::ProgressionRule;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Movement classification used for category-default progression
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    CompoundLower,
    CompoundUpperPush,
    CompoundUpperPull,
    Isolation,
    Bodyweight,
}

impl Classification {
    /// Default rule for exercises of this classification
    pub fn default_rule(self) -> ProgressionRule {
        match self {
            Classification::CompoundLower => ProgressionRule::linear(5.0),
            Classification::CompoundUpperPush => ProgressionRule::linear(2.5),
            Classification::CompoundUpperPull => ProgressionRule::DoubleProgression {
                rep_floor: 6,
                rep_ceiling: 10,
                increment: 2.5,
                deload_percent: None,
            },
            Classification::Isolation => ProgressionRule::DoubleProgression {
                rep_floor: 8,
                rep_ceiling: 12,
                increment: 2.5,
                deload_percent: None,
            },
            Classification::Bodyweight => ProgressionRule::BodyweightToWeighted {
                target_reps: 12,
                increment: 2.5,
                deload_percent: None,
            },
        }
    }
}

/// Reference metadata for one exercise
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExerciseInfo {
    pub id: String,
    pub name: String,
    /// Primary muscle group, e.g. "legs" or "chest"
    pub category: String,
    pub classification: Classification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_progression: Option<ProgressionRule>,
}

/// Lookup seam for exercise metadata supplied from outside the core
pub trait ExerciseLookup {
    fn lookup(&self, exercise_id: &str) -> Option<&ExerciseInfo>;
}

impl<T: ExerciseLookup + ?Sized> ExerciseLookup for &T {
    fn lookup(&self, exercise_id: &str) -> Option<&ExerciseInfo> {
        (**self).lookup(exercise_id)
    }
}

/// In-memory exercise library keyed by id
#[derive(Clone, Debug, Default)]
pub struct ExerciseLibrary {
    exercises: HashMap<String, ExerciseInfo>,
}

#[derive(Deserialize)]
struct LibraryFile {
    exercises: Vec<ExerciseInfo>,
}

impl ExerciseLibrary {
    pub fn new(exercises: impl IntoIterator<Item = ExerciseInfo>) -> Self {
        Self {
            exercises: exercises
                .into_iter()
                .map(|info| (info.id.clone(), info))
                .collect(),
        }
    }

    /// Load a library from a TOML file with one `[[exercises]]` table per entry
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let file: LibraryFile = toml::from_str(&contents)?;
        let library = Self::new(file.exercises);
        let errors = library.validate();
        if !errors.is_empty() {
            return Err(Error::Config(format!(
                "invalid exercise library {:?}: {}",
                path,
                errors.join("; ")
            )));
        }
        tracing::info!("Loaded {} exercises from {:?}", library.len(), path);
        Ok(library)
    }

    pub fn len(&self) -> usize {
        self.exercises.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exercises.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExerciseInfo> {
        self.exercises.values()
    }

    /// Check the library for inconsistent entries
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for (id, info) in &self.exercises {
            if id.trim().is_empty() {
                errors.push("exercise with empty id".to_string());
            }
            if info.name.trim().is_empty() {
                errors.push(format!("exercise {} has an empty name", id));
            }
            if let Some(ProgressionRule::DoubleProgression {
                rep_floor,
                rep_ceiling,
                ..
            }) = &info.default_progression
            {
                if rep_floor > rep_ceiling {
                    errors.push(format!(
                        "exercise {} has rep_floor {} above rep_ceiling {}",
                        id, rep_floor, rep_ceiling
                    ));
                }
            }
        }
        errors
    }
}

impl ExerciseLookup for ExerciseLibrary {
    fn lookup(&self, exercise_id: &str) -> Option<&ExerciseInfo> {
        self.exercises.get(exercise_id)
    }
}

/// Cached default library - built once and reused across all operations
static DEFAULT_LIBRARY: Lazy<ExerciseLibrary> = Lazy::new(build_default_library);

/// Get a reference to the cached default library
pub fn default_library() -> &'static ExerciseLibrary {
    &DEFAULT_LIBRARY
}

fn exercise(
    id: &str,
    name: &str,
    category: &str,
    classification: Classification,
) -> ExerciseInfo {
    ExerciseInfo {
        id: id.into(),
        name: name.into(),
        category: category.into(),
        classification,
        default_progression: None,
    }
}

/// Builds the default library of common lifts
pub fn build_default_library() -> ExerciseLibrary {
    use Classification::*;

    let mut pull_up = exercise("pull_up", "Pull-up", "back", Bodyweight);
    pull_up.default_progression = Some(ProgressionRule::BodyweightToWeighted {
        target_reps: 10,
        increment: 2.5,
        deload_percent: None,
    });

    let mut deadlift = exercise("deadlift", "Deadlift", "back", CompoundLower);
    deadlift.default_progression = Some(ProgressionRule::Linear {
        increment: 5.0,
        deload_percent: Some(15.0),
    });

    ExerciseLibrary::new([
        // Lower body
        exercise("barbell_squat", "Barbell Back Squat", "legs", CompoundLower),
        exercise("front_squat", "Front Squat", "legs", CompoundLower),
        deadlift,
        exercise("romanian_deadlift", "Romanian Deadlift", "legs", CompoundLower),
        exercise("leg_press", "Leg Press", "legs", CompoundLower),
        exercise("leg_curl", "Leg Curl", "legs", Isolation),
        exercise("leg_extension", "Leg Extension", "legs", Isolation),
        exercise("calf_raise", "Standing Calf Raise", "legs", Isolation),
        // Upper push
        exercise("bench_press", "Barbell Bench Press", "chest", CompoundUpperPush),
        exercise("incline_bench_press", "Incline Bench Press", "chest", CompoundUpperPush),
        exercise("overhead_press", "Overhead Press", "shoulders", CompoundUpperPush),
        exercise("dumbbell_press", "Dumbbell Bench Press", "chest", CompoundUpperPush),
        // Upper pull
        exercise("barbell_row", "Barbell Row", "back", CompoundUpperPull),
        exercise("lat_pulldown", "Lat Pulldown", "back", CompoundUpperPull),
        exercise("seated_cable_row", "Seated Cable Row", "back", CompoundUpperPull),
        // Isolation
        exercise("bicep_curl", "Bicep Curl", "arms", Isolation),
        exercise("tricep_extension", "Tricep Extension", "arms", Isolation),
        exercise("lateral_raise", "Lateral Raise", "shoulders", Isolation),
        exercise("face_pull", "Face Pull", "shoulders", Isolation),
        // Bodyweight
        pull_up,
        exercise("chin_up", "Chin-up", "back", Bodyweight),
        exercise("dip", "Dip", "chest", Bodyweight),
        exercise("push_up", "Push-up", "chest", Bodyweight),
    ])
}
