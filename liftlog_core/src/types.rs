//! Core domain types for liftlog.
//!
//! This module defines the value types folded into projections:
//! - Units, set statuses and set types
//! - Template exercise specifications and their resolved targets
//! - Logged sets, the live workout and history snapshots

use crate::progression::ProgressionRule;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Conversion factor used to normalize volumes and records to kilograms
pub const LB_TO_KG: f64 = 0.453592;

// ============================================================================
// Units and Set Attributes
// ============================================================================

/// Unit a weight was entered in
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WeightUnit {
    #[default]
    Kg,
    Lb,
}

impl WeightUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            WeightUnit::Kg => "kg",
            WeightUnit::Lb => "lb",
        }
    }

    /// Convert a weight in this unit to kilograms
    pub fn to_kg(self, weight: f64) -> f64 {
        match self {
            WeightUnit::Kg => weight,
            WeightUnit::Lb => weight * LB_TO_KG,
        }
    }
}

impl std::fmt::Display for WeightUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single logged set
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SetStatus {
    #[default]
    Completed,
    Failed,
    Skipped,
}

/// Role of a planned set within an exercise prescription
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SetType {
    #[default]
    Standard,
    Working,
    Warmup,
    Dropset,
    Pyramid,
    Amrap,
    Other,
}

// ============================================================================
// Template Targets
// ============================================================================

fn default_rest_seconds() -> u32 {
    60
}

fn default_group_set_type() -> SetType {
    SetType::Working
}

/// One independent sets x reps x weight block inside an exercise prescription
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SetGroup {
    pub target_sets: u32,
    #[serde(default)]
    pub target_reps: Option<u32>,
    #[serde(default)]
    pub target_weight: Option<f64>,
    #[serde(default)]
    pub target_unit: WeightUnit,
    #[serde(default = "default_group_set_type")]
    pub set_type: SetType,
    #[serde(default = "default_rest_seconds")]
    pub rest_seconds: u32,
    #[serde(default)]
    pub notes: Option<String>,
}

/// An exercise entry in a template (or a guided workout plan)
///
/// Carries either `set_groups` or the legacy flat target fields. Consumers
/// never read those fields directly; they call [`TemplateExercise::targets`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TemplateExercise {
    pub exercise_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub set_groups: Vec<SetGroup>,
    #[serde(default)]
    pub target_sets: Option<u32>,
    #[serde(default)]
    pub target_reps: Option<u32>,
    #[serde(default)]
    pub target_weight: Option<f64>,
    #[serde(default)]
    pub target_unit: WeightUnit,
    #[serde(default)]
    pub set_type: SetType,
    #[serde(default = "default_rest_seconds")]
    pub rest_seconds: u32,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progression: Option<ProgressionRule>,
}

impl TemplateExercise {
    /// Entry with no targets, as produced from a legacy list of exercise ids
    pub fn bare(exercise_id: impl Into<String>) -> Self {
        Self {
            exercise_id: exercise_id.into(),
            set_groups: Vec::new(),
            target_sets: None,
            target_reps: None,
            target_weight: None,
            target_unit: WeightUnit::Kg,
            set_type: SetType::Standard,
            rest_seconds: default_rest_seconds(),
            notes: None,
            progression: None,
        }
    }

    /// Resolve the prescription: non-empty set groups win over flat fields
    pub fn targets(&self) -> TargetSpec {
        if !self.set_groups.is_empty() {
            return TargetSpec::SetGroups(self.set_groups.clone());
        }
        TargetSpec::Single(SingleTarget {
            target_sets: self.target_sets,
            target_reps: self.target_reps,
            target_weight: self.target_weight,
            target_unit: self.target_unit,
            set_type: self.set_type,
            rest_seconds: self.rest_seconds,
        })
    }
}

/// Legacy single-block prescription
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SingleTarget {
    pub target_sets: Option<u32>,
    pub target_reps: Option<u32>,
    pub target_weight: Option<f64>,
    pub target_unit: WeightUnit,
    pub set_type: SetType,
    pub rest_seconds: u32,
}

/// A resolved exercise prescription
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "spec", rename_all = "snake_case")]
pub enum TargetSpec {
    Single(SingleTarget),
    SetGroups(Vec<SetGroup>),
}

/// One concrete set expanded from a prescription
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PlannedSet {
    /// 1-based position within the exercise
    pub number: u32,
    /// Index of the originating set group, if any
    pub group: Option<usize>,
    pub reps: Option<u32>,
    pub weight: Option<f64>,
    pub unit: WeightUnit,
    pub set_type: SetType,
}

/// Weight and reps a progression step starts from
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Baseline {
    pub weight: f64,
    pub reps: u32,
    pub unit: WeightUnit,
}

impl TargetSpec {
    /// Expand into concrete planned sets, in declared group order
    pub fn planned_sets(&self) -> Vec<PlannedSet> {
        let mut planned = Vec::new();
        let mut number = 0;
        match self {
            TargetSpec::Single(single) => {
                for _ in 0..single.target_sets.unwrap_or(0) {
                    number += 1;
                    planned.push(PlannedSet {
                        number,
                        group: None,
                        reps: single.target_reps,
                        weight: single.target_weight,
                        unit: single.target_unit,
                        set_type: single.set_type,
                    });
                }
            }
            TargetSpec::SetGroups(groups) => {
                for (index, group) in groups.iter().enumerate() {
                    for _ in 0..group.target_sets {
                        number += 1;
                        planned.push(PlannedSet {
                            number,
                            group: Some(index),
                            reps: group.target_reps,
                            weight: group.target_weight,
                            unit: group.target_unit,
                            set_type: group.set_type,
                        });
                    }
                }
            }
        }
        planned
    }

    /// The group that progression tracks: first `working` group, else the heaviest
    pub fn working_group(&self) -> Option<usize> {
        match self {
            TargetSpec::Single(_) => None,
            TargetSpec::SetGroups(groups) => groups
                .iter()
                .position(|g| g.set_type == SetType::Working)
                .or_else(|| {
                    groups
                        .iter()
                        .enumerate()
                        .max_by(|(_, a), (_, b)| {
                            let a = a.target_unit.to_kg(a.target_weight.unwrap_or(0.0));
                            let b = b.target_unit.to_kg(b.target_weight.unwrap_or(0.0));
                            a.total_cmp(&b)
                        })
                        .map(|(index, _)| index)
                }),
        }
    }

    /// Starting point for progression when no prior prescription exists
    pub fn baseline(&self) -> Option<Baseline> {
        match self {
            TargetSpec::Single(single) => Some(Baseline {
                weight: single.target_weight.unwrap_or(0.0),
                reps: single.target_reps?,
                unit: single.target_unit,
            }),
            TargetSpec::SetGroups(groups) => {
                let group = &groups[self.working_group()?];
                Some(Baseline {
                    weight: group.target_weight.unwrap_or(0.0),
                    reps: group.target_reps?,
                    unit: group.target_unit,
                })
            }
        }
    }

    /// Total target reps, with the tracked block's reps optionally replaced
    /// by a later prescription
    ///
    /// Computed per block as sets x reps; saturates instead of overflowing.
    pub fn target_reps_total(&self, prescribed_reps: Option<u32>) -> u64 {
        let block = |sets: u32, reps: Option<u32>, tracked: bool| {
            let reps = match (tracked, prescribed_reps) {
                (true, Some(reps)) => reps,
                _ => reps.unwrap_or(0),
            };
            u64::from(sets).saturating_mul(u64::from(reps))
        };
        match self {
            TargetSpec::Single(single) => {
                block(single.target_sets.unwrap_or(0), single.target_reps, true)
            }
            TargetSpec::SetGroups(groups) => {
                let working = self.working_group();
                groups
                    .iter()
                    .enumerate()
                    .map(|(index, g)| block(g.target_sets, g.target_reps, Some(index) == working))
                    .fold(0u64, u64::saturating_add)
            }
        }
    }
}

// ============================================================================
// Logged Sets and Workouts
// ============================================================================

/// A performed set
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LoggedSet {
    pub weight: f64,
    pub reps: u32,
    #[serde(default)]
    pub unit: WeightUnit,
    pub logged_at: DateTime<Utc>,
    #[serde(default)]
    pub status: SetStatus,
    /// Id of the `SetLogged` event; absent on sets recorded before ids existed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<Uuid>,
}

impl LoggedSet {
    pub fn weight_kg(&self) -> f64 {
        self.unit.to_kg(self.weight)
    }

    pub fn volume_kg(&self) -> f64 {
        self.weight_kg() * f64::from(self.reps)
    }
}

/// An exercise inside the live workout
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkoutExercise {
    pub exercise_id: String,
    #[serde(default)]
    pub sets: Vec<LoggedSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_targets: Option<TargetSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progression: Option<ProgressionRule>,
}

impl WorkoutExercise {
    pub fn new(exercise_id: impl Into<String>) -> Self {
        Self {
            exercise_id: exercise_id.into(),
            sets: Vec::new(),
            template_targets: None,
            progression: None,
        }
    }

    pub fn planned(plan: &TemplateExercise) -> Self {
        Self {
            exercise_id: plan.exercise_id.clone(),
            sets: Vec::new(),
            template_targets: Some(plan.targets()),
            progression: plan.progression.clone(),
        }
    }
}

/// The single active workout of a user
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CurrentWorkout {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub from_template_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_progression: Option<ProgressionRule>,
    #[serde(default)]
    pub focus_exercise: Option<String>,
    #[serde(default)]
    pub exercises: Vec<WorkoutExercise>,
}

impl CurrentWorkout {
    pub fn exercise_mut(&mut self, exercise_id: &str) -> Option<&mut WorkoutExercise> {
        self.exercises
            .iter_mut()
            .find(|e| e.exercise_id == exercise_id)
    }

    /// Locate a set by its originating event id as (exercise index, set index)
    pub fn find_set(&self, event_id: Uuid) -> Option<(usize, usize)> {
        self.exercises.iter().enumerate().find_map(|(ei, exercise)| {
            exercise
                .sets
                .iter()
                .position(|s| s.event_id == Some(event_id))
                .map(|si| (ei, si))
        })
    }

    pub fn has_legacy_sets(&self) -> bool {
        self.exercises
            .iter()
            .flat_map(|e| e.sets.iter())
            .any(|s| s.event_id.is_none())
    }

    pub fn stats(&self) -> WorkoutStats {
        WorkoutStats::of(&self.exercises)
    }
}

/// Aggregate numbers for a finished workout
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkoutStats {
    pub exercise_count: usize,
    pub total_sets: usize,
    /// Sum of weight x reps, in kilograms
    pub total_volume: f64,
}

impl WorkoutStats {
    pub fn of(exercises: &[WorkoutExercise]) -> Self {
        let sets = exercises.iter().flat_map(|e| e.sets.iter());
        Self {
            exercise_count: exercises.len(),
            total_sets: sets.clone().count(),
            total_volume: sets.map(LoggedSet::volume_kg).sum(),
        }
    }
}

/// A completed workout as stored in `workout_history`
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkoutSnapshot {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub from_template_id: Option<String>,
    pub exercises: Vec<WorkoutExercise>,
    pub stats: WorkoutStats,
    #[serde(default)]
    pub notes: Option<String>,
}

/// One session of one exercise, as stored in `exercise_history:<id>`
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExerciseSession {
    pub workout_id: String,
    pub completed_at: DateTime<Utc>,
    pub sets: Vec<LoggedSet>,
    /// Heaviest set weight, in kilograms
    pub top_weight: f64,
    /// Session volume, in kilograms
    pub volume: f64,
    #[serde(default)]
    pub estimated_1rm: Option<f64>,
}

/// A reusable workout plan
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Template {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub exercises: Vec<TemplateExercise>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_progression: Option<ProgressionRule>,
    #[serde(default)]
    pub source_workout_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub use_count: u32,
}

impl Template {
    /// Ids of the template's exercises in order (the legacy `exercise_ids` view)
    pub fn exercise_ids(&self) -> Vec<&str> {
        self.exercises
            .iter()
            .map(|e| e.exercise_id.as_str())
            .collect()
    }
}
