//! Personal record detection.
//!
//! Every completed set is compared against the exercise's stored records on
//! four independent dimensions, all in kilograms: heaviest weight, largest
//! single-set volume, best Epley estimated one-rep max, and most reps at or
//! above a given weight. The first completed set of an exercise only
//! establishes the baseline.

use crate::types::{LoggedSet, SetStatus, WeightUnit};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Values closer than this are considered equal
const EPSILON: f64 = 1e-9;

/// Record dimension, ordered from most to least significant
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PrType {
    Weight,
    Volume,
    #[serde(rename = "estimated_1rm")]
    EstimatedOneRepMax,
    Reps,
}

/// A stored best on one dimension
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RecordEntry {
    /// Compared value, in kilograms
    pub value: f64,
    pub weight: f64,
    pub reps: u32,
    pub unit: WeightUnit,
    #[serde(default)]
    pub event_id: Option<Uuid>,
    pub achieved_at: DateTime<Utc>,
}

/// A point on the reps-at-weight frontier
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RepMark {
    pub weight_kg: f64,
    pub reps: u32,
    pub weight: f64,
    pub unit: WeightUnit,
    #[serde(default)]
    pub event_id: Option<Uuid>,
    pub achieved_at: DateTime<Utc>,
}

/// All records of one exercise
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ExerciseRecords {
    #[serde(default)]
    pub max_weight: Option<RecordEntry>,
    #[serde(default)]
    pub max_volume: Option<RecordEntry>,
    #[serde(default)]
    pub estimated_1rm: Option<RecordEntry>,
    /// Sets no other set beats on both weight and reps, lightest first
    #[serde(default)]
    pub rep_records: Vec<RepMark>,
}

/// `personal_records` projection, keyed by exercise id
pub type PersonalRecords = BTreeMap<String, ExerciseRecords>;

/// Result attached to a `SetLogged` that improved at least one record
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct PrHit {
    pub is_pr: bool,
    /// Most significant improved dimension
    pub pr_type: PrType,
    /// Every improved dimension, most significant first
    pub pr_types: Vec<PrType>,
}

/// Epley estimate; a single rep is its own max and zero reps has none
pub fn estimate_one_rep_max(weight_kg: f64, reps: u32) -> Option<f64> {
    match reps {
        0 => None,
        1 => Some(weight_kg),
        n => Some(weight_kg * (1.0 + f64::from(n) / 30.0)),
    }
}

fn improves(candidate: f64, current: &Option<RecordEntry>) -> bool {
    match current {
        Some(entry) => candidate > entry.value + EPSILON,
        None => true,
    }
}

fn entry(value: f64, set: &LoggedSet) -> RecordEntry {
    RecordEntry {
        value,
        weight: set.weight,
        reps: set.reps,
        unit: set.unit,
        event_id: set.event_id,
        achieved_at: set.logged_at,
    }
}

impl ExerciseRecords {
    /// Most reps previously done at a weight at least `weight_kg`
    fn best_reps_at(&self, weight_kg: f64) -> Option<u32> {
        self.rep_records
            .iter()
            .filter(|mark| mark.weight_kg + EPSILON >= weight_kg)
            .map(|mark| mark.reps)
            .max()
    }

    fn mark(&mut self, set: &LoggedSet) {
        let weight_kg = set.weight_kg();
        let dominated = self
            .rep_records
            .iter()
            .any(|m| m.weight_kg + EPSILON >= weight_kg && m.reps >= set.reps);
        if dominated {
            return;
        }
        self.rep_records
            .retain(|m| !(m.weight_kg <= weight_kg + EPSILON && m.reps <= set.reps));
        self.rep_records.push(RepMark {
            weight_kg,
            reps: set.reps,
            weight: set.weight,
            unit: set.unit,
            event_id: set.event_id,
            achieved_at: set.logged_at,
        });
        self.rep_records
            .sort_by(|a, b| a.weight_kg.total_cmp(&b.weight_kg));
    }
}

/// Compare a set against an exercise's records, updating every improved one
///
/// Only completed sets with at least one rep take part. Returns `None` when
/// nothing improved or when the set only established the baseline.
pub fn detect(records: &mut ExerciseRecords, set: &LoggedSet) -> Option<PrHit> {
    if set.status != SetStatus::Completed || set.reps == 0 {
        return None;
    }

    let weight_kg = set.weight_kg();
    let volume = set.volume_kg();
    let one_rep_max = estimate_one_rep_max(weight_kg, set.reps);
    let baseline = records.max_weight.is_none();

    let mut improved = Vec::new();
    if improves(weight_kg, &records.max_weight) {
        records.max_weight = Some(entry(weight_kg, set));
        improved.push(PrType::Weight);
    }
    if improves(volume, &records.max_volume) {
        records.max_volume = Some(entry(volume, set));
        improved.push(PrType::Volume);
    }
    if let Some(estimate) = one_rep_max {
        if improves(estimate, &records.estimated_1rm) {
            records.estimated_1rm = Some(entry(estimate, set));
            improved.push(PrType::EstimatedOneRepMax);
        }
    }
    if matches!(records.best_reps_at(weight_kg), Some(best) if set.reps > best) {
        improved.push(PrType::Reps);
    }
    records.mark(set);

    if baseline || improved.is_empty() {
        return None;
    }
    improved.sort();
    Some(PrHit {
        is_pr: true,
        pr_type: improved[0],
        pr_types: improved,
    })
}

/// Route a set to its exercise's records, creating them on first completion
pub fn record_set(
    records: &mut PersonalRecords,
    exercise_id: &str,
    set: &LoggedSet,
) -> Option<PrHit> {
    if set.status != SetStatus::Completed || set.reps == 0 {
        return None;
    }
    let hit = detect(records.entry(exercise_id.to_string()).or_default(), set);
    if let Some(hit) = &hit {
        tracing::debug!("New {:?} record on {}", hit.pr_types, exercise_id);
    }
    hit
}
