//! Progression logic for next-session targets.
//!
//! This module implements the progressive-overload rules applied when a
//! workout started from a template is completed:
//! - Linear: add a fixed increment after every successful session
//! - Double progression: climb reps through a range, then add weight
//! - Bodyweight to weighted: climb reps to a target, then introduce load
//!
//! Missed sessions repeat the weight; badly missed sessions (or a streak of
//! misses) deload.

use crate::config::ProgressionConfig;
use crate::library::ExerciseInfo;
use crate::types::{Baseline, LoggedSet, SetStatus, TargetSpec, WeightUnit};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_increment() -> f64 {
    2.5
}

/// How an exercise's prescription advances
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressionRule {
    Linear {
        #[serde(default = "default_increment")]
        increment: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deload_percent: Option<f64>,
    },
    DoubleProgression {
        rep_floor: u32,
        rep_ceiling: u32,
        #[serde(default = "default_increment")]
        increment: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deload_percent: Option<f64>,
    },
    BodyweightToWeighted {
        target_reps: u32,
        #[serde(default = "default_increment")]
        increment: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deload_percent: Option<f64>,
    },
}

impl ProgressionRule {
    pub fn linear(increment: f64) -> Self {
        ProgressionRule::Linear {
            increment,
            deload_percent: None,
        }
    }

    pub fn increment(&self) -> f64 {
        match self {
            ProgressionRule::Linear { increment, .. }
            | ProgressionRule::DoubleProgression { increment, .. }
            | ProgressionRule::BodyweightToWeighted { increment, .. } => *increment,
        }
    }

    pub fn deload_percent(&self) -> Option<f64> {
        match self {
            ProgressionRule::Linear { deload_percent, .. }
            | ProgressionRule::DoubleProgression { deload_percent, .. }
            | ProgressionRule::BodyweightToWeighted { deload_percent, .. } => *deload_percent,
        }
    }
}

/// Where a resolved rule came from
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleSource {
    Exercise,
    Template,
    Library,
    Category,
    Fallback,
}

/// Resolve the rule for one exercise; the first present candidate wins:
/// template entry override, template default, library default, category
/// default, global fallback.
pub fn resolve_rule(
    exercise_override: Option<&ProgressionRule>,
    template_default: Option<&ProgressionRule>,
    info: Option<&ExerciseInfo>,
    config: &ProgressionConfig,
) -> (ProgressionRule, RuleSource) {
    [
        exercise_override.cloned().map(|r| (r, RuleSource::Exercise)),
        template_default.cloned().map(|r| (r, RuleSource::Template)),
        info.and_then(|i| i.default_progression.clone())
            .map(|r| (r, RuleSource::Library)),
        info.map(|i| (i.classification.default_rule(), RuleSource::Category)),
    ]
    .into_iter()
    .flatten()
    .next()
    .unwrap_or_else(|| {
        (
            ProgressionRule::linear(config.fallback_increment),
            RuleSource::Fallback,
        )
    })
}

// ============================================================================
// Performance Evaluation
// ============================================================================

/// Session outcome bucket
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Partial,
    FailureMinor,
    FailureMajor,
}

impl Outcome {
    pub fn from_completion(completion: f64) -> Self {
        if completion >= 100.0 {
            Outcome::Success
        } else if completion >= 85.0 {
            Outcome::Partial
        } else if completion >= 70.0 {
            Outcome::FailureMinor
        } else {
            Outcome::FailureMajor
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Evaluation {
    pub target_reps: u64,
    pub actual_reps: u64,
    /// Percentage of target reps performed
    pub completion: f64,
    pub outcome: Outcome,
}

/// Compare performed reps against the prescription
///
/// Skipped sets count as zero reps. Returns `None` when the prescription has
/// no target reps to measure against.
pub fn evaluate(
    targets: &TargetSpec,
    prescribed_reps: Option<u32>,
    sets: &[LoggedSet],
) -> Option<Evaluation> {
    let target_reps = targets.target_reps_total(prescribed_reps);
    if target_reps == 0 {
        return None;
    }
    let actual_reps = sets
        .iter()
        .filter(|s| s.status != SetStatus::Skipped)
        .map(|s| u64::from(s.reps))
        .fold(0u64, u64::saturating_add);
    let completion = actual_reps as f64 / target_reps as f64 * 100.0;
    Some(Evaluation {
        target_reps,
        actual_reps,
        completion,
        outcome: Outcome::from_completion(completion),
    })
}

// ============================================================================
// Prescription
// ============================================================================

/// The next session's prescription
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub weight: f64,
    pub reps: u32,
    pub failure_streak: u32,
    pub note: String,
}

/// Round to the nearest multiple of `granularity`
pub fn round_to(weight: f64, granularity: f64) -> f64 {
    if granularity <= 0.0 {
        return weight;
    }
    (weight / granularity).round() * granularity
}

/// Reduce a weight by `percent`, rounded to a loadable value strictly below it
pub fn deload_weight(weight: f64, percent: f64, granularity: f64) -> f64 {
    let mut reduced = round_to(weight * (1.0 - percent / 100.0), granularity);
    if reduced >= weight {
        reduced = weight - granularity.max(0.0);
    }
    reduced.max(0.0)
}

/// Format a weight without a trailing `.0`
pub fn format_weight(weight: f64, unit: WeightUnit) -> String {
    let rounded = (weight * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 {
        format!("{}{}", rounded as i64, unit)
    } else {
        format!("{}{}", rounded, unit)
    }
}

fn format_percent(percent: f64) -> String {
    if percent.fract() == 0.0 {
        format!("{}%", percent as i64)
    } else {
        format!("{}%", percent)
    }
}

/// Compute the next prescription from the one just attempted
pub fn prescribe(
    rule: &ProgressionRule,
    baseline: Baseline,
    failure_streak: u32,
    outcome: Outcome,
    config: &ProgressionConfig,
) -> Step {
    let percent = rule.deload_percent().unwrap_or(config.deload_percent);
    let granularity = config.rounding_for(baseline.unit);

    let step = match outcome {
        Outcome::Success => advance(rule, baseline),
        Outcome::Partial => repeat(baseline, failure_streak),
        Outcome::FailureMinor => {
            let streak = failure_streak.saturating_add(1);
            if config.deload_after_failures > 0 && streak >= config.deload_after_failures {
                let mut step = deload(rule, baseline, percent, granularity);
                step.note = format!("{} after {} missed sessions", step.note, streak);
                step
            } else {
                repeat(baseline, streak)
            }
        }
        Outcome::FailureMajor => deload(rule, baseline, percent, granularity),
    };

    tracing::debug!(
        "Progression {:?}: {} x {} -> {} x {} ({})",
        outcome,
        baseline.weight,
        baseline.reps,
        step.weight,
        step.reps,
        step.note
    );
    step
}

fn repeat(baseline: Baseline, failure_streak: u32) -> Step {
    Step {
        weight: baseline.weight,
        reps: baseline.reps,
        failure_streak,
        note: format!(
            "Repeat {} x {}",
            format_weight(baseline.weight, baseline.unit),
            baseline.reps
        ),
    }
}

fn add_weight(baseline: Baseline, increment: f64) -> Step {
    Step {
        weight: baseline.weight + increment,
        reps: baseline.reps,
        failure_streak: 0,
        note: format!("+{}", format_weight(increment, baseline.unit)),
    }
}

fn add_rep(baseline: Baseline) -> Step {
    let reps = baseline.reps.saturating_add(1);
    Step {
        weight: baseline.weight,
        reps,
        failure_streak: 0,
        note: format!("Reps up to {}", reps),
    }
}

fn advance(rule: &ProgressionRule, baseline: Baseline) -> Step {
    match *rule {
        ProgressionRule::Linear { increment, .. } => add_weight(baseline, increment),
        ProgressionRule::DoubleProgression {
            rep_floor,
            rep_ceiling,
            increment,
            ..
        } => {
            if baseline.reps >= rep_ceiling {
                let weight = baseline.weight + increment;
                Step {
                    weight,
                    reps: rep_floor,
                    failure_streak: 0,
                    note: format!(
                        "Hit {} reps, weight up to {}, reps reset to {}",
                        baseline.reps,
                        format_weight(weight, baseline.unit),
                        rep_floor
                    ),
                }
            } else {
                add_rep(baseline)
            }
        }
        ProgressionRule::BodyweightToWeighted {
            target_reps,
            increment,
            ..
        } => {
            if baseline.weight > 0.0 {
                add_weight(baseline, increment)
            } else if baseline.reps >= target_reps {
                Step {
                    weight: increment,
                    reps: baseline.reps,
                    failure_streak: 0,
                    note: format!("Add weight: {}", format_weight(increment, baseline.unit)),
                }
            } else {
                add_rep(baseline)
            }
        }
    }
}

fn deload(rule: &ProgressionRule, baseline: Baseline, percent: f64, granularity: f64) -> Step {
    if baseline.weight <= 0.0 {
        let mut step = repeat(baseline, 0);
        step.note = format!("Repeat bodyweight x {}", baseline.reps);
        return step;
    }
    let reps = match rule {
        ProgressionRule::DoubleProgression { rep_floor, .. } => *rep_floor,
        _ => baseline.reps,
    };
    Step {
        weight: deload_weight(baseline.weight, percent, granularity),
        reps,
        failure_streak: 0,
        note: format!("Deload {}", format_percent(percent)),
    }
}

// ============================================================================
// Stored State
// ============================================================================

/// Per (template, exercise) progression record
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProgressionState {
    pub template_id: String,
    pub exercise_id: String,
    pub workout_id: String,
    pub last_weight: f64,
    pub last_reps: u32,
    pub next_weight: f64,
    pub next_reps: u32,
    #[serde(default)]
    pub unit: WeightUnit,
    pub note: String,
    #[serde(default)]
    pub failure_streak: u32,
    pub outcome: Outcome,
    pub completion: f64,
    pub rule: ProgressionRule,
    pub rule_source: RuleSource,
    pub updated_at: DateTime<Utc>,
}

impl ProgressionState {
    /// Key under which the state lives in `progression_states`
    pub fn key(template_id: &str, exercise_id: &str) -> String {
        format!("{}:{}", template_id, exercise_id)
    }

    /// What the next session should start from
    pub fn next_baseline(&self) -> Baseline {
        Baseline {
            weight: self.next_weight,
            reps: self.next_reps,
            unit: self.unit,
        }
    }
}
