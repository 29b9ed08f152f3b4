//! Projection fold: applies one event to the projection state.
//!
//! Every rule performs all of its checks before the first mutation, so a
//! rule that fails leaves the state exactly as it found it. The engine then
//! persists only the documents listed in [`Folded::touched`].

use crate::config::ProgressionConfig;
use crate::error::EntityKind;
use crate::event::{
    Event, EventPayload, ExerciseAdded, SetDeleted, SetLogged, SetModified, TemplateCreated,
    TemplateUpdated, WorkoutCompleted, WorkoutStarted,
};
use crate::library::ExerciseLookup;
use crate::progression::{self, ProgressionState};
use crate::projection::{ProjectionKey, ProjectionState};
use crate::records::{self, PrHit};
use crate::types::{
    CurrentWorkout, ExerciseSession, LoggedSet, SetStatus, Template, TemplateExercise,
    WorkoutExercise, WorkoutSnapshot, WorkoutStats,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Read-only collaborators a fold may consult
#[derive(Clone, Copy)]
pub struct FoldContext<'a> {
    pub library: &'a dyn ExerciseLookup,
    pub progression: &'a ProgressionConfig,
}

/// Side results of a fold, returned to the caller of `emit`
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct Derived {
    #[serde(flatten)]
    pub pr: Option<PrHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<WorkoutStats>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub progressions: Vec<ProgressionState>,
}

impl Derived {
    pub fn is_pr(&self) -> bool {
        self.pr.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.pr.is_none() && self.stats.is_none() && self.progressions.is_empty()
    }
}

/// Outcome of a successful fold
#[derive(Clone, Debug, Default)]
pub struct Folded {
    pub derived: Derived,
    /// Projection documents the rule changed
    pub touched: BTreeSet<ProjectionKey>,
}

impl Folded {
    fn touching(keys: impl IntoIterator<Item = ProjectionKey>) -> Self {
        Self {
            derived: Derived::default(),
            touched: keys.into_iter().collect(),
        }
    }
}

/// Apply one event to the state
pub fn fold(ctx: &FoldContext<'_>, state: &mut ProjectionState, event: &Event) -> Result<Folded> {
    let at = event.timestamp;
    let folded = match &event.payload {
        EventPayload::WorkoutStarted(p) => workout_started(state, p, at)?,
        EventPayload::ExerciseAdded(p) => exercise_added(state, p)?,
        EventPayload::SetLogged(p) => set_logged(state, p, event.event_id, at)?,
        EventPayload::SetModified(p) => set_modified(state, p)?,
        EventPayload::SetDeleted(p) => set_deleted(state, p)?,
        EventPayload::WorkoutCompleted(p) => workout_completed(ctx, state, p, at)?,
        EventPayload::WorkoutDiscarded(p) => {
            take_workout(state, &p.workout_id)?;
            Folded::touching([ProjectionKey::CurrentWorkout])
        }
        EventPayload::TemplateCreated(p) => template_created(state, p, at)?,
        EventPayload::TemplateUpdated(p) => template_updated(state, p, at)?,
        EventPayload::TemplateDeleted(p) => {
            state.templates.remove(&p.template_id);
            Folded::touching([ProjectionKey::Templates])
        }
    };
    tracing::debug!(
        "Folded {} {} into {} projection(s)",
        event.event_type(),
        event.event_id,
        folded.touched.len()
    );
    Ok(folded)
}

// ============================================================================
// Workout Lifecycle
// ============================================================================

fn active_workout<'s>(
    state: &'s mut ProjectionState,
    workout_id: &str,
) -> Result<&'s mut CurrentWorkout> {
    match state.current_workout.as_mut() {
        Some(workout) if workout.id == workout_id => Ok(workout),
        _ => Err(Error::not_found(EntityKind::Workout, workout_id)),
    }
}

fn take_workout(state: &mut ProjectionState, workout_id: &str) -> Result<CurrentWorkout> {
    active_workout(state, workout_id)?;
    state
        .current_workout
        .take()
        .ok_or_else(|| Error::not_found(EntityKind::Workout, workout_id))
}

/// Keep the first occurrence of each exercise id
fn dedup_exercises(exercises: Vec<WorkoutExercise>) -> Vec<WorkoutExercise> {
    let mut seen = BTreeSet::new();
    exercises
        .into_iter()
        .filter(|e| seen.insert(e.exercise_id.clone()))
        .collect()
}

fn workout_started(
    state: &mut ProjectionState,
    p: &WorkoutStarted,
    at: DateTime<Utc>,
) -> Result<Folded> {
    if let Some(active) = &state.current_workout {
        return Err(Error::conflict(EntityKind::Workout, active.id.clone()));
    }
    let template = match &p.from_template_id {
        Some(id) => Some(
            state
                .templates
                .get(id)
                .ok_or_else(|| Error::not_found(EntityKind::Template, id.clone()))?,
        ),
        None => None,
    };

    // Inline plans, then the template, then bare ids
    let exercises = if let Some(plans) = &p.exercise_plans {
        plans.iter().map(WorkoutExercise::planned).collect()
    } else if let Some(template) = template {
        template
            .exercises
            .iter()
            .map(WorkoutExercise::planned)
            .collect()
    } else if let Some(ids) = &p.exercise_ids {
        ids.iter().map(WorkoutExercise::new).collect()
    } else {
        Vec::new()
    };
    let exercises = dedup_exercises(exercises);
    let template_progression = template.and_then(|t| t.default_progression.clone());

    let mut touched = BTreeSet::from([ProjectionKey::CurrentWorkout]);
    if let Some(template) = p
        .from_template_id
        .as_ref()
        .and_then(|id| state.templates.get_mut(id))
    {
        template.use_count += 1;
        template.last_used_at = Some(at);
        touched.insert(ProjectionKey::Templates);
    }

    state.current_workout = Some(CurrentWorkout {
        id: p.workout_id.clone(),
        name: p.name.clone(),
        started_at: at,
        from_template_id: p.from_template_id.clone(),
        template_progression,
        focus_exercise: exercises.first().map(|e| e.exercise_id.clone()),
        exercises,
    });

    Ok(Folded {
        derived: Derived::default(),
        touched,
    })
}

fn exercise_added(state: &mut ProjectionState, p: &ExerciseAdded) -> Result<Folded> {
    let workout = active_workout(state, &p.workout_id)?;
    if workout.exercise_mut(&p.exercise_id).is_none() {
        workout
            .exercises
            .push(WorkoutExercise::new(p.exercise_id.clone()));
    }
    workout.focus_exercise = Some(p.exercise_id.clone());
    Ok(Folded::touching([ProjectionKey::CurrentWorkout]))
}

fn workout_completed(
    ctx: &FoldContext<'_>,
    state: &mut ProjectionState,
    p: &WorkoutCompleted,
    at: DateTime<Utc>,
) -> Result<Folded> {
    let workout = take_workout(state, &p.workout_id)?;
    let stats = workout.stats();
    let mut touched = BTreeSet::from([
        ProjectionKey::CurrentWorkout,
        ProjectionKey::WorkoutHistory,
    ]);

    let progressions = match &workout.from_template_id {
        Some(template_id) => progress(ctx, state, &workout, template_id, at),
        None => Vec::new(),
    };
    if !progressions.is_empty() {
        touched.insert(ProjectionKey::ProgressionStates);
    }

    for exercise in workout.exercises.iter().filter(|e| !e.sets.is_empty()) {
        state
            .exercise_history
            .entry(exercise.exercise_id.clone())
            .or_default()
            .insert(0, session(&workout.id, at, &exercise.sets));
        touched.insert(ProjectionKey::ExerciseHistory(exercise.exercise_id.clone()));
    }

    tracing::debug!(
        "Workout {} completed: {} exercises, {} sets, {:.1}kg",
        workout.id,
        stats.exercise_count,
        stats.total_sets,
        stats.total_volume
    );
    state.workout_history.insert(
        0,
        WorkoutSnapshot {
            id: workout.id,
            name: workout.name,
            started_at: workout.started_at,
            completed_at: at,
            from_template_id: workout.from_template_id,
            exercises: workout.exercises,
            stats: stats.clone(),
            notes: p.notes.clone(),
        },
    );

    Ok(Folded {
        derived: Derived {
            pr: None,
            stats: Some(stats),
            progressions,
        },
        touched,
    })
}

fn session(workout_id: &str, at: DateTime<Utc>, sets: &[LoggedSet]) -> ExerciseSession {
    let counted = || {
        sets.iter()
            .filter(|s| s.status == SetStatus::Completed && s.reps > 0)
    };
    ExerciseSession {
        workout_id: workout_id.to_string(),
        completed_at: at,
        sets: sets.to_vec(),
        top_weight: counted().map(LoggedSet::weight_kg).fold(0.0, f64::max),
        volume: sets.iter().map(LoggedSet::volume_kg).sum(),
        estimated_1rm: counted()
            .filter_map(|s| records::estimate_one_rep_max(s.weight_kg(), s.reps))
            .reduce(f64::max),
    }
}

/// Run the progression engine for every exercise with rep targets
fn progress(
    ctx: &FoldContext<'_>,
    state: &mut ProjectionState,
    workout: &CurrentWorkout,
    template_id: &str,
    at: DateTime<Utc>,
) -> Vec<ProgressionState> {
    let mut results = Vec::new();
    for exercise in &workout.exercises {
        let Some(targets) = &exercise.template_targets else {
            continue;
        };
        let key = ProgressionState::key(template_id, &exercise.exercise_id);
        let prior = state.progression_states.get(&key);

        let Some(evaluation) =
            progression::evaluate(targets, prior.map(|s| s.next_reps), &exercise.sets)
        else {
            continue;
        };
        let Some(baseline) = prior
            .map(ProgressionState::next_baseline)
            .or_else(|| targets.baseline())
        else {
            continue;
        };

        let (rule, rule_source) = progression::resolve_rule(
            exercise.progression.as_ref(),
            workout.template_progression.as_ref(),
            ctx.library.lookup(&exercise.exercise_id),
            ctx.progression,
        );
        let streak = prior.map(|s| s.failure_streak).unwrap_or(0);
        let step = progression::prescribe(&rule, baseline, streak, evaluation.outcome, ctx.progression);

        let next = ProgressionState {
            template_id: template_id.to_string(),
            exercise_id: exercise.exercise_id.clone(),
            workout_id: workout.id.clone(),
            last_weight: baseline.weight,
            last_reps: baseline.reps,
            next_weight: step.weight,
            next_reps: step.reps,
            unit: baseline.unit,
            note: step.note,
            failure_streak: step.failure_streak,
            outcome: evaluation.outcome,
            completion: evaluation.completion,
            rule,
            rule_source,
            updated_at: at,
        };
        state.progression_states.insert(key, next.clone());
        results.push(next);
    }
    results
}

// ============================================================================
// Sets
// ============================================================================

fn set_logged(
    state: &mut ProjectionState,
    p: &SetLogged,
    event_id: Uuid,
    at: DateTime<Utc>,
) -> Result<Folded> {
    let set = LoggedSet {
        weight: p.weight,
        reps: p.reps,
        unit: p.unit,
        logged_at: at,
        status: p.status,
        event_id: Some(event_id),
    };

    let workout = active_workout(state, &p.workout_id)?;
    match workout.exercise_mut(&p.exercise_id) {
        Some(exercise) => exercise.sets.push(set.clone()),
        None => {
            let mut exercise = WorkoutExercise::new(p.exercise_id.clone());
            exercise.sets.push(set.clone());
            workout.exercises.push(exercise);
        }
    }
    workout.focus_exercise = Some(p.exercise_id.clone());

    let pr = records::record_set(&mut state.personal_records, &p.exercise_id, &set);
    let mut folded = Folded::touching([ProjectionKey::CurrentWorkout]);
    if set.status == SetStatus::Completed && set.reps > 0 {
        folded.touched.insert(ProjectionKey::PersonalRecords);
    }
    folded.derived.pr = pr;
    Ok(folded)
}

/// Locate a set by originating event id as (exercise index, set index)
///
/// Sets recorded without an originating id are addressed by the nil UUID and
/// can never be changed.
fn locate_set(workout: &CurrentWorkout, original_event_id: Uuid) -> Result<(usize, usize)> {
    match workout.find_set(original_event_id) {
        Some(position) => Ok(position),
        None if original_event_id.is_nil() && workout.has_legacy_sets() => {
            Err(Error::UnmodifiableSet {
                workout_id: workout.id.clone(),
                original_event_id: original_event_id.to_string(),
            })
        }
        None => Err(Error::not_found(
            EntityKind::Set,
            original_event_id.to_string(),
        )),
    }
}

fn set_modified(state: &mut ProjectionState, p: &SetModified) -> Result<Folded> {
    let workout = active_workout(state, &p.workout_id)?;
    let (ei, si) = locate_set(workout, p.original_event_id)?;
    let set = &mut workout.exercises[ei].sets[si];
    if let Some(weight) = p.weight {
        set.weight = weight;
    }
    if let Some(reps) = p.reps {
        set.reps = reps;
    }
    if let Some(unit) = p.unit {
        set.unit = unit;
    }
    Ok(Folded::touching([ProjectionKey::CurrentWorkout]))
}

fn set_deleted(state: &mut ProjectionState, p: &SetDeleted) -> Result<Folded> {
    let workout = active_workout(state, &p.workout_id)?;
    let (ei, si) = locate_set(workout, p.original_event_id)?;
    workout.exercises[ei].sets.remove(si);
    Ok(Folded::touching([ProjectionKey::CurrentWorkout]))
}

// ============================================================================
// Templates
// ============================================================================

/// Derive flat targets from a finished workout: set count plus the heaviest set
fn exercises_from_snapshot(snapshot: &WorkoutSnapshot) -> Vec<TemplateExercise> {
    snapshot
        .exercises
        .iter()
        .map(|exercise| {
            let mut entry = TemplateExercise::bare(exercise.exercise_id.clone());
            let heaviest = exercise
                .sets
                .iter()
                .max_by(|a, b| a.weight_kg().total_cmp(&b.weight_kg()));
            if let Some(heaviest) = heaviest {
                entry.target_sets = u32::try_from(exercise.sets.len()).ok();
                entry.target_reps = Some(heaviest.reps).filter(|r| *r > 0);
                entry.target_weight = Some(heaviest.weight);
                entry.target_unit = heaviest.unit;
            }
            entry
        })
        .collect()
}

fn template_created(
    state: &mut ProjectionState,
    p: &TemplateCreated,
    at: DateTime<Utc>,
) -> Result<Folded> {
    if state.templates.contains_key(&p.template_id) {
        return Err(Error::conflict(EntityKind::Template, p.template_id.clone()));
    }

    let exercises = if let Some(exercises) = &p.exercises {
        exercises.clone()
    } else if let Some(ids) = &p.exercise_ids {
        ids.iter().map(TemplateExercise::bare).collect()
    } else if let Some(workout_id) = &p.source_workout_id {
        let snapshot = state
            .workout_history
            .iter()
            .find(|w| &w.id == workout_id)
            .ok_or_else(|| Error::not_found(EntityKind::HistoryWorkout, workout_id.clone()))?;
        exercises_from_snapshot(snapshot)
    } else {
        Vec::new()
    };

    state.templates.insert(
        p.template_id.clone(),
        Template {
            id: p.template_id.clone(),
            name: p.name.clone(),
            exercises,
            default_progression: p.default_progression.clone(),
            source_workout_id: p.source_workout_id.clone(),
            created_at: at,
            updated_at: at,
            last_used_at: None,
            use_count: 0,
        },
    );
    Ok(Folded::touching([ProjectionKey::Templates]))
}

fn template_updated(
    state: &mut ProjectionState,
    p: &TemplateUpdated,
    at: DateTime<Utc>,
) -> Result<Folded> {
    let template = state
        .templates
        .get_mut(&p.template_id)
        .ok_or_else(|| Error::not_found(EntityKind::Template, p.template_id.clone()))?;

    if let Some(name) = &p.name {
        template.name = name.clone();
    }
    if let Some(exercises) = &p.exercises {
        template.exercises = exercises.clone();
    } else if let Some(ids) = &p.exercise_ids {
        template.exercises = ids.iter().map(TemplateExercise::bare).collect();
    }
    if let Some(rule) = &p.default_progression {
        template.default_progression = Some(rule.clone());
    }
    template.updated_at = at;
    Ok(Folded::touching([ProjectionKey::Templates]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{TemplateDeleted, WorkoutDiscarded};
    use crate::library::default_library;
    use crate::records::PrType;
    use crate::schema::validate;
    use crate::event::EventType;
    use crate::types::{TargetSpec, WeightUnit};
    use serde_json::{json, Value};

    fn apply(state: &mut ProjectionState, event_type: EventType, payload: Value) -> Result<Folded> {
        let config = ProgressionConfig::default();
        let ctx = FoldContext {
            library: default_library(),
            progression: &config,
        };
        let event = Event::new(Utc::now(), validate(event_type, &payload).unwrap());
        fold(&ctx, state, &event)
    }

    fn log_set(state: &mut ProjectionState, exercise: &str, weight: f64, reps: u32) -> Folded {
        apply(
            state,
            EventType::SetLogged,
            json!({"workout_id": "w1", "exercise_id": exercise, "weight": weight, "reps": reps}),
        )
        .unwrap()
    }

    fn started(exercise_ids: &[&str]) -> ProjectionState {
        let mut state = ProjectionState::default();
        apply(
            &mut state,
            EventType::WorkoutStarted,
            json!({"workout_id": "w1", "exercise_ids": exercise_ids}),
        )
        .unwrap();
        state
    }

    #[test]
    fn test_start_with_plain_ids_sets_focus() {
        let state = started(&["barbell_squat", "bench_press", "barbell_squat"]);
        let workout = state.current_workout.unwrap();
        assert_eq!(workout.exercises.len(), 2);
        assert_eq!(workout.focus_exercise.as_deref(), Some("barbell_squat"));
        assert!(workout.exercises[0].template_targets.is_none());
    }

    #[test]
    fn test_second_start_conflicts() {
        let mut state = started(&[]);
        let err = apply(&mut state, EventType::WorkoutStarted, json!({"workout_id": "w2"}))
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { kind: EntityKind::Workout, .. }));
        assert_eq!(state.current_workout.unwrap().id, "w1");
    }

    #[test]
    fn test_start_from_missing_template() {
        let mut state = ProjectionState::default();
        let err = apply(
            &mut state,
            EventType::WorkoutStarted,
            json!({"from_template_id": "ghost"}),
        )
        .unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: EntityKind::Template, .. }));
        assert!(state.current_workout.is_none());
    }

    #[test]
    fn test_start_from_template_resolves_targets() {
        let mut state = ProjectionState::default();
        apply(
            &mut state,
            EventType::TemplateCreated,
            json!({
                "template_id": "push",
                "name": "Push",
                "default_progression": {"type": "linear", "increment": 1.25},
                "exercises": [
                    {"exercise_id": "bench_press", "set_groups": [
                        {"target_sets": 2, "target_reps": 10, "target_weight": 40, "set_type": "warmup"},
                        {"target_sets": 3, "target_reps": 5, "target_weight": 80}
                    ]},
                    {"exercise_id": "dip", "target_sets": 3, "target_reps": 8}
                ]
            }),
        )
        .unwrap();

        let folded = apply(
            &mut state,
            EventType::WorkoutStarted,
            json!({"workout_id": "w1", "from_template_id": "push"}),
        )
        .unwrap();
        assert!(folded.touched.contains(&ProjectionKey::Templates));

        let workout = state.current_workout.as_ref().unwrap();
        assert!(workout.template_progression.is_some());
        assert!(matches!(
            workout.exercises[0].template_targets,
            Some(TargetSpec::SetGroups(ref groups)) if groups.len() == 2
        ));
        assert!(matches!(
            workout.exercises[1].template_targets,
            Some(TargetSpec::Single(_))
        ));

        let template = &state.templates["push"];
        assert_eq!(template.use_count, 1);
        assert!(template.last_used_at.is_some());
    }

    #[test]
    fn test_exercise_added_is_idempotent() {
        let mut state = started(&["bench_press"]);
        for _ in 0..2 {
            apply(
                &mut state,
                EventType::ExerciseAdded,
                json!({"workout_id": "w1", "exercise_id": "dip"}),
            )
            .unwrap();
        }
        let workout = state.current_workout.unwrap();
        assert_eq!(workout.exercises.len(), 2);
        assert_eq!(workout.focus_exercise.as_deref(), Some("dip"));
    }

    #[test]
    fn test_wrong_workout_id_not_found() {
        let mut state = started(&[]);
        let before = state.clone();
        let err = apply(
            &mut state,
            EventType::SetLogged,
            json!({"workout_id": "other", "exercise_id": "dip", "weight": 0, "reps": 10}),
        )
        .unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: EntityKind::Workout, .. }));
        assert_eq!(state, before);
    }

    #[test]
    fn test_set_logged_creates_exercise_and_detects_pr() {
        let mut state = started(&[]);
        let first = log_set(&mut state, "bench_press", 110.0, 3);
        assert!(!first.derived.is_pr());

        let second = log_set(&mut state, "bench_press", 120.0, 3);
        let pr = second.derived.pr.unwrap();
        assert_eq!(pr.pr_type, PrType::Weight);
        assert_eq!(
            state.personal_records["bench_press"]
                .max_weight
                .as_ref()
                .unwrap()
                .value,
            120.0
        );

        let workout = state.current_workout.unwrap();
        assert_eq!(workout.exercises[0].sets.len(), 2);
        assert_eq!(workout.focus_exercise.as_deref(), Some("bench_press"));
    }

    #[test]
    fn test_modify_and_delete_by_event_id() {
        let mut state = started(&[]);
        log_set(&mut state, "bench_press", 100.0, 5);
        log_set(&mut state, "bench_press", 100.0, 4);
        let sets = &state.current_workout.as_ref().unwrap().exercises[0].sets;
        let first_id = sets[0].event_id.unwrap();
        let second_id = sets[1].event_id.unwrap();

        apply(
            &mut state,
            EventType::SetModified,
            json!({"workout_id": "w1", "original_event_id": second_id.to_string(), "reps": 6}),
        )
        .unwrap();
        apply(
            &mut state,
            EventType::SetDeleted,
            json!({"workout_id": "w1", "original_event_id": first_id.to_string()}),
        )
        .unwrap();

        let sets = &state.current_workout.as_ref().unwrap().exercises[0].sets;
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].event_id, Some(second_id));
        assert_eq!((sets[0].weight, sets[0].reps), (100.0, 6));
    }

    #[test]
    fn test_delete_unknown_set() {
        let mut state = started(&[]);
        log_set(&mut state, "bench_press", 100.0, 5);
        let before = state.clone();

        let err = apply(
            &mut state,
            EventType::SetDeleted,
            json!({"workout_id": "w1", "original_event_id": Uuid::new_v4().to_string()}),
        )
        .unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: EntityKind::Set, .. }));
        assert_eq!(state, before);

    }

    #[test]
    fn test_sets_without_event_id_are_unmodifiable() {
        let mut state = started(&[]);
        log_set(&mut state, "bench_press", 100.0, 5);
        state.current_workout.as_mut().unwrap().exercises[0].sets[0].event_id = None;
        let before = state.clone();

        let err = apply(
            &mut state,
            EventType::SetModified,
            json!({"workout_id": "w1", "original_event_id": Uuid::nil().to_string(), "reps": 1}),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnmodifiableSet { .. }));

        // A mistyped id is still just missing
        let err = apply(
            &mut state,
            EventType::SetDeleted,
            json!({"workout_id": "w1", "original_event_id": Uuid::new_v4().to_string()}),
        )
        .unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: EntityKind::Set, .. }));
        assert_eq!(state, before);
    }

    #[test]
    fn test_complete_snapshots_and_clears() {
        let mut state = started(&["bench_press"]);
        log_set(&mut state, "bench_press", 100.0, 5);
        log_set(&mut state, "dip", 10.0, 10);

        let folded = apply(
            &mut state,
            EventType::WorkoutCompleted,
            json!({"workout_id": "w1", "notes": "solid"}),
        )
        .unwrap();

        let stats = folded.derived.stats.unwrap();
        assert_eq!(stats.exercise_count, 2);
        assert_eq!(stats.total_sets, 2);
        assert_eq!(stats.total_volume, 600.0);
        assert!(folded.derived.progressions.is_empty());

        assert!(state.current_workout.is_none());
        assert_eq!(state.workout_history[0].id, "w1");
        assert_eq!(state.workout_history[0].notes.as_deref(), Some("solid"));
        let bench = &state.exercise_history["bench_press"];
        assert_eq!(bench.len(), 1);
        assert_eq!(bench[0].top_weight, 100.0);
        assert!(folded
            .touched
            .contains(&ProjectionKey::ExerciseHistory("dip".into())));
    }

    #[test]
    fn test_discard_does_not_snapshot() {
        let mut state = started(&["bench_press"]);
        log_set(&mut state, "bench_press", 100.0, 5);
        let payload = EventPayload::WorkoutDiscarded(WorkoutDiscarded {
            workout_id: "w1".into(),
            reason: None,
        });
        let config = ProgressionConfig::default();
        let ctx = FoldContext {
            library: default_library(),
            progression: &config,
        };
        fold(&ctx, &mut state, &Event::new(Utc::now(), payload)).unwrap();
        assert!(state.current_workout.is_none());
        assert!(state.workout_history.is_empty());
    }

    #[test]
    fn test_template_progression_on_complete() {
        let mut state = ProjectionState::default();
        apply(
            &mut state,
            EventType::TemplateCreated,
            json!({"template_id": "legs", "name": "Legs", "exercises": [{
                "exercise_id": "barbell_squat", "target_sets": 3, "target_reps": 8,
                "target_weight": 100, "progression": {"type": "linear", "increment": 5}
            }]}),
        )
        .unwrap();
        apply(
            &mut state,
            EventType::WorkoutStarted,
            json!({"workout_id": "w1", "from_template_id": "legs"}),
        )
        .unwrap();
        for _ in 0..3 {
            log_set(&mut state, "barbell_squat", 100.0, 8);
        }
        let folded = apply(
            &mut state,
            EventType::WorkoutCompleted,
            json!({"workout_id": "w1"}),
        )
        .unwrap();

        let next = &folded.derived.progressions[0];
        assert_eq!(next.next_weight, 105.0);
        assert_eq!(next.note, "+5kg");
        assert_eq!(next.unit, WeightUnit::Kg);
        assert_eq!(
            state.progression_states["legs:barbell_squat"].next_weight,
            105.0
        );
    }

    #[test]
    fn test_template_from_history_snapshot() {
        let mut state = started(&["bench_press"]);
        log_set(&mut state, "bench_press", 60.0, 10);
        log_set(&mut state, "bench_press", 80.0, 5);
        apply(&mut state, EventType::WorkoutCompleted, json!({"workout_id": "w1"})).unwrap();

        apply(
            &mut state,
            EventType::TemplateCreated,
            json!({"template_id": "copy", "name": "Copy", "source_workout_id": "w1"}),
        )
        .unwrap();
        let entry = &state.templates["copy"].exercises[0];
        assert_eq!(entry.target_sets, Some(2));
        assert_eq!(entry.target_reps, Some(5));
        assert_eq!(entry.target_weight, Some(80.0));

        let err = apply(
            &mut state,
            EventType::TemplateCreated,
            json!({"name": "Nope", "source_workout_id": "ghost"}),
        )
        .unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: EntityKind::HistoryWorkout, .. }));
    }

    #[test]
    fn test_template_update_merge_and_delete() {
        let mut state = ProjectionState::default();
        apply(
            &mut state,
            EventType::TemplateCreated,
            json!({"template_id": "t", "name": "Old", "exercise_ids": ["dip"]}),
        )
        .unwrap();
        let err = apply(
            &mut state,
            EventType::TemplateCreated,
            json!({"template_id": "t", "name": "Dup"}),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Conflict { kind: EntityKind::Template, .. }));

        apply(
            &mut state,
            EventType::TemplateUpdated,
            json!({"template_id": "t", "name": "New"}),
        )
        .unwrap();
        let template = &state.templates["t"];
        assert_eq!(template.name, "New");
        assert_eq!(template.exercise_ids(), vec!["dip"]);

        let payload = EventPayload::TemplateDeleted(TemplateDeleted {
            template_id: "t".into(),
        });
        let config = ProgressionConfig::default();
        let ctx = FoldContext {
            library: default_library(),
            progression: &config,
        };
        for _ in 0..2 {
            fold(&ctx, &mut state, &Event::new(Utc::now(), payload.clone())).unwrap();
        }
        assert!(state.templates.is_empty());

        let err = apply(
            &mut state,
            EventType::TemplateUpdated,
            json!({"template_id": "t", "name": "Back"}),
        )
        .unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: EntityKind::Template, .. }));
    }
}
