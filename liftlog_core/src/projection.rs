//! Projection keys and the in-memory projection state.
//!
//! Projections are materialized views derived from the event log. Each key
//! maps to one JSON document in the [`ProjectionStore`]; [`ProjectionState`]
//! is the typed form that fold rules operate on.

use crate::event::{Event, EventPayload};
use crate::progression::ProgressionState;
use crate::records::PersonalRecords;
use crate::store::{ProjectionStore, UserId};
use crate::types::{CurrentWorkout, ExerciseSession, Template, WorkoutSnapshot};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const EXERCISE_HISTORY_PREFIX: &str = "exercise_history:";

/// Name of a projection document
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProjectionKey {
    CurrentWorkout,
    WorkoutHistory,
    Templates,
    PersonalRecords,
    ProgressionStates,
    /// Per-exercise session list, `exercise_history:<exercise_id>`
    ExerciseHistory(String),
}

impl ProjectionKey {
    /// Keys that exist once per user
    pub const FIXED: [ProjectionKey; 5] = [
        ProjectionKey::CurrentWorkout,
        ProjectionKey::WorkoutHistory,
        ProjectionKey::Templates,
        ProjectionKey::PersonalRecords,
        ProjectionKey::ProgressionStates,
    ];
}

impl fmt::Display for ProjectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectionKey::CurrentWorkout => f.write_str("current_workout"),
            ProjectionKey::WorkoutHistory => f.write_str("workout_history"),
            ProjectionKey::Templates => f.write_str("templates"),
            ProjectionKey::PersonalRecords => f.write_str("personal_records"),
            ProjectionKey::ProgressionStates => f.write_str("progression_states"),
            ProjectionKey::ExerciseHistory(id) => write!(f, "{}{}", EXERCISE_HISTORY_PREFIX, id),
        }
    }
}

impl FromStr for ProjectionKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(id) = s.strip_prefix(EXERCISE_HISTORY_PREFIX) {
            if id.is_empty() {
                return Err(Error::invalid(None, "key", "exercise id must not be empty"));
            }
            return Ok(ProjectionKey::ExerciseHistory(id.to_string()));
        }
        ProjectionKey::FIXED
            .into_iter()
            .find(|key| key.to_string() == s)
            .ok_or_else(|| Error::invalid(None, "key", format!("unknown projection {:?}", s)))
    }
}

/// Typed view of every projection document of one user
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProjectionState {
    pub current_workout: Option<CurrentWorkout>,
    /// Most recent first
    pub workout_history: Vec<WorkoutSnapshot>,
    pub templates: BTreeMap<String, Template>,
    pub personal_records: PersonalRecords,
    /// Keyed by `<template_id>:<exercise_id>`
    pub progression_states: BTreeMap<String, ProgressionState>,
    /// Keyed by exercise id, most recent session first. Only the exercises
    /// an event needs are loaded.
    pub exercise_history: BTreeMap<String, Vec<ExerciseSession>>,
}

fn decode<T: DeserializeOwned + Default, P: ProjectionStore + ?Sized>(
    store: &P,
    user: &UserId,
    key: &ProjectionKey,
) -> Result<T> {
    match store.load(user, key)? {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Ok(T::default()),
    }
}

/// Encode a collection, treating an empty one as absent
fn encode<T: Serialize>(value: &T, is_empty: bool) -> Result<Option<Value>> {
    if is_empty {
        return Ok(None);
    }
    Ok(Some(serde_json::to_value(value)?))
}

impl ProjectionState {
    /// Load the user's fixed documents from the store
    ///
    /// Per-exercise histories are left out; see [`ProjectionState::load_for`].
    pub fn load<P: ProjectionStore + ?Sized>(store: &P, user: &UserId) -> Result<Self> {
        Ok(ProjectionState {
            current_workout: decode(store, user, &ProjectionKey::CurrentWorkout)?,
            workout_history: decode(store, user, &ProjectionKey::WorkoutHistory)?,
            templates: decode(store, user, &ProjectionKey::Templates)?,
            personal_records: decode(store, user, &ProjectionKey::PersonalRecords)?,
            progression_states: decode(store, user, &ProjectionKey::ProgressionStates)?,
            exercise_history: BTreeMap::new(),
        })
    }

    /// Load what folding `event` reads: the fixed documents, plus the
    /// histories of the active workout's exercises when it completes
    pub fn load_for<P: ProjectionStore + ?Sized>(
        store: &P,
        user: &UserId,
        event: &Event,
    ) -> Result<Self> {
        let mut state = Self::load(store, user)?;
        if let EventPayload::WorkoutCompleted(_) = &event.payload {
            let ids: Vec<String> = state
                .current_workout
                .iter()
                .flat_map(|w| w.exercises.iter().map(|e| e.exercise_id.clone()))
                .collect();
            state.load_exercise_history(store, user, ids)?;
        }
        Ok(state)
    }

    /// Load the stored histories of the given exercises
    pub fn load_exercise_history<P: ProjectionStore + ?Sized>(
        &mut self,
        store: &P,
        user: &UserId,
        exercise_ids: impl IntoIterator<Item = String>,
    ) -> Result<()> {
        for id in exercise_ids {
            let key = ProjectionKey::ExerciseHistory(id.clone());
            let sessions: Vec<ExerciseSession> = decode(store, user, &key)?;
            if !sessions.is_empty() {
                self.exercise_history.insert(id, sessions);
            }
        }
        Ok(())
    }

    /// Every key this state holds a document for
    pub fn keys(&self) -> Vec<ProjectionKey> {
        let mut keys = ProjectionKey::FIXED.to_vec();
        keys.extend(
            self.exercise_history
                .keys()
                .map(|id| ProjectionKey::ExerciseHistory(id.clone())),
        );
        keys
    }

    /// Serialize one projection; `None` means the document should not exist
    pub fn document(&self, key: &ProjectionKey) -> Result<Option<Value>> {
        match key {
            ProjectionKey::CurrentWorkout => match &self.current_workout {
                Some(workout) => Ok(Some(serde_json::to_value(workout)?)),
                None => Ok(None),
            },
            ProjectionKey::WorkoutHistory => {
                encode(&self.workout_history, self.workout_history.is_empty())
            }
            ProjectionKey::Templates => encode(&self.templates, self.templates.is_empty()),
            ProjectionKey::PersonalRecords => {
                encode(&self.personal_records, self.personal_records.is_empty())
            }
            ProjectionKey::ProgressionStates => {
                encode(&self.progression_states, self.progression_states.is_empty())
            }
            ProjectionKey::ExerciseHistory(id) => match self.exercise_history.get(id) {
                Some(sessions) => encode(sessions, sessions.is_empty()),
                None => Ok(None),
            },
        }
    }
}
