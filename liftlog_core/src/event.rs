//! Event types for the append-only log.
//!
//! Every user action is recorded as an [`Event`]: an immutable record carrying
//! one variant of the closed [`EventPayload`] enum. Payloads are only ever
//! constructed through [`crate::schema::validate`] or deserialized back from
//! the log.

use crate::progression::ProgressionRule;
use crate::types::{SetStatus, TemplateExercise, WeightUnit};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Version stamped on every newly appended event
pub const SCHEMA_VERSION: u32 = 1;

/// Closed set of event type tags
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    WorkoutStarted,
    WorkoutCompleted,
    WorkoutDiscarded,
    ExerciseAdded,
    SetLogged,
    SetModified,
    SetDeleted,
    TemplateCreated,
    TemplateUpdated,
    TemplateDeleted,
}

impl EventType {
    pub const ALL: [EventType; 10] = [
        EventType::WorkoutStarted,
        EventType::WorkoutCompleted,
        EventType::WorkoutDiscarded,
        EventType::ExerciseAdded,
        EventType::SetLogged,
        EventType::SetModified,
        EventType::SetDeleted,
        EventType::TemplateCreated,
        EventType::TemplateUpdated,
        EventType::TemplateDeleted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::WorkoutStarted => "WorkoutStarted",
            EventType::WorkoutCompleted => "WorkoutCompleted",
            EventType::WorkoutDiscarded => "WorkoutDiscarded",
            EventType::ExerciseAdded => "ExerciseAdded",
            EventType::SetLogged => "SetLogged",
            EventType::SetModified => "SetModified",
            EventType::SetDeleted => "SetDeleted",
            EventType::TemplateCreated => "TemplateCreated",
            EventType::TemplateUpdated => "TemplateUpdated",
            EventType::TemplateDeleted => "TemplateDeleted",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::invalid(None, "event_type", format!("unknown event type {:?}", s)))
    }
}

// ============================================================================
// Payloads
// ============================================================================

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WorkoutStarted {
    #[serde(default = "new_id")]
    pub workout_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub from_template_id: Option<String>,
    #[serde(default)]
    pub exercise_ids: Option<Vec<String>>,
    /// Guided plan supplied inline by the caller
    #[serde(default)]
    pub exercise_plans: Option<Vec<TemplateExercise>>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WorkoutCompleted {
    pub workout_id: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WorkoutDiscarded {
    pub workout_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ExerciseAdded {
    pub workout_id: String,
    pub exercise_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SetLogged {
    pub workout_id: String,
    pub exercise_id: String,
    pub weight: f64,
    pub reps: u32,
    #[serde(default)]
    pub unit: WeightUnit,
    #[serde(default)]
    pub status: SetStatus,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SetModified {
    pub workout_id: String,
    pub original_event_id: Uuid,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub reps: Option<u32>,
    #[serde(default)]
    pub unit: Option<WeightUnit>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SetDeleted {
    pub workout_id: String,
    pub original_event_id: Uuid,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TemplateCreated {
    #[serde(default = "new_id")]
    pub template_id: String,
    pub name: String,
    /// Legacy format: ids only, no targets
    #[serde(default)]
    pub exercise_ids: Option<Vec<String>>,
    #[serde(default)]
    pub exercises: Option<Vec<TemplateExercise>>,
    #[serde(default)]
    pub source_workout_id: Option<String>,
    #[serde(default)]
    pub default_progression: Option<ProgressionRule>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TemplateUpdated {
    pub template_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub exercise_ids: Option<Vec<String>>,
    #[serde(default)]
    pub exercises: Option<Vec<TemplateExercise>>,
    #[serde(default)]
    pub default_progression: Option<ProgressionRule>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TemplateDeleted {
    pub template_id: String,
}

/// A validated payload, one variant per event type
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event_type", content = "payload")]
pub enum EventPayload {
    WorkoutStarted(WorkoutStarted),
    WorkoutCompleted(WorkoutCompleted),
    WorkoutDiscarded(WorkoutDiscarded),
    ExerciseAdded(ExerciseAdded),
    SetLogged(SetLogged),
    SetModified(SetModified),
    SetDeleted(SetDeleted),
    TemplateCreated(TemplateCreated),
    TemplateUpdated(TemplateUpdated),
    TemplateDeleted(TemplateDeleted),
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::WorkoutStarted(_) => EventType::WorkoutStarted,
            EventPayload::WorkoutCompleted(_) => EventType::WorkoutCompleted,
            EventPayload::WorkoutDiscarded(_) => EventType::WorkoutDiscarded,
            EventPayload::ExerciseAdded(_) => EventType::ExerciseAdded,
            EventPayload::SetLogged(_) => EventType::SetLogged,
            EventPayload::SetModified(_) => EventType::SetModified,
            EventPayload::SetDeleted(_) => EventType::SetDeleted,
            EventPayload::TemplateCreated(_) => EventType::TemplateCreated,
            EventPayload::TemplateUpdated(_) => EventType::TemplateUpdated,
            EventPayload::TemplateDeleted(_) => EventType::TemplateDeleted,
        }
    }
}

// ============================================================================
// Stored Event
// ============================================================================

/// An immutable, stored fact
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(flatten)]
    pub payload: EventPayload,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl Event {
    pub fn new(timestamp: DateTime<Utc>, payload: EventPayload) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp,
            schema_version: SCHEMA_VERSION,
            payload,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }
}
