//! Error types for the liftlog_core library.

use crate::event::EventType;
use serde::Serialize;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// A single violated field in a rejected payload
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    /// Dotted path to the field, e.g. `exercises[0].set_groups[1].target_sets`
    pub field: String,
    pub problem: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, problem: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            problem: problem.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.problem)
    }
}

/// Kind of entity referenced by a `NotFound` or `Conflict` error
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Workout,
    Template,
    Set,
    HistoryWorkout,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Workout => "workout",
            EntityKind::Template => "template",
            EntityKind::Set => "set",
            EntityKind::HistoryWorkout => "workout in history",
        };
        f.write_str(name)
    }
}

/// Failure at the durable storage boundary
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unable to acquire a file lock
    #[error("failed to lock {path:?}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// In-memory backend lock was poisoned by a panicking writer
    #[error("store lock poisoned")]
    Poisoned,
}

/// Core error type for liftlog_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or incomplete input; nothing was recorded
    #[error("invalid {}: {}", describe_target(.event_type), join_violations(.violations))]
    Validation {
        event_type: Option<EventType>,
        violations: Vec<FieldViolation>,
    },

    /// A referenced workout, template or set does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// The referenced set predates event ids and cannot be corrected
    #[error(
        "set {original_event_id} in workout {workout_id} has no originating event id and cannot be modified"
    )]
    UnmodifiableSet {
        workout_id: String,
        original_event_id: String,
    },

    /// The entity already exists (or, for workouts, one is already active)
    #[error("{kind} already exists: {id}")]
    Conflict { kind: EntityKind, id: String },

    /// Durable read/write failure, propagated without retry
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for a validation error on a single field
    pub fn invalid(
        event_type: Option<EventType>,
        field: impl Into<String>,
        problem: impl Into<String>,
    ) -> Self {
        Error::Validation {
            event_type,
            violations: vec![FieldViolation::new(field, problem)],
        }
    }

    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn conflict(kind: EntityKind, id: impl Into<String>) -> Self {
        Error::Conflict {
            kind,
            id: id.into(),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Storage(StorageError::Io(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Storage(StorageError::Json(err))
    }
}

fn describe_target(event_type: &Option<EventType>) -> String {
    match event_type {
        Some(event_type) => format!("{} payload", event_type),
        None => "input".to_string(),
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
