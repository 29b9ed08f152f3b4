#![forbid(unsafe_code)]

//! Core domain model and business logic for liftlog, an event-sourced
//! strength-training log.
//!
//! This crate provides:
//! - Events and strict payload validation
//! - Per-user event log and projection storage (JSONL, JSON files, memory)
//! - Projection folding for workouts, templates and history
//! - Personal record detection and template progression
//! - The [`Engine`] tying them together, plus CSV export

pub mod types;
pub mod error;
pub mod event;
pub mod schema;
pub mod config;
pub mod logging;
pub mod library;
pub mod store;
pub mod wal;
pub mod state;
pub mod projection;
pub mod records;
pub mod progression;
pub mod fold;
pub mod engine;
pub mod export;

// Re-export commonly used types
pub use error::{EntityKind, Error, FieldViolation, Result, StorageError};
pub use types::*;
pub use event::{Event, EventPayload, EventType};
pub use config::Config;
pub use library::{default_library, ExerciseInfo, ExerciseLibrary, ExerciseLookup};
pub use store::{EventLog, MemoryStore, ProjectionStore, UserId};
pub use wal::JsonlEventLog;
pub use state::FileProjectionStore;
pub use projection::{ProjectionKey, ProjectionState};
pub use records::{PrHit, PrType};
pub use progression::{ProgressionRule, ProgressionState};
pub use fold::Derived;
pub use engine::{Engine, RebuildReport};
pub use export::{export_history_csv, write_history_csv};
