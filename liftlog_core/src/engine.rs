//! The engine: the single write path and read path of liftlog.
//!
//! `emit` validates a payload, appends the event to the user's log, folds it
//! into the projections and returns the derived results, all synchronously:
//! a caller reading right after `emit` sees its own write.
//!
//! ## Failure semantics
//!
//! 1. **Validation**: rejected before anything is stored
//! 2. **Storage**: the append failed, nothing changed
//! 3. **Fold** (`NotFound`, `Conflict`, `UnmodifiableSet`): the event stays
//!    in the log but no projection is written; `rebuild` skips it the same way
//! 4. **Projection write**: the touched documents are replaced together, or
//!    not at all

use crate::config::Config;
use crate::event::{Event, EventType};
use crate::fold::{fold, Derived, FoldContext};
use crate::library::{default_library, ExerciseLibrary, ExerciseLookup};
use crate::projection::{ProjectionKey, ProjectionState};
use crate::schema;
use crate::state::FileProjectionStore;
use crate::store::{EventLog, MemoryStore, ProjectionStore, UserId};
use crate::wal::JsonlEventLog;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

/// Summary of a projection rebuild
#[derive(Clone, Copy, Debug, Default, Serialize, PartialEq, Eq)]
pub struct RebuildReport {
    pub events: usize,
    pub applied: usize,
    pub skipped: usize,
}

/// Event-sourced engine over an event log and a projection store
pub struct Engine<L, P> {
    log: L,
    projections: P,
    config: Config,
    library: Box<dyn ExerciseLookup + Send + Sync>,
    clock: fn() -> DateTime<Utc>,
}

impl Engine<JsonlEventLog, FileProjectionStore> {
    /// Open the file-backed engine rooted at `config.data.data_dir`
    pub fn open(config: Config) -> Result<Self> {
        let data_dir = config.data.data_dir.clone();
        let library_path = config.library.path.clone();
        let engine = Self::new(
            JsonlEventLog::new(&data_dir),
            FileProjectionStore::new(&data_dir),
            config,
        );
        tracing::info!("Opened liftlog data directory {:?}", data_dir);
        match library_path {
            Some(path) => Ok(engine.with_library(ExerciseLibrary::load_from(&path)?)),
            None => Ok(engine),
        }
    }
}

impl Engine<MemoryStore, MemoryStore> {
    /// Engine keeping everything in process
    pub fn in_memory(config: Config) -> Self {
        Self::new(MemoryStore::new(), MemoryStore::new(), config)
    }
}

impl<L: EventLog, P: ProjectionStore> Engine<L, P> {
    pub fn new(log: L, projections: P, config: Config) -> Self {
        Self {
            log,
            projections,
            config,
            library: Box::new(default_library()),
            clock: Utc::now,
        }
    }

    /// Replace the built-in exercise library
    pub fn with_library(mut self, library: impl ExerciseLookup + Send + Sync + 'static) -> Self {
        self.library = Box::new(library);
        self
    }

    /// Replace the wall clock used to stamp events
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn context(&self) -> FoldContext<'_> {
        FoldContext {
            library: self.library.as_ref(),
            progression: &self.config.progression,
        }
    }

    /// Current time, never earlier than the user's last event
    fn next_timestamp(&self, user: &UserId) -> Result<DateTime<Utc>> {
        let now = (self.clock)();
        match self.log.last_timestamp(user)? {
            Some(last) if last > now => {
                tracing::warn!(
                    "Clock went backwards for user {} ({} < {}), reusing last timestamp",
                    user,
                    now,
                    last
                );
                Ok(last)
            }
            _ => Ok(now),
        }
    }

    /// Validate, record and apply one event
    pub fn emit(
        &self,
        user: &UserId,
        event_type: EventType,
        payload: &Value,
    ) -> Result<(Event, Derived)> {
        let typed = schema::validate(event_type, payload)?;
        let event = Event::new(self.next_timestamp(user)?, typed);
        self.log.append(user, &event)?;
        tracing::info!(
            "Recorded {} {} for user {}",
            event.event_type(),
            event.event_id,
            user
        );

        let mut state = ProjectionState::load_for(&self.projections, user, &event)?;
        let folded = match fold(&self.context(), &mut state, &event) {
            Ok(folded) => folded,
            Err(e) => {
                tracing::warn!(
                    "{} {} recorded but not applied: {}",
                    event.event_type(),
                    event.event_id,
                    e
                );
                return Err(e);
            }
        };
        self.write(user, &state, &folded.touched)?;
        Ok((event, folded.derived))
    }

    /// Write `keys` back as one unit
    fn write<'k>(
        &self,
        user: &UserId,
        state: &ProjectionState,
        keys: impl IntoIterator<Item = &'k ProjectionKey>,
    ) -> Result<()> {
        let documents = keys
            .into_iter()
            .map(|key| Ok((key.clone(), state.document(key)?)))
            .collect::<Result<Vec<_>>>()?;
        self.projections.save_all(user, &documents)
    }

    /// Read one projection document; `None` when nothing has been recorded
    pub fn get_projection(&self, user: &UserId, key: &ProjectionKey) -> Result<Option<Value>> {
        self.projections.load(user, key)
    }

    /// Stored events, most recent first, optionally filtered by type
    pub fn events(
        &self,
        user: &UserId,
        event_type: Option<EventType>,
        limit: Option<usize>,
    ) -> Result<Vec<Event>> {
        Ok(self
            .log
            .events(user)?
            .into_iter()
            .rev()
            .filter(|e| event_type.map_or(true, |t| e.event_type() == t))
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    /// Refold the whole log and replace the user's projections with the result
    pub fn rebuild(&self, user: &UserId) -> Result<RebuildReport> {
        let events = self.log.events(user)?;
        let ctx = self.context();
        let mut state = ProjectionState::default();
        let mut report = RebuildReport {
            events: events.len(),
            ..RebuildReport::default()
        };

        for event in &events {
            match fold(&ctx, &mut state, event) {
                Ok(_) => report.applied += 1,
                Err(e) => {
                    tracing::warn!(
                        "Skipping {} {} during rebuild: {}",
                        event.event_type(),
                        event.event_id,
                        e
                    );
                    report.skipped += 1;
                }
            }
        }

        // Stale documents are written as absent
        let mut keys: BTreeSet<_> = self.projections.keys(user)?.into_iter().collect();
        keys.extend(state.keys());
        self.write(user, &state, &keys)?;

        tracing::info!(
            "Rebuilt projections for user {}: {} applied, {} skipped",
            user,
            report.applied,
            report.skipped
        );
        Ok(report)
    }
}
