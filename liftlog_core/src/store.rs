//! Storage seam: the event log and projection store traits.
//!
//! Both traits are keyed by [`UserId`]; every user's data is partitioned and
//! nothing is shared across users. File-backed implementations live in
//! [`crate::wal`] and [`crate::state`]; [`MemoryStore`] keeps everything in
//! process.

use crate::error::StorageError;
use crate::event::Event;
use crate::projection::ProjectionKey;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;

const MAX_USER_ID_LEN: usize = 64;

/// A validated user identifier, safe to use as a directory name
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(String);

impl UserId {
    pub fn parse(raw: &str) -> Result<Self> {
        let problem = if raw.is_empty() {
            Some("must not be empty".to_string())
        } else if raw.len() > MAX_USER_ID_LEN {
            Some(format!("must be at most {} characters", MAX_USER_ID_LEN))
        } else if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            Some("may only contain ASCII letters, digits, '-' and '_'".to_string())
        } else {
            None
        };

        match problem {
            Some(problem) => Err(Error::invalid(None, "user_id", problem)),
            None => Ok(UserId(raw.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UserId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        UserId::parse(s)
    }
}

/// Append-only, per-user event log
pub trait EventLog {
    /// Durably append one event; returns only once it is persisted
    fn append(&self, user: &UserId, event: &Event) -> Result<()>;

    /// All events of the user, in append (chronological) order
    fn events(&self, user: &UserId) -> Result<Vec<Event>>;

    /// Timestamp of the most recently appended event
    fn last_timestamp(&self, user: &UserId) -> Result<Option<DateTime<Utc>>> {
        Ok(self.events(user)?.last().map(|e| e.timestamp))
    }
}

/// Per-user key/value store of projection documents
pub trait ProjectionStore {
    fn load(&self, user: &UserId, key: &ProjectionKey) -> Result<Option<Value>>;

    /// Write a document, or remove it when `value` is `None`
    fn save(&self, user: &UserId, key: &ProjectionKey, value: Option<&Value>) -> Result<()>;

    /// Write several documents as one unit: if any of them cannot be
    /// written, none of the stored documents change
    fn save_all(&self, user: &UserId, documents: &[(ProjectionKey, Option<Value>)]) -> Result<()>;

    /// Keys with a stored document
    fn keys(&self, user: &UserId) -> Result<Vec<ProjectionKey>>;
}

/// In-process backend implementing both traits
#[derive(Debug, Default)]
pub struct MemoryStore {
    events: RwLock<HashMap<UserId, Vec<Event>>>,
    projections: RwLock<HashMap<UserId, BTreeMap<ProjectionKey, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Storage(StorageError::Poisoned)
}

impl EventLog for MemoryStore {
    fn append(&self, user: &UserId, event: &Event) -> Result<()> {
        let mut events = self.events.write().map_err(poisoned)?;
        events.entry(user.clone()).or_default().push(event.clone());
        Ok(())
    }

    fn events(&self, user: &UserId) -> Result<Vec<Event>> {
        let events = self.events.read().map_err(poisoned)?;
        Ok(events.get(user).cloned().unwrap_or_default())
    }

    fn last_timestamp(&self, user: &UserId) -> Result<Option<DateTime<Utc>>> {
        let events = self.events.read().map_err(poisoned)?;
        Ok(events
            .get(user)
            .and_then(|list| list.last())
            .map(|e| e.timestamp))
    }
}

impl ProjectionStore for MemoryStore {
    fn load(&self, user: &UserId, key: &ProjectionKey) -> Result<Option<Value>> {
        let projections = self.projections.read().map_err(poisoned)?;
        Ok(projections.get(user).and_then(|docs| docs.get(key)).cloned())
    }

    fn save(&self, user: &UserId, key: &ProjectionKey, value: Option<&Value>) -> Result<()> {
        self.save_all(user, &[(key.clone(), value.cloned())])
    }

    fn save_all(&self, user: &UserId, documents: &[(ProjectionKey, Option<Value>)]) -> Result<()> {
        let mut projections = self.projections.write().map_err(poisoned)?;
        let docs = projections.entry(user.clone()).or_default();
        for (key, value) in documents {
            match value {
                Some(value) => {
                    docs.insert(key.clone(), value.clone());
                }
                None => {
                    docs.remove(key);
                }
            }
        }
        Ok(())
    }

    fn keys(&self, user: &UserId) -> Result<Vec<ProjectionKey>> {
        let projections = self.projections.read().map_err(poisoned)?;
        Ok(projections
            .get(user)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default())
    }
}
