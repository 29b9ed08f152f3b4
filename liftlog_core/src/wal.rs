//! Write-Ahead Log (WAL) for event persistence.
//!
//! Events are appended to one JSONL (JSON Lines) file per user with file
//! locking to ensure safe concurrent access:
//! `<data_dir>/users/<user_id>/events.jsonl`.

use crate::error::StorageError;
use crate::event::Event;
use crate::store::{EventLog, UserId};
use crate::{Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use chrono::{DateTime, Utc};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// JSONL-based event log with file locking
#[derive(Clone, Debug)]
pub struct JsonlEventLog {
    data_dir: PathBuf,
}

impl JsonlEventLog {
    /// Create a log rooted at the given data directory
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Path of the user's log file
    pub fn path_for(&self, user: &UserId) -> PathBuf {
        self.data_dir
            .join("users")
            .join(user.as_str())
            .join("events.jsonl")
    }
}

fn lock_error(path: &Path, source: std::io::Error) -> Error {
    Error::Storage(StorageError::Lock {
        path: path.to_path_buf(),
        source,
    })
}

impl EventLog for JsonlEventLog {
    fn append(&self, user: &UserId, event: &Event) -> Result<()> {
        let path = self.path_for(user);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.lock_exclusive().map_err(|e| lock_error(&path, e))?;

        // Write event as one JSON line
        let line = serde_json::to_string(event)?;
        {
            let mut writer = std::io::BufWriter::new(&file);
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        file.sync_data()?;
        file.unlock()?;

        tracing::debug!(
            "Appended {} {} for user {}",
            event.event_type(),
            event.event_id,
            user
        );
        Ok(())
    }

    fn events(&self, user: &UserId) -> Result<Vec<Event>> {
        read_events(&self.path_for(user))
    }

    /// Reads only the tail of the log; falls back to a full scan when the
    /// last line is unreadable
    fn last_timestamp(&self, user: &UserId) -> Result<Option<DateTime<Utc>>> {
        let path = self.path_for(user);
        if !path.exists() {
            return Ok(None);
        }

        let mut file = File::open(&path)?;
        file.lock_shared().map_err(|e| lock_error(&path, e))?;
        let last = read_last_line(&mut file);
        file.unlock()?;

        match last? {
            None => Ok(None),
            Some(line) => match serde_json::from_str::<Event>(&line) {
                Ok(event) => Ok(Some(event.timestamp)),
                Err(e) => {
                    tracing::warn!("Last event in {:?} is unreadable ({}), scanning the log", path, e);
                    Ok(read_events(&path)?.last().map(|e| e.timestamp))
                }
            },
        }
    }
}

const TAIL_CHUNK: u64 = 4096;

/// Last non-blank line of a file, read backwards in chunks
fn read_last_line(file: &mut File) -> std::io::Result<Option<String>> {
    let mut end = file.metadata()?.len();
    let mut tail: Vec<u8> = Vec::new();

    while end > 0 {
        let start = end.saturating_sub(TAIL_CHUNK);
        let mut chunk = vec![0u8; (end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(&mut chunk)?;
        chunk.extend_from_slice(&tail);
        tail = chunk;
        end = start;

        let Some(last) = tail.iter().rposition(|b| !b.is_ascii_whitespace()) else {
            continue;
        };
        if let Some(newline) = tail[..last].iter().rposition(|&b| b == b'\n') {
            return Ok(Some(String::from_utf8_lossy(&tail[newline + 1..=last]).into_owned()));
        }
        if end == 0 {
            return Ok(Some(String::from_utf8_lossy(&tail[..=last]).into_owned()));
        }
    }
    Ok(None)
}

/// Read all events from a log file
///
/// Lines that fail to parse are skipped with a warning.
pub fn read_events(path: &Path) -> Result<Vec<Event>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared().map_err(|e| lock_error(path, e))?;

    let reader = BufReader::new(&file);
    let mut events = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<Event>(&line) {
            Ok(event) => events.push(event),
            Err(e) => {
                tracing::warn!(
                    "Skipping unreadable event at {:?} line {}: {}",
                    path,
                    line_num + 1,
                    e
                );
            }
        }
    }

    file.unlock()?;
    tracing::debug!("Read {} events from {:?}", events.len(), path);
    Ok(events)
}
