//! Projection document persistence with file locking.
//!
//! Each projection key is stored as its own JSON document under
//! `<data_dir>/users/<user_id>/projections/`. Writes are atomic so a crash
//! never leaves a half-written document behind.

use crate::error::StorageError;
use crate::projection::ProjectionKey;
use crate::store::{ProjectionStore, UserId};
use crate::{Error, Result};
use fs2::FileExt;
use serde_json::Value;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// File-per-key projection store
#[derive(Clone, Debug)]
pub struct FileProjectionStore {
    data_dir: PathBuf,
}

impl FileProjectionStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn dir_for(&self, user: &UserId) -> PathBuf {
        self.data_dir
            .join("users")
            .join(user.as_str())
            .join("projections")
    }

    /// Path of the document stored for `key`
    ///
    /// Fails when the encoded key does not fit in a file name.
    pub fn path_for(&self, user: &UserId, key: &ProjectionKey) -> Result<PathBuf> {
        let stem = encode_file_stem(&key.to_string());
        if stem.len() > MAX_FILE_STEM {
            return Err(Error::invalid(
                None,
                "key",
                format!("projection key {:?} is too long to store", key.to_string()),
            ));
        }
        Ok(self.dir_for(user).join(format!("{}.json", stem)))
    }
}

/// Leaves room for the extension within the usual 255-byte name limit
const MAX_FILE_STEM: usize = 240;

/// Percent-encode every byte outside `[A-Za-z0-9_-]`
fn encode_file_stem(key: &str) -> String {
    let mut stem = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("%{:02X}", byte));
        }
    }
    stem
}

fn decode_file_stem(stem: &str) -> Option<String> {
    let bytes = stem.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = stem.get(i + 1..i + 3)?;
            decoded.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).ok()
}

fn lock_error(path: &Path, source: std::io::Error) -> Error {
    Error::Storage(StorageError::Lock {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a JSON document with shared locking
///
/// Returns `None` if the file doesn't exist. A corrupted document is logged
/// and treated as absent; `rebuild` restores it from the event log.
fn load_document(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }

    let file = File::open(path)?;
    file.lock_shared().map_err(|e| lock_error(path, e))?;

    let mut contents = String::new();
    let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
    file.unlock()?;
    read?;

    match serde_json::from_str::<Value>(&contents) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::warn!(
                "Failed to parse projection {:?}: {}. Treating as empty; run rebuild to restore it.",
                path,
                e
            );
            Ok(None)
        }
    }
}

/// Write a document to a synced temp file next to `path`
///
/// Nothing is visible at `path` until the returned file is persisted.
fn stage_document(path: &Path, value: &Value) -> Result<NamedTempFile> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::Other, "projection path missing parent")
    })?;
    std::fs::create_dir_all(parent)?;

    // Unique temp file in the same directory for atomic rename
    let temp = NamedTempFile::new_in(parent)?;
    temp.as_file()
        .lock_exclusive()
        .map_err(|e| lock_error(temp.path(), e))?;

    {
        let mut writer = std::io::BufWriter::new(temp.as_file());
        let contents = serde_json::to_string(value)?;
        writer.write_all(contents.as_bytes())?;
        writer.flush()?;
    }

    temp.as_file().sync_all()?;
    temp.as_file().unlock()?;
    Ok(temp)
}

fn remove_document(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

impl ProjectionStore for FileProjectionStore {
    fn load(&self, user: &UserId, key: &ProjectionKey) -> Result<Option<Value>> {
        load_document(&self.path_for(user, key)?)
    }

    fn save(&self, user: &UserId, key: &ProjectionKey, value: Option<&Value>) -> Result<()> {
        self.save_all(user, &[(key.clone(), value.cloned())])
    }

    /// Stage every document into a temp file first; live documents are only
    /// replaced once all of them were written
    fn save_all(&self, user: &UserId, documents: &[(ProjectionKey, Option<Value>)]) -> Result<()> {
        let mut staged = Vec::with_capacity(documents.len());
        for (key, value) in documents {
            let path = self.path_for(user, key)?;
            let temp = match value {
                Some(value) => Some(stage_document(&path, value)?),
                None => None,
            };
            staged.push((path, temp));
        }

        for (path, temp) in staged {
            match temp {
                Some(temp) => {
                    temp.persist(&path).map_err(|e| Error::from(e.error))?;
                }
                None => remove_document(&path)?,
            }
        }
        tracing::debug!("Saved {} projections for user {}", documents.len(), user);
        Ok(())
    }

    fn keys(&self, user: &UserId) -> Result<Vec<ProjectionKey>> {
        let dir = self.dir_for(user);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(decode_file_stem)
                .and_then(|s| s.parse::<ProjectionKey>().ok());
            match key {
                Some(key) => keys.push(key),
                None => tracing::warn!("Ignoring unrecognized projection file {:?}", path),
            }
        }
        keys.sort();
        Ok(keys)
    }
}
