use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage unavailable in this environment")]
    Unavailable,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Raw string key/value storage. Implementations must not panic: a failed
/// read degrades to `None` and a failed write surfaces a `PersistenceError`
/// that the adapter layer swallows.
pub trait StorageBackend {
    /// Whether this environment has a persistent store at all. An
    /// unavailable backend behaves like an always-empty store.
    fn available(&self) -> bool {
        true
    }

    fn get(&self, key: &str) -> Option<String>;

    fn set(&mut self, key: &str, raw: &str) -> Result<(), PersistenceError>;

    fn remove(&mut self, key: &str);
}

/// One file per key under a data directory, written atomically.
#[derive(Debug)]
pub struct FileBackend {
    data_dir: PathBuf,
}

impl FileBackend {
    pub fn open(data_dir: &Path) -> Result<Self, PersistenceError> {
        fs::create_dir_all(data_dir)?;
        debug!(data_dir = %data_dir.display(), "opened file backend");
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut name = String::with_capacity(key.len());
        for ch in key.chars() {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                name.push(ch);
            } else {
                name.push('_');
            }
        }
        self.data_dir.join(format!("{name}.data"))
    }
}

impl StorageBackend for FileBackend {
    fn get(&self, key: &str) -> Option<String> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(raw) => Some(raw),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                warn!(key, file = %path.display(), error = %err, "failed to read entry");
                None
            }
        }
    }

    fn set(&mut self, key: &str, raw: &str) -> Result<(), PersistenceError> {
        let path = self.path_for(key);
        let mut temp = NamedTempFile::new_in(&self.data_dir)?;
        temp.write_all(raw.as_bytes())?;
        temp.flush()?;
        temp.persist(&path).map_err(|err| err.error)?;
        debug!(key, file = %path.display(), bytes = raw.len(), "persisted entry");
        Ok(())
    }

    fn remove(&mut self, key: &str) {
        let path = self.path_for(key);
        if let Err(err) = fs::remove_file(&path)
            && err.kind() != io::ErrorKind::NotFound
        {
            warn!(key, file = %path.display(), error = %err, "failed to remove entry");
        }
    }
}

/// HashMap-backed storage, for tests and intentionally ephemeral stores.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: HashMap<String, String>,
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, raw: &str) -> Result<(), PersistenceError> {
        self.entries.insert(key.to_string(), raw.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }
}

/// The "no storage in this environment" backend. Reads are always empty and
/// writes report `Unavailable`, which callers downgrade to in-memory-only
/// operation.
#[derive(Debug, Default)]
pub struct NullBackend;

impl StorageBackend for NullBackend {
    fn available(&self) -> bool {
        false
    }

    fn get(&self, _key: &str) -> Option<String> {
        None
    }

    fn set(&mut self, _key: &str, _raw: &str) -> Result<(), PersistenceError> {
        Err(PersistenceError::Unavailable)
    }

    fn remove(&mut self, _key: &str) {}
}

/// Outcome of decoding a raw stored payload. Distinguishes "nothing stored"
/// from "stored but malformed" so callers can treat the two differently.
#[derive(Debug)]
pub enum Parsed<T> {
    Missing,
    Malformed(serde_json::Error),
    Value(T),
}

impl<T> Parsed<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Parsed::Value(value) => Some(value),
            Parsed::Missing | Parsed::Malformed(_) => None,
        }
    }
}

pub fn safe_parse_json<T: DeserializeOwned>(raw: Option<&str>) -> Parsed<T> {
    let Some(raw) = raw else {
        return Parsed::Missing;
    };

    match serde_json::from_str(raw) {
        Ok(value) => Parsed::Value(value),
        Err(err) => Parsed::Malformed(err),
    }
}
