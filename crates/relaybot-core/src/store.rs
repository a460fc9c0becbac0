//! Snapshot persistence for the block list and correlation documents.
//!
//! Stores are whole-document: `load()` returns the last saved snapshot and
//! `save()` replaces it. Callers keep their in-memory copy authoritative and
//! treat a failed save as a logged warning.

use std::{
    fs,
    marker::PhantomData,
    path::{Path, PathBuf},
    sync::Mutex,
};

use serde::{de::DeserializeOwned, Serialize};

use crate::{errors::Error, Result};

pub trait Store<T>: Send + Sync {
    /// Returns `None` when nothing has been saved yet.
    fn load(&self) -> Result<Option<T>>;
    fn save(&self, doc: &T) -> Result<()>;
}

/// JSON document on disk. Writes go to a sibling temp file and are renamed
/// into place so a crash never leaves a half-written document behind.
pub struct JsonFileStore<T> {
    path: PathBuf,
    _doc: PhantomData<fn() -> T>,
}

impl<T> JsonFileStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _doc: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl<T> Store<T> for JsonFileStore<T>
where
    T: Serialize + DeserializeOwned,
{
    fn load(&self) -> Result<Option<T>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let txt = fs::read_to_string(&self.path)?;
        if txt.trim().is_empty() {
            return Ok(None);
        }
        let doc = serde_json::from_str(&txt).map_err(|e| Error::Store {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        Ok(Some(doc))
    }

    fn save(&self, doc: &T) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let txt = serde_json::to_string(doc)?;
        let tmp = self.tmp_path();
        fs::write(&tmp, txt)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-process store, used by tests and when no data directory is wanted.
pub struct MemoryStore<T> {
    doc: Mutex<Option<T>>,
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            doc: Mutex::new(None),
        }
    }

    pub fn with_doc(doc: T) -> Self {
        Self {
            doc: Mutex::new(Some(doc)),
        }
    }
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MemoryStore<T>
where
    T: Clone,
{
    /// Last saved snapshot.
    pub fn snapshot(&self) -> Option<T> {
        self.doc.lock().ok().and_then(|g| g.clone())
    }
}

impl<T> Store<T> for MemoryStore<T>
where
    T: Clone + Send,
{
    fn load(&self) -> Result<Option<T>> {
        let guard = self
            .doc
            .lock()
            .map_err(|_| Error::External("memory store poisoned".to_string()))?;
        Ok(guard.clone())
    }

    fn save(&self, doc: &T) -> Result<()> {
        let mut guard = self
            .doc
            .lock()
            .map_err(|_| Error::External("memory store poisoned".to_string()))?;
        *guard = Some(doc.clone());
        Ok(())
    }
}
