//! State manager implementation
//!
//! Provides file-based state persistence with atomic writes and the
//! monotonic bookmark discipline.
//!
//! All operations are synchronous so the pending-bookmark guard can flush
//! from `Drop`.

use super::types::State;
use crate::error::{Error, Result};
use crate::types::ReplicationMethod;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::debug;

/// State manager for persisting and loading state
#[derive(Debug, Clone)]
pub struct StateManager {
    /// Path to the state file (empty = in memory)
    path: PathBuf,
    /// Current state
    state: State,
    /// Whether to save after every accepted advance
    auto_save: bool,
}

impl StateManager {
    /// Create a new state manager with the given path
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            state: State::new(),
            auto_save: true,
        }
    }

    /// Create an in-memory state manager (no file persistence)
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            state: State::new(),
            auto_save: false,
        }
    }

    /// Create a state manager from a file, loading existing state if present
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut manager = Self::new(path);
        manager.load()?;
        Ok(manager)
    }

    /// Create a state manager from inline JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let state: State = serde_json::from_str(json)
            .map_err(|e| Error::state(format!("Failed to parse state JSON: {e}")))?;

        Ok(Self {
            state,
            ..Self::in_memory()
        })
    }

    /// Load state from file, keeping the current state if the file is absent
    pub fn load(&mut self) -> Result<()> {
        if self.is_in_memory() || !self.path.exists() {
            return Ok(());
        }

        let contents = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::state(format!("Failed to read state file: {e}")))?;

        // An empty file is treated as "no state yet"
        if contents.trim().is_empty() {
            return Ok(());
        }

        self.state = serde_json::from_str(&contents)
            .map_err(|e| Error::state(format!("Failed to parse state file: {e}")))?;
        Ok(())
    }

    /// Save current state to file
    pub fn save(&self) -> Result<()> {
        if self.is_in_memory() {
            return Ok(());
        }
        self.save_to_file(&self.path)
    }

    /// Save state to a specific file path
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = serde_json::to_string_pretty(&self.state)
            .map_err(|e| Error::state(format!("Failed to serialize state: {e}")))?;

        // Write to temp file first, then rename for atomicity
        let path = path.as_ref();
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, &contents)
            .map_err(|e| Error::state(format!("Failed to write state file: {e}")))?;
        std::fs::rename(&temp_path, path)
            .map_err(|e| Error::state(format!("Failed to rename state file: {e}")))?;

        Ok(())
    }

    /// Current state
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Serialize current state to JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.state)
            .map_err(|e| Error::state(format!("Failed to serialize state: {e}")))
    }

    /// Stored bookmark of a stream, decoded
    pub fn bookmark(&self, stream: &str, field: &str) -> Option<DateTime<Utc>> {
        self.state.bookmark_datetime(stream, field)
    }

    /// Move a bookmark forward.
    ///
    /// Returns `Ok(false)` without touching anything when `value` is not
    /// strictly newer than the stored bookmark, so the stored value never
    /// decreases. Accepted advances are persisted immediately when auto-save
    /// is on.
    pub fn advance(
        &mut self,
        stream: &str,
        field: &str,
        value: DateTime<Utc>,
        method: ReplicationMethod,
    ) -> Result<bool> {
        if let Some(current) = self.bookmark(stream, field) {
            if value <= current {
                debug!(stream, field, %value, %current, "Bookmark not advanced");
                return Ok(false);
            }
        }

        self.state.set_bookmark(stream, field, value, method);
        debug!(stream, field, %value, "Bookmark advanced");

        if self.auto_save {
            self.save()
                .map_err(|e| Error::checkpoint(format!("{stream}.{field}: {e}")))?;
        }
        Ok(true)
    }

    /// Get the state file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if this is an in-memory state manager
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str().is_empty()
    }
}
