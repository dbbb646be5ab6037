//! Pending-bookmark guard
//!
//! A stream's newest replication value is not safe to checkpoint while
//! records sharing it may still follow. The guard holds that value as
//! pending and only persists it once a strictly newer value confirms it,
//! or when the guard is released. Release happens on [`BookmarkGuard::finish`]
//! or, on every other exit path, on drop.
//!
//! A deferred guard serves sources that are not ordered by replication
//! value. It tracks the maximum and persists it on `finish` only; dropping
//! it early leaves the stored bookmark as it was.

use super::sink::MessageSink;
use super::types::Message;
use crate::error::Result;
use crate::state::StateManager;
use crate::types::ReplicationMethod;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, error, warn};

/// Emits a stream's records and advances its bookmark behind them
pub struct BookmarkGuard<'a> {
    stream: String,
    field: Option<String>,
    method: ReplicationMethod,
    state: &'a mut StateManager,
    sink: &'a mut dyn MessageSink,
    pending: Option<DateTime<Utc>>,
    records: usize,
    checkpoints: usize,
    deferred: bool,
    released: bool,
}

impl<'a> BookmarkGuard<'a> {
    /// Guard the bookmark `field` of `stream`; `None` never checkpoints
    pub fn new(
        stream: impl Into<String>,
        field: Option<&str>,
        method: ReplicationMethod,
        state: &'a mut StateManager,
        sink: &'a mut dyn MessageSink,
    ) -> Self {
        Self {
            stream: stream.into(),
            field: field.filter(|f| !f.is_empty()).map(String::from),
            method,
            state,
            sink,
            pending: None,
            records: 0,
            checkpoints: 0,
            deferred: false,
            released: false,
        }
    }

    /// Hold every value until [`finish`](Self::finish)
    #[must_use]
    pub fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }

    /// Emit a record, then advance the bookmark if `value` confirms the
    /// pending one.
    ///
    /// Values older than or equal to the pending one are ignored. A deferred
    /// guard only raises the pending value.
    pub fn emit(&mut self, record: Value, value: Option<DateTime<Utc>>) -> Result<()> {
        self.sink.emit(Message::record(&self.stream, record))?;
        self.records += 1;

        let Some(value) = value else {
            return Ok(());
        };
        match self.pending {
            None => self.pending = Some(value),
            Some(pending) if value > pending => {
                if !self.deferred {
                    self.persist(pending)?;
                }
                self.pending = Some(value);
            }
            Some(_) => {}
        }
        Ok(())
    }

    /// Replace the pending value with one known to be complete
    pub fn confirm(&mut self, value: DateTime<Utc>) {
        debug!(stream = %self.stream, %value, "Bookmark confirmed by stream");
        self.pending = Some(value);
    }

    /// Value waiting for confirmation
    pub fn pending(&self) -> Option<DateTime<Utc>> {
        self.pending
    }

    /// Records emitted through this guard
    pub fn records(&self) -> usize {
        self.records
    }

    /// Checkpoints written through this guard
    pub fn checkpoints(&self) -> usize {
        self.checkpoints
    }

    /// Persist the pending value and return the stored bookmark
    pub fn finish(mut self) -> Result<Option<DateTime<Utc>>> {
        self.release()?;
        Ok(self
            .field
            .as_deref()
            .and_then(|field| self.state.bookmark(&self.stream, field)))
    }

    fn release(&mut self) -> Result<()> {
        self.released = true;
        match self.pending.take() {
            Some(value) => self.persist(value),
            None => Ok(()),
        }
    }

    /// Advance the stored bookmark and announce the new checkpoint
    fn persist(&mut self, value: DateTime<Utc>) -> Result<()> {
        let Some(field) = self.field.as_deref() else {
            return Ok(());
        };
        if self.state.advance(&self.stream, field, value, self.method)? {
            self.checkpoints += 1;
            self.sink.emit(Message::state(self.state.state().clone()))?;
        }
        Ok(())
    }
}

impl Drop for BookmarkGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if self.deferred {
            if let Some(pending) = self.pending {
                warn!(stream = %self.stream, %pending, "Stream ended early, stored bookmark kept");
            }
            return;
        }
        if let Err(e) = self.release() {
            error!(stream = %self.stream, error = %e, "Failed to flush pending bookmark");
        }
    }
}

impl std::fmt::Debug for BookmarkGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookmarkGuard")
            .field("stream", &self.stream)
            .field("field", &self.field)
            .field("pending", &self.pending)
            .field("deferred", &self.deferred)
            .field("records", &self.records)
            .finish()
    }
}
