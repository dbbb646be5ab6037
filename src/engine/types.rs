//! Engine types
//!
//! Output messages, run statistics and the per-stream outcomes the exit
//! status is derived from.

use crate::error::FailureKind;
use crate::state::State;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// A message emitted during sync
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// One extracted record
    Record {
        /// Stream name
        stream: String,
        /// Upstream-shaped document
        record: Value,
        /// When the record was extracted
        time_extracted: DateTime<Utc>,
    },
    /// Checkpoint document after a confirmed advance
    State {
        /// Full checkpoint document
        value: State,
    },
}

impl Message {
    /// Create a record message stamped now
    pub fn record(stream: impl Into<String>, record: Value) -> Self {
        Self::Record {
            stream: stream.into(),
            record,
            time_extracted: Utc::now(),
        }
    }

    /// Create a state message
    pub fn state(value: State) -> Self {
        Self::State { value }
    }

    /// Check if this is a record message
    pub fn is_record(&self) -> bool {
        matches!(self, Self::Record { .. })
    }

    /// Check if this is a state message
    pub fn is_state(&self) -> bool {
        matches!(self, Self::State { .. })
    }

    /// Stream of a record message
    pub fn stream(&self) -> Option<&str> {
        match self {
            Self::Record { stream, .. } => Some(stream),
            Self::State { .. } => None,
        }
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Statistics from a sync run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Records emitted, property-schema records included
    pub records_synced: usize,
    /// Streams that completed
    pub streams_synced: usize,
    /// Streams skipped after a recoverable failure
    pub streams_skipped: usize,
    /// Checkpoints written
    pub checkpoints: usize,
    /// Failures encountered
    pub errors: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl SyncStats {
    /// Create new stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Add records
    pub fn add_records(&mut self, count: usize) {
        self.records_synced += count;
    }

    /// Add a completed stream
    pub fn add_stream(&mut self) {
        self.streams_synced += 1;
    }

    /// Add a skipped stream
    pub fn add_skip(&mut self) {
        self.streams_skipped += 1;
    }

    /// Add checkpoints
    pub fn add_checkpoints(&mut self, count: usize) {
        self.checkpoints += count;
    }

    /// Add an error
    pub fn add_error(&mut self) {
        self.errors += 1;
    }

    /// Set duration
    pub fn set_duration(&mut self, ms: u64) {
        self.duration_ms = ms;
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// How one stream ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Extracted to exhaustion
    Completed,
    /// Failed recoverably; the run moved on
    Skipped {
        /// Classification of the failure
        kind: FailureKind,
        /// Error message
        reason: String,
    },
    /// Failed and ended the run
    Aborted {
        /// Classification of the failure
        kind: FailureKind,
        /// Error message
        reason: String,
    },
}

/// Result of syncing one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamReport {
    /// Stream name
    pub stream: String,
    /// How it ended
    pub outcome: StreamOutcome,
    /// Records emitted on the stream itself
    pub records: usize,
    /// Bookmark stored once the stream ended
    pub bookmark: Option<DateTime<Utc>>,
}

impl StreamReport {
    /// Report for a completed stream
    pub fn completed(
        stream: impl Into<String>,
        records: usize,
        bookmark: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            stream: stream.into(),
            outcome: StreamOutcome::Completed,
            records,
            bookmark,
        }
    }

    /// Report for a failed stream that emitted `records` before failing
    pub fn failed(stream: impl Into<String>, outcome: StreamOutcome, records: usize) -> Self {
        Self {
            stream: stream.into(),
            outcome,
            records,
            bookmark: None,
        }
    }

    /// Whether the stream completed
    pub fn is_completed(&self) -> bool {
        self.outcome == StreamOutcome::Completed
    }
}

/// Process exit status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Every selected stream completed
    Success,
    /// The run aborted on an unclassified failure
    Fatal,
    /// The run finished but skipped at least one stream
    PartialSuccess,
    /// The run aborted because the credentials were rejected
    InvalidCredentials,
}

impl ExitStatus {
    /// Numeric process exit code
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Fatal => 1,
            Self::PartialSuccess => 2,
            Self::InvalidCredentials => 3,
        }
    }
}

impl From<ExitStatus> for std::process::ExitCode {
    fn from(status: ExitStatus) -> Self {
        Self::from(status.code())
    }
}

/// Summary of a whole run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// One report per attempted stream, in sync order
    pub streams: Vec<StreamReport>,
    /// Aggregate statistics
    pub stats: SyncStats,
}

impl RunReport {
    /// Report of the stream that aborted the run, if any
    pub fn aborted(&self) -> Option<&StreamReport> {
        self.streams
            .iter()
            .find(|r| matches!(r.outcome, StreamOutcome::Aborted { .. }))
    }

    /// Streams that were skipped
    pub fn skipped(&self) -> impl Iterator<Item = &StreamReport> {
        self.streams
            .iter()
            .filter(|r| matches!(r.outcome, StreamOutcome::Skipped { .. }))
    }

    /// Exit status the run maps to
    pub fn exit_status(&self) -> ExitStatus {
        match self.aborted().map(|r| &r.outcome) {
            Some(StreamOutcome::Aborted {
                kind: FailureKind::InvalidCredentials,
                ..
            }) => ExitStatus::InvalidCredentials,
            Some(_) => ExitStatus::Fatal,
            None if self.skipped().next().is_some() => ExitStatus::PartialSuccess,
            None => ExitStatus::Success,
        }
    }
}
