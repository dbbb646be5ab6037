//! State types
//!
//! The checkpoint document persisted between runs:
//!
//! ```json
//! {"bookmarks": {"deals": {"hs_lastmodifieddate": "2023-01-03T00:00:00.000000+00:00",
//!                          "replication_method": "INCREMENTAL"}}}
//! ```

use crate::types::{format_bookmark, parse_timestamp, ReplicationMethod};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Checkpoint state for every stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Per-stream bookmarks
    #[serde(default)]
    pub bookmarks: BTreeMap<String, StreamBookmark>,
}

impl State {
    /// Create empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Bookmarks of one stream
    pub fn stream(&self, stream: &str) -> Option<&StreamBookmark> {
        self.bookmarks.get(stream)
    }

    /// Raw bookmark value
    pub fn bookmark(&self, stream: &str, field: &str) -> Option<&str> {
        self.stream(stream)?.get(field)
    }

    /// Bookmark value decoded as a timestamp
    pub fn bookmark_datetime(&self, stream: &str, field: &str) -> Option<DateTime<Utc>> {
        self.bookmark(stream, field)
            .and_then(|raw| parse_timestamp(raw).ok())
    }

    /// Overwrite a bookmark, no ordering checks
    pub fn set_bookmark(
        &mut self,
        stream: &str,
        field: &str,
        value: DateTime<Utc>,
        method: ReplicationMethod,
    ) {
        let entry = self.bookmarks.entry(stream.to_string()).or_default();
        entry.replication_method = Some(method);
        entry
            .values
            .insert(field.to_string(), Value::String(format_bookmark(value)));
    }
}

/// Bookmarks of a single stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamBookmark {
    /// How the stream is replicated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication_method: Option<ReplicationMethod>,
    /// Bookmark field name to value
    #[serde(flatten)]
    pub values: BTreeMap<String, Value>,
}

impl StreamBookmark {
    /// Bookmark value as a string
    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).and_then(Value::as_str)
    }
}
