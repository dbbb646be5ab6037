//! Stream descriptors and the handler traits

use crate::enrich::EnrichedSearch;
use crate::error::Result;
use crate::http::HttpClient;
use crate::pagination::Pager;
use crate::search::WindowedSearch;
use crate::state::SharedState;
use crate::types::{replication_value_at, ExtractionWindow, ReplicationMethod};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;

// ============================================================================
// Stream Descriptor
// ============================================================================

/// Identity of one extractable table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescriptor {
    /// Stream name, as emitted and as keyed in the checkpoint document
    pub name: String,
    /// Field the bookmark is stored under (`None` = never checkpointed)
    pub bookmark_field: Option<String>,
    /// Record path holding the replication value
    pub replication_path: Vec<String>,
    /// How the table is replicated downstream
    pub replication_method: ReplicationMethod,
    /// Object type whose property schema is synced before extraction
    pub properties_object: Option<String>,
    /// Owning portal of a custom object table
    pub portal_id: Option<u64>,
    /// Rewind applied to a stored bookmark when computing the window
    pub lookback: Duration,
    /// Only available with advanced features enabled
    pub advanced: bool,
}

impl StreamDescriptor {
    /// An incrementally replicated stream bookmarked on `bookmark_field`
    pub fn incremental(name: impl Into<String>, bookmark_field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bookmark_field: Some(bookmark_field.into()),
            replication_path: Vec::new(),
            replication_method: ReplicationMethod::Incremental,
            properties_object: None,
            portal_id: None,
            lookback: Duration::zero(),
            advanced: false,
        }
    }

    /// A stream re-extracted in full every run
    pub fn full_table(name: impl Into<String>) -> Self {
        Self {
            bookmark_field: None,
            replication_method: ReplicationMethod::FullTable,
            ..Self::incremental(name, "")
        }
    }

    /// Set the record path of the replication value
    #[must_use]
    pub fn replicated_on(mut self, path: &[&str]) -> Self {
        self.replication_path = path.iter().map(ToString::to_string).collect();
        self
    }

    /// Sync the property schema of `object` before extracting
    #[must_use]
    pub fn with_properties_sync(mut self, object: impl Into<String>) -> Self {
        self.properties_object = Some(object.into());
        self
    }

    /// Rewind stored bookmarks by `lookback`
    #[must_use]
    pub fn with_lookback(mut self, lookback: Duration) -> Self {
        self.lookback = lookback;
        self
    }

    /// Mark as a custom object table owned by `portal_id`
    #[must_use]
    pub fn custom_object(mut self, portal_id: u64) -> Self {
        self.portal_id = Some(portal_id);
        self
    }

    /// Mark as gated behind advanced features
    #[must_use]
    pub fn advanced(mut self) -> Self {
        self.advanced = true;
        self
    }

    /// Whether this is a custom object table
    pub fn is_custom_object(&self) -> bool {
        self.portal_id.is_some()
    }

    /// Name of the companion property-schema stream
    pub fn properties_stream(&self) -> Option<String> {
        self.properties_object
            .as_ref()
            .map(|_| format!("{}_properties", self.name))
    }

    /// Decode the replication value of a record
    pub fn replication_value(&self, record: &Value) -> Option<DateTime<Utc>> {
        let path: Vec<&str> = self.replication_path.iter().map(String::as_str).collect();
        replication_value_at(record, &path)
    }
}

// ============================================================================
// Record Sources
// ============================================================================

/// A record paired with its decoded replication value
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    /// Upstream-shaped document
    pub record: Value,
    /// Timestamp the bookmark advances on, if the record carries one
    pub replication_value: Option<DateTime<Utc>>,
}

/// Lazy, sequential sequence of raw records
#[async_trait]
pub trait RecordSource: Send {
    /// Next record, or `None` once exhausted
    async fn next_record(&mut self) -> Result<Option<Value>>;

    /// Whether records arrive in non-decreasing replication-value order.
    ///
    /// Unordered sources may still hold older records after a newer one, so
    /// their bookmark can only advance once they are exhausted.
    fn ordered(&self) -> bool {
        true
    }
}

#[async_trait]
impl RecordSource for Pager {
    async fn next_record(&mut self) -> Result<Option<Value>> {
        self.next_item().await
    }
}

#[async_trait]
impl RecordSource for WindowedSearch {
    async fn next_record(&mut self) -> Result<Option<Value>> {
        self.next_item().await
    }

    // Sorted by the tiebreak key
    fn ordered(&self) -> bool {
        false
    }
}

#[async_trait]
impl RecordSource for EnrichedSearch {
    async fn next_record(&mut self) -> Result<Option<Value>> {
        self.next_item().await
    }

    fn ordered(&self) -> bool {
        self.search().ordered()
    }
}

/// Records already in memory
#[async_trait]
impl RecordSource for VecDeque<Value> {
    async fn next_record(&mut self) -> Result<Option<Value>> {
        Ok(self.pop_front())
    }
}

// ============================================================================
// Stream Handlers
// ============================================================================

/// What a handler gets to open its source with
#[derive(Debug, Clone)]
pub struct StreamContext {
    /// Shared, authenticated client
    pub client: Arc<HttpClient>,
    /// Window computed for this stream
    pub window: ExtractionWindow,
    /// Page size for listing endpoints
    pub page_size: u32,
    /// Property names discovered by the schema sync, if one ran
    pub properties: Vec<String>,
}

impl StreamContext {
    /// Context without discovered properties
    pub fn new(client: Arc<HttpClient>, window: ExtractionWindow, page_size: u32) -> Self {
        Self {
            client,
            window,
            page_size,
            properties: Vec::new(),
        }
    }

    /// Attach discovered property names
    #[must_use]
    pub fn with_properties(mut self, properties: Vec<String>) -> Self {
        self.properties = properties;
        self
    }
}

/// One registered stream
#[async_trait]
pub trait StreamHandler: Send + Sync {
    /// Static identity of the stream
    fn descriptor(&self) -> &StreamDescriptor;

    /// Build the lazy record source for this run
    async fn open(
        &self,
        ctx: &StreamContext,
        shared: &mut SharedState,
    ) -> Result<Box<dyn RecordSource>>;

    /// Inspect each record before it is emitted
    fn observe(&self, _record: &Value, _shared: &mut SharedState) {}

    /// Bookmark to confirm once the source is exhausted, overriding the
    /// per-record values
    fn final_bookmark(&self, _shared: &SharedState) -> Option<DateTime<Utc>> {
        None
    }

    /// Pair a record with its replication value
    fn source_record(&self, record: Value) -> SourceRecord {
        let replication_value = self.descriptor().replication_value(&record);
        SourceRecord {
            record,
            replication_value,
        }
    }
}
