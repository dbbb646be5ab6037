//! Execution engine module
//!
//! Main read loop and stream orchestration.
//!
//! # Overview
//!
//! The engine module provides:
//! - `SyncEngine` - runs the selected streams in order against one account
//! - `BookmarkGuard` - emits records and advances bookmarks behind them
//! - `MessageSink` - where records and checkpoints go
//! - `RunReport` / `ExitStatus` - how the run ended
//!
//! Each stream goes through the same steps: compute its window from the
//! stored bookmark, sync its property schema if it has one, open its
//! record source, then emit every record while the guard advances the
//! bookmark. Sources that are not ordered by replication value only
//! checkpoint once exhausted. Failures are classified per stream: rejected credentials end
//! the run, a missing scope skips the stream, and anything else follows the
//! configured [`FailurePolicy`].

mod checkpoint;
mod sink;
mod types;

pub use checkpoint::BookmarkGuard;
pub use sink::{JsonLinesSink, MemorySink, MessageSink, StdoutSink};
pub use types::{ExitStatus, Message, RunReport, StreamOutcome, StreamReport, SyncStats};

use crate::config::HubConfig;
use crate::error::{Error, FailureKind, Result};
use crate::http::HttpClient;
use crate::state::{SharedState, StateManager};
use crate::streams::{
    property_pager, RecordSource, StreamContext, StreamDescriptor, StreamHandler, StreamRegistry,
};
use crate::types::{string_at_path, ExtractionWindow, FailurePolicy};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Sync engine for orchestrating data extraction
pub struct SyncEngine {
    /// Authenticated client shared by every stream
    client: Arc<HttpClient>,
    /// Run configuration
    config: HubConfig,
    /// Streams in sync order
    registry: StreamRegistry,
    /// Checkpoint document
    state: StateManager,
    /// Observations handed from earlier streams to later ones
    shared: SharedState,
    /// Statistics
    stats: SyncStats,
}

impl SyncEngine {
    /// Create an engine for `config`, resuming from `state`
    pub fn new(config: HubConfig, state: StateManager) -> Result<Self> {
        config.validate()?;
        let client = HttpClient::with_auth(config.http_config(), config.auth_config());
        Ok(Self::with_client(config, client, state))
    }

    /// Create an engine around an already configured client
    pub fn with_client(config: HubConfig, client: HttpClient, state: StateManager) -> Self {
        let registry = StreamRegistry::standard(&config);
        Self {
            client: Arc::new(client),
            config,
            registry,
            state,
            shared: SharedState::new(),
            stats: SyncStats::new(),
        }
    }

    /// Replace the stream registry
    #[must_use]
    pub fn with_registry(mut self, registry: StreamRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Get the state manager
    pub fn state(&self) -> &StateManager {
        &self.state
    }

    /// Cross-stream observations of this run
    pub fn shared(&self) -> &SharedState {
        &self.shared
    }

    /// Registered streams
    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    /// Get statistics
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Shared HTTP client
    pub fn client(&self) -> &Arc<HttpClient> {
        &self.client
    }

    /// Window a stream extracts in this run.
    ///
    /// Starts at the stored bookmark rewound by the stream's lookback, or at
    /// the configured start date when there is no bookmark. Ends now.
    pub fn window_for(&self, descriptor: &StreamDescriptor) -> Result<ExtractionWindow> {
        let end = Utc::now();
        let stored = descriptor
            .bookmark_field
            .as_deref()
            .and_then(|field| self.state.bookmark(&descriptor.name, field));

        let start = match stored {
            Some(bookmark) => {
                debug!(stream = %descriptor.name, %bookmark, "Resuming from stored bookmark");
                bookmark - descriptor.lookback
            }
            None => self.config.start_datetime()?,
        };
        Ok(ExtractionWindow::new(start, end))
    }

    /// Run every selected stream in order
    pub async fn run(&mut self, sink: &mut dyn MessageSink) -> Result<RunReport> {
        let started = Instant::now();
        let handlers = self.registry.select(&self.config.streams)?;
        let mut report = RunReport::default();

        info!(streams = handlers.len(), "Starting sync");

        for handler in handlers {
            let name = handler.descriptor().name.clone();
            let mut emitted = 0;
            let synced = self.sync_stream(handler.as_ref(), sink, &mut emitted).await;
            self.stats.add_records(emitted);
            match synced {
                Ok(stream_report) => report.streams.push(stream_report),
                Err(e) => {
                    self.stats.add_error();
                    let outcome = self.classify(&name, &e);
                    let abort = matches!(outcome, StreamOutcome::Aborted { .. });
                    report
                        .streams
                        .push(StreamReport::failed(&name, outcome, emitted));
                    if abort {
                        break;
                    }
                }
            }
        }

        sink.flush()?;
        self.stats.set_duration(started.elapsed().as_millis() as u64);
        report.stats = self.stats.clone();

        info!(
            records = self.stats.records_synced,
            streams = self.stats.streams_synced,
            skipped = self.stats.streams_skipped,
            duration_ms = self.stats.duration_ms,
            "Sync finished"
        );
        Ok(report)
    }

    /// Decide what a stream failure means for the rest of the run
    fn classify(&mut self, stream: &str, e: &Error) -> StreamOutcome {
        let kind = e.failure_kind();
        let reason = e.to_string();
        match (kind, self.config.on_stream_error) {
            (FailureKind::InvalidCredentials, _) => {
                error!(stream, error = %e, "Credentials rejected, aborting run");
                StreamOutcome::Aborted { kind, reason }
            }
            (FailureKind::MissingScope, _) | (FailureKind::Other, FailurePolicy::Skip) => {
                warn!(stream, error = %e, "Skipping stream");
                self.stats.add_skip();
                StreamOutcome::Skipped { kind, reason }
            }
            (FailureKind::Other, FailurePolicy::Abort) => {
                error!(stream, error = %e, "Stream failed, aborting run");
                StreamOutcome::Aborted { kind, reason }
            }
        }
    }

    /// Extract one stream to exhaustion.
    ///
    /// `emitted` counts the stream's records as they go out, so it stays
    /// accurate when extraction fails part way.
    async fn sync_stream(
        &mut self,
        handler: &dyn StreamHandler,
        sink: &mut dyn MessageSink,
        emitted: &mut usize,
    ) -> Result<StreamReport> {
        let started = Instant::now();
        let descriptor = handler.descriptor();
        let window = self.window_for(descriptor)?;
        info!(
            stream = %descriptor.name,
            start = %window.start,
            end = %window.end,
            "Syncing stream"
        );

        let properties = match &descriptor.properties_object {
            Some(object) => self.sync_properties(descriptor, object, sink).await?,
            None => Vec::new(),
        };

        let ctx = StreamContext::new(Arc::clone(&self.client), window, self.config.page_size)
            .with_properties(properties);
        let mut source = handler.open(&ctx, &mut self.shared).await?;

        let mut guard = BookmarkGuard::new(
            &descriptor.name,
            descriptor.bookmark_field.as_deref(),
            descriptor.replication_method,
            &mut self.state,
            sink,
        );
        if !source.ordered() {
            debug!(stream = %descriptor.name, "Unordered source, bookmark held until exhausted");
            guard = guard.deferred();
        }

        let drained = drain(source.as_mut(), handler, &mut self.shared, &mut guard).await;
        *emitted = guard.records();
        drained?;

        if let Some(bookmark) = handler.final_bookmark(&self.shared) {
            guard.confirm(bookmark);
        }

        let records = guard.records();
        let checkpoints = guard.checkpoints();
        let bookmark = guard.finish()?;

        self.stats.add_checkpoints(checkpoints);
        self.stats.add_stream();

        info!(
            stream = %descriptor.name,
            records,
            bookmark = ?bookmark,
            duration_ms = started.elapsed().as_millis() as u64,
            "Stream complete"
        );
        Ok(StreamReport::completed(&descriptor.name, records, bookmark))
    }

    /// Emit the property schema of `object` and return the property names
    async fn sync_properties(
        &mut self,
        descriptor: &StreamDescriptor,
        object: &str,
        sink: &mut dyn MessageSink,
    ) -> Result<Vec<String>> {
        let stream = descriptor
            .properties_stream()
            .unwrap_or_else(|| format!("{object}_properties"));
        let mut pager = property_pager(Arc::clone(&self.client), object);
        let mut names = Vec::new();

        while let Some(property) = pager.next_item().await? {
            if let Some(name) = string_at_path(&property, &["name"]) {
                names.push(name);
            }
            sink.emit(Message::record(&stream, property))?;
            self.stats.add_records(1);
        }

        debug!(stream = %stream, properties = names.len(), "Property schema synced");
        Ok(names)
    }
}

/// Emit every record of `source` through `guard`
async fn drain(
    source: &mut dyn RecordSource,
    handler: &dyn StreamHandler,
    shared: &mut SharedState,
    guard: &mut BookmarkGuard<'_>,
) -> Result<()> {
    while let Some(record) = source.next_record().await? {
        handler.observe(&record, shared);
        let paired = handler.source_record(record);
        guard.emit(paired.record, paired.replication_value)?;
    }
    Ok(())
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("registry", &self.registry)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
