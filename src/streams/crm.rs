//! Listing- and search-backed streams over the CRM endpoints

use super::types::{RecordSource, StreamContext, StreamDescriptor, StreamHandler};
use crate::enrich::{BatchEnricher, EnrichedSearch, EnrichmentPlan};
use crate::error::Result;
use crate::http::HttpClient;
use crate::pagination::Pager;
use crate::search::{SearchQuery, WindowedSearch};
use crate::state::SharedState;
use crate::types::{string_at_path, QueryParams};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Hook run on every record of a stream
pub type Observer = fn(&Value, &mut SharedState);

/// Pager over the property schema of `object`
pub fn property_pager(client: Arc<HttpClient>, object: &str) -> Pager {
    Pager::new(client, format!("/crm/v3/properties/{object}"))
        .data_field("results")
        .offset_param("after")
}

/// Names of every property defined on `object`
pub async fn fetch_property_names(client: Arc<HttpClient>, object: &str) -> Result<Vec<String>> {
    let properties = property_pager(client, object).collect_all().await?;
    Ok(properties
        .iter()
        .filter_map(|p| string_at_path(p, &["name"]))
        .collect())
}

// ============================================================================
// Listing Streams
// ============================================================================

/// How a listing sets its `limit` parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLimit {
    /// No limit parameter
    None,
    /// A fixed limit
    Fixed(u32),
    /// The configured page size
    Configured,
}

/// A stream read from one paginated GET endpoint
#[derive(Debug, Clone)]
pub struct ListingStream {
    descriptor: StreamDescriptor,
    path: String,
    data_field: Option<String>,
    offset_param: Option<String>,
    query: QueryParams,
    limit: PageLimit,
    window_params: Option<(String, String)>,
    observer: Option<Observer>,
}

impl ListingStream {
    /// Create a listing over `path`
    pub fn new(descriptor: StreamDescriptor, path: impl Into<String>) -> Self {
        Self {
            descriptor,
            path: path.into(),
            data_field: None,
            offset_param: None,
            query: QueryParams::new(),
            limit: PageLimit::None,
            window_params: None,
            observer: None,
        }
    }

    /// Envelope field holding the items and the continuation parameter
    #[must_use]
    pub fn paged(mut self, data_field: &str, offset_param: &str) -> Self {
        self.data_field = Some(data_field.to_string());
        self.offset_param = Some(offset_param.to_string());
        self
    }

    /// Fixed query parameter
    #[must_use]
    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.insert(key.to_string(), value.to_string());
        self
    }

    /// Page size parameter
    #[must_use]
    pub fn limit(mut self, limit: PageLimit) -> Self {
        self.limit = limit;
        self
    }

    /// Send the window bounds as epoch milliseconds
    #[must_use]
    pub fn windowed(mut self, start_param: &str, end_param: &str) -> Self {
        self.window_params = Some((start_param.to_string(), end_param.to_string()));
        self
    }

    /// Run `observer` on every record
    #[must_use]
    pub fn observe_with(mut self, observer: Observer) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Endpoint path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The pager this listing would start for `ctx`
    pub fn pager(&self, ctx: &StreamContext) -> Pager {
        let mut query = self.query.clone();
        match self.limit {
            PageLimit::None => {}
            PageLimit::Fixed(n) => {
                query.insert("limit".to_string(), n.to_string());
            }
            PageLimit::Configured => {
                query.insert("limit".to_string(), ctx.page_size.to_string());
            }
        }
        if let Some((start, end)) = &self.window_params {
            query.insert(start.clone(), ctx.window.start_ms().to_string());
            query.insert(end.clone(), ctx.window.end_ms().to_string());
        }

        let mut pager = Pager::new(Arc::clone(&ctx.client), &self.path).with_query(query);
        if let Some(field) = &self.data_field {
            pager = pager.data_field(field);
        }
        if let Some(param) = &self.offset_param {
            pager = pager.offset_param(param);
        }
        pager
    }
}

#[async_trait]
impl StreamHandler for ListingStream {
    fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    async fn open(
        &self,
        ctx: &StreamContext,
        _shared: &mut SharedState,
    ) -> Result<Box<dyn RecordSource>> {
        debug!(stream = %self.descriptor.name, path = %self.path, "Opening listing");
        Ok(Box::new(self.pager(ctx)))
    }

    fn observe(&self, record: &Value, shared: &mut SharedState) {
        if let Some(observer) = self.observer {
            observer(record, shared);
        }
    }
}

/// Queue the form a listed record describes for submission extraction
pub fn mark_form_guid(record: &Value, shared: &mut SharedState) {
    if let Some(guid) = string_at_path(record, &["guid"]) {
        shared.mark_submission_form(guid);
    }
}

// ============================================================================
// Search Streams
// ============================================================================

/// A stream read through the windowed search engine
#[derive(Debug, Clone)]
pub struct SearchStream {
    descriptor: StreamDescriptor,
    object_type: String,
    filter_field: String,
    enrichment: Option<EnrichmentPlan>,
    records_window: bool,
    observer: Option<Observer>,
}

impl SearchStream {
    /// Search `object_type` on `filter_field`
    pub fn new(
        descriptor: StreamDescriptor,
        object_type: impl Into<String>,
        filter_field: impl Into<String>,
    ) -> Self {
        Self {
            descriptor,
            object_type: object_type.into(),
            filter_field: filter_field.into(),
            enrichment: None,
            records_window: false,
            observer: None,
        }
    }

    /// Enrich results chunk by chunk
    #[must_use]
    pub fn enriched(mut self, plan: EnrichmentPlan) -> Self {
        self.enrichment = Some(plan);
        self
    }

    /// Publish this stream's window for dependent streams
    #[must_use]
    pub fn records_window(mut self) -> Self {
        self.records_window = true;
        self
    }

    /// Run `observer` on every record
    #[must_use]
    pub fn observe_with(mut self, observer: Observer) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Object type searched
    pub fn object_type(&self) -> &str {
        &self.object_type
    }
}

#[async_trait]
impl StreamHandler for SearchStream {
    fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    async fn open(
        &self,
        ctx: &StreamContext,
        shared: &mut SharedState,
    ) -> Result<Box<dyn RecordSource>> {
        let properties = if ctx.properties.is_empty() {
            fetch_property_names(Arc::clone(&ctx.client), &self.object_type).await?
        } else {
            ctx.properties.clone()
        };

        if self.records_window {
            shared.set_activity_window(ctx.window);
        }

        let query = SearchQuery::new(&self.object_type, &self.filter_field, ctx.window)
            .with_properties(properties)
            .with_page_size(ctx.page_size);
        let search = WindowedSearch::new(Arc::clone(&ctx.client), query);

        let source: Box<dyn RecordSource> = match &self.enrichment {
            Some(plan) => Box::new(EnrichedSearch::new(
                search,
                BatchEnricher::new(Arc::clone(&ctx.client), plan.clone()),
            )),
            None => Box::new(search),
        };
        Ok(source)
    }

    fn observe(&self, record: &Value, shared: &mut SharedState) {
        if let Some(observer) = self.observer {
            observer(record, shared);
        }
    }
}
