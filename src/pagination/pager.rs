//! Lazy page iteration over one listing endpoint

use super::types::{NextPage, PaginationState, PagingIdiom};
use crate::error::Result;
use crate::http::HttpClient;
use crate::types::QueryParams;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

/// Pulls items from a paginated GET endpoint one page at a time.
///
/// Nothing is requested until the first call to [`Pager::next_page`] or
/// [`Pager::next_item`], and each later request is only issued once the
/// previous page has been drained.
#[derive(Debug)]
pub struct Pager {
    client: Arc<HttpClient>,
    path: String,
    query: QueryParams,
    data_field: Option<String>,
    offset_param: Option<String>,
    state: PaginationState,
    buffer: VecDeque<Value>,
}

impl Pager {
    /// Create a pager for `path`
    pub fn new(client: Arc<HttpClient>, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
            query: QueryParams::new(),
            data_field: None,
            offset_param: None,
            state: PaginationState::new(),
            buffer: VecDeque::new(),
        }
    }

    /// Add a query parameter sent with every page
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.insert(key.into(), value.to_string());
        self
    }

    /// Replace the base query parameters
    #[must_use]
    pub fn with_query(mut self, query: QueryParams) -> Self {
        self.query = query;
        self
    }

    /// Field of the envelope holding the item array
    #[must_use]
    pub fn data_field(mut self, field: impl Into<String>) -> Self {
        self.data_field = Some(field.into());
        self
    }

    /// Query parameter (and flat envelope key) carrying the continuation
    #[must_use]
    pub fn offset_param(mut self, param: impl Into<String>) -> Self {
        self.offset_param = Some(param.into());
        self
    }

    /// Current pagination state
    pub fn state(&self) -> &PaginationState {
        &self.state
    }

    /// Fetch the next page of items, or `None` once exhausted
    pub async fn next_page(&mut self) -> Result<Option<Vec<Value>>> {
        if self.state.done {
            return Ok(None);
        }

        let mut query = self.query.clone();
        if let (Some(param), Some(cursor)) = (&self.offset_param, &self.state.cursor) {
            query.insert(param.clone(), cursor.clone());
        }

        let mut body = self.client.get_json(&self.path, query).await?;

        let Some(field) = self.data_field.as_deref() else {
            // Unwrapped list: the whole body is a single page
            self.state.mark_done();
            let items = match body {
                Value::Array(items) => items,
                Value::Null => Vec::new(),
                other => vec![other],
            };
            self.state.add_page(items.len());
            return Ok((!items.is_empty()).then_some(items));
        };

        let items = match body.get_mut(field).map(Value::take) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        self.state.add_page(items.len());

        if items.is_empty() {
            debug!(path = %self.path, pages = self.state.pages, "Empty page, pagination complete");
            self.state.mark_done();
            return Ok(None);
        }

        match &self.offset_param {
            Some(offset_key) => {
                let idiom = PagingIdiom::detect(&body);
                self.state.idiom = Some(idiom);
                match idiom.next_page(&body, offset_key) {
                    NextPage::Continue(cursor) if self.state.cursor.as_ref() == Some(&cursor) => {
                        warn!(path = %self.path, %cursor, "Upstream repeated a cursor, stopping");
                        self.state.mark_done();
                    }
                    NextPage::Continue(cursor) => self.state.set_cursor(cursor),
                    NextPage::Done => self.state.mark_done(),
                }
            }
            None => self.state.mark_done(),
        }

        Ok(Some(items))
    }

    /// Next item across page boundaries, or `None` once exhausted
    pub async fn next_item(&mut self) -> Result<Option<Value>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }
            match self.next_page().await? {
                Some(page) => self.buffer.extend(page),
                None => return Ok(None),
            }
        }
    }

    /// Drain every remaining item
    pub async fn collect_all(mut self) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        while let Some(item) = self.next_item().await? {
            items.push(item);
        }
        Ok(items)
    }
}
