//! Windowed search over one object type
//!
//! A search query can only be paged through its first 10,000 results. To
//! cover windows holding more, results are sorted by a strictly increasing
//! tiebreak key; when the next cursor would cross the ceiling the query is
//! re-issued with `after = 0` and a floor on the tiebreak key equal to the
//! last key served. The floor is inclusive, so the boundary record comes back
//! once more and is dropped here.

use super::types::{SearchQuery, SearchResponse, SearchStats, SEARCH_RESULT_CEILING};
use crate::error::{Error, Result};
use crate::http::{HttpClient, RequestConfig};
use crate::types::string_at_path;
use reqwest::Method;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Status the search endpoints return for transient origin failures
pub const ORIGIN_ERROR_STATUS: u16 = 520;

/// Consecutive origin errors tolerated for one request
pub const MAX_ORIGIN_ERROR_RESUBMITS: u32 = 25;

/// Lazy sequence of search results covering a whole window
#[derive(Debug)]
pub struct WindowedSearch {
    client: Arc<HttpClient>,
    query: SearchQuery,
    after: u64,
    tiebreak_floor: u64,
    last_emitted: Option<u64>,
    buffer: VecDeque<Value>,
    done: bool,
    stats: SearchStats,
}

impl WindowedSearch {
    /// Create a search; nothing is requested until the first pull
    pub fn new(client: Arc<HttpClient>, query: SearchQuery) -> Self {
        Self {
            client,
            query,
            after: 0,
            tiebreak_floor: 0,
            last_emitted: None,
            buffer: VecDeque::new(),
            done: false,
            stats: SearchStats::default(),
        }
    }

    /// The query being drained
    pub fn query(&self) -> &SearchQuery {
        &self.query
    }

    /// Counters so far
    pub fn stats(&self) -> SearchStats {
        self.stats
    }

    /// Tiebreak key of a result record
    pub fn tiebreak_of(&self, record: &Value) -> Option<u64> {
        string_at_path(record, &["properties", &self.query.tiebreak_field])
            .or_else(|| string_at_path(record, &["id"]))
            .and_then(|s| s.parse().ok())
    }

    /// Next record in tiebreak order, or `None` once the window is covered
    pub async fn next_item(&mut self) -> Result<Option<Value>> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                self.stats.emitted += 1;
                return Ok(Some(record));
            }
            match self.next_page().await? {
                Some(page) => self.buffer.extend(page),
                None => return Ok(None),
            }
        }
    }

    /// Next page of not-yet-served records, or `None` once the window is covered.
    ///
    /// A page made only of the re-served boundary record comes back empty
    /// rather than `None`.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Value>>> {
        if self.done {
            return Ok(None);
        }

        let body = self.submit().await?;
        let response: SearchResponse = serde_json::from_value(body).map_err(|e| {
            Error::decode(format!("Unexpected search response shape: {e}"))
        })?;
        self.stats.requests += 1;

        let Some(last) = response.results.last() else {
            debug!(
                object = %self.query.object_type,
                requests = self.stats.requests,
                "Search window drained"
            );
            self.done = true;
            return Ok(None);
        };
        let last_key = self.tiebreak_of(last);

        match response.next_after() {
            None => self.done = true,
            Some(next) if next >= SEARCH_RESULT_CEILING => self.reset_at(last_key)?,
            Some(next) => self.after = next,
        }

        let mut page = Vec::with_capacity(response.results.len());
        for record in response.results {
            let key = self.tiebreak_of(&record);
            if let (Some(key), Some(seen)) = (key, self.last_emitted) {
                if key <= seen {
                    self.stats.duplicates_skipped += 1;
                    continue;
                }
            }
            if key.is_some() {
                self.last_emitted = key;
            }
            page.push(record);
        }

        Ok(Some(page))
    }

    /// Start a fresh query above the last key served
    fn reset_at(&mut self, last_key: Option<u64>) -> Result<()> {
        let Some(floor) = last_key else {
            return Err(Error::decode(format!(
                "Search result lacks '{}'; cannot page past {SEARCH_RESULT_CEILING} results",
                self.query.tiebreak_field
            )));
        };
        if floor <= self.tiebreak_floor && self.stats.resets > 0 {
            return Err(Error::decode(format!(
                "Search on '{}' made no progress past {} = {floor}",
                self.query.object_type, self.query.tiebreak_field
            )));
        }

        info!(
            object = %self.query.object_type,
            floor,
            "Search result ceiling reached, restarting above last key"
        );
        self.after = 0;
        self.tiebreak_floor = floor;
        self.stats.resets += 1;
        Ok(())
    }

    /// POST the current request, resubmitting it verbatim on origin errors
    async fn submit(&mut self) -> Result<Value> {
        let path = self.query.path();
        let body = serde_json::to_value(self.query.request(self.tiebreak_floor, self.after))?;
        let mut resubmits = 0;

        loop {
            let config = RequestConfig::new()
                .json(body.clone())
                .passthrough(ORIGIN_ERROR_STATUS);

            match self.client.execute(Method::POST, &path, config).await {
                Err(e)
                    if e.status() == Some(ORIGIN_ERROR_STATUS)
                        && resubmits < MAX_ORIGIN_ERROR_RESUBMITS =>
                {
                    resubmits += 1;
                    self.stats.resubmits += 1;
                    warn!(object = %self.query.object_type, resubmits, "Origin error from search, resubmitting");
                }
                other => return other,
            }
        }
    }
}
