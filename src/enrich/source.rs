//! Search results enriched chunk by chunk

use super::batch::BatchEnricher;
use crate::error::Result;
use crate::search::WindowedSearch;
use serde_json::Value;
use std::collections::VecDeque;

/// Pulls up to one chunk of search results at a time, enriches the chunk,
/// and then hands the records out in their original order.
#[derive(Debug)]
pub struct EnrichedSearch {
    search: WindowedSearch,
    enricher: BatchEnricher,
    ready: VecDeque<Value>,
    chunks: u64,
}

impl EnrichedSearch {
    /// Wrap a search with an enricher
    pub fn new(search: WindowedSearch, enricher: BatchEnricher) -> Self {
        Self {
            search,
            enricher,
            ready: VecDeque::new(),
            chunks: 0,
        }
    }

    /// The underlying search
    pub fn search(&self) -> &WindowedSearch {
        &self.search
    }

    /// Chunks enriched so far
    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    /// Next enriched record, or `None` once the search is drained
    pub async fn next_item(&mut self) -> Result<Option<Value>> {
        if self.ready.is_empty() {
            let chunk_size = self.enricher.plan().chunk_size;
            let mut chunk = Vec::with_capacity(chunk_size);
            while chunk.len() < chunk_size {
                match self.search.next_item().await? {
                    Some(record) => chunk.push(record),
                    None => break,
                }
            }
            if chunk.is_empty() {
                return Ok(None);
            }

            self.enricher.enrich(&mut chunk).await?;
            self.chunks += 1;
            self.ready.extend(chunk);
        }

        Ok(self.ready.pop_front())
    }
}
