//! Windowed search engine
//!
//! Turns an `(object type, [start, end))` request into as many bounded search
//! queries as it takes to cover the window, paging past the upstream result
//! ceiling on a tiebreak key.

mod engine;
mod types;

pub use engine::{WindowedSearch, MAX_ORIGIN_ERROR_RESUBMITS, ORIGIN_ERROR_STATUS};
pub use types::{
    Filter, FilterGroup, FilterOperator, SearchQuery, SearchRequest, SearchResponse, SearchStats,
    Sort, SortDirection, DEFAULT_TIEBREAK_FIELD, SEARCH_PAGE_SIZE, SEARCH_RESULT_CEILING,
};
