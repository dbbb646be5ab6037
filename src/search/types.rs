//! Search request and response bodies

use crate::types::ExtractionWindow;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Cumulative result count reachable through `after` for one query
pub const SEARCH_RESULT_CEILING: u64 = 10_000;

/// Largest page the search endpoints accept
pub const SEARCH_PAGE_SIZE: u32 = 100;

/// Stable numeric identifier present on every CRM object
pub const DEFAULT_TIEBREAK_FIELD: &str = "hs_object_id";

/// What to search for
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Object type id (`contacts`, `deals`, `p123_pets`, ...)
    pub object_type: String,
    /// Timestamp property the window applies to
    pub filter_field: String,
    /// `[start, end)` window
    pub window: ExtractionWindow,
    /// Properties to return on each object
    pub properties: Vec<String>,
    /// Strictly ordered property used to page past the ceiling
    pub tiebreak_field: String,
    /// Results per request
    pub page_size: u32,
}

impl SearchQuery {
    /// Create a query with the default tiebreak field and page size
    pub fn new(
        object_type: impl Into<String>,
        filter_field: impl Into<String>,
        window: ExtractionWindow,
    ) -> Self {
        Self {
            object_type: object_type.into(),
            filter_field: filter_field.into(),
            window,
            properties: Vec::new(),
            tiebreak_field: DEFAULT_TIEBREAK_FIELD.to_string(),
            page_size: SEARCH_PAGE_SIZE,
        }
    }

    /// Request these properties
    #[must_use]
    pub fn with_properties(mut self, properties: Vec<String>) -> Self {
        self.properties = properties;
        self
    }

    /// Override the page size (capped at the endpoint maximum)
    #[must_use]
    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size.clamp(1, SEARCH_PAGE_SIZE);
        self
    }

    /// Endpoint path for this object type
    pub fn path(&self) -> String {
        format!("/crm/v3/objects/{}/search", self.object_type)
    }

    /// Body for one request of this query
    pub fn request(&self, tiebreak_floor: u64, after: u64) -> SearchRequest {
        SearchRequest {
            filter_groups: vec![FilterGroup {
                filters: vec![
                    Filter::new(
                        &self.filter_field,
                        FilterOperator::Gte,
                        self.window.start_ms(),
                    ),
                    Filter::new(&self.filter_field, FilterOperator::Lt, self.window.end_ms()),
                    Filter::new(&self.tiebreak_field, FilterOperator::Gte, tiebreak_floor),
                ],
            }],
            sorts: vec![Sort {
                property_name: self.tiebreak_field.clone(),
                direction: SortDirection::Ascending,
            }],
            properties: self.properties.clone(),
            limit: self.page_size,
            after,
        }
    }
}

/// Body of `POST /crm/v3/objects/{type}/search`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub filter_groups: Vec<FilterGroup>,
    pub sorts: Vec<Sort>,
    pub properties: Vec<String>,
    pub limit: u32,
    pub after: u64,
}

/// Filters combined with AND
#[derive(Debug, Clone, Serialize)]
pub struct FilterGroup {
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub property_name: String,
    pub operator: FilterOperator,
    pub value: String,
}

impl Filter {
    fn new(property: &str, operator: FilterOperator, value: impl ToString) -> Self {
        Self {
            property_name: property.to_string(),
            operator,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterOperator {
    Gte,
    Lt,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sort {
    pub property_name: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortDirection {
    Ascending,
}

/// Response of a search request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<Value>,
    #[serde(default)]
    pub paging: Option<SearchPaging>,
    #[serde(default)]
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchPaging {
    #[serde(default)]
    pub next: Option<SearchPagingNext>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchPagingNext {
    #[serde(default)]
    pub after: Option<Value>,
}

impl SearchResponse {
    /// Cursor of the next page; absent once the query is drained
    pub fn next_after(&self) -> Option<u64> {
        match self.paging.as_ref()?.next.as_ref()?.after.as_ref()? {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_u64(),
            _ => None,
        }
    }
}

/// Counters describing one drained search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Requests that returned a page
    pub requests: u64,
    /// Times the cursor was reset at the ceiling
    pub resets: u64,
    /// Boundary records served twice and dropped
    pub duplicates_skipped: u64,
    /// Immediate resubmissions after an origin error
    pub resubmits: u64,
    /// Records handed to the caller
    pub emitted: u64,
}
