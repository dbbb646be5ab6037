//! Pagination types
//!
//! The upstream API pages its listing endpoints three different ways. The
//! idiom is recognised from each response envelope rather than configured
//! per endpoint, since families have migrated between idioms over time.

use serde_json::Value;

/// Paging idiom recognised from a response envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingIdiom {
    /// `{"paging": {"next": {"after": "..."}}}`
    NestedCursor,
    /// `{"<offset_key>": ...}` directly in the envelope
    FlatOffset,
    /// `{"has-more": true, "vid-offset": ...}` or `{"hasMore": true, "offset": ...}`
    LegacyHasMore,
}

impl PagingIdiom {
    /// Recognise the idiom a response uses
    pub fn detect(body: &Value) -> Self {
        if body.get("paging").is_some() {
            Self::NestedCursor
        } else if legacy_flag(body).is_some() {
            Self::LegacyHasMore
        } else {
            Self::FlatOffset
        }
    }

    /// Work out where the next page starts
    pub fn next_page(self, body: &Value, offset_key: &str) -> NextPage {
        let cursor = match self {
            Self::NestedCursor => body
                .get("paging")
                .and_then(|p| p.get("next"))
                .and_then(|n| n.get("after"))
                .and_then(cursor_string),
            Self::FlatOffset => body.get(offset_key).and_then(cursor_string),
            Self::LegacyHasMore => {
                if legacy_flag(body) != Some(true) {
                    return NextPage::Done;
                }
                body.get("vid-offset")
                    .or_else(|| body.get(offset_key))
                    .and_then(cursor_string)
            }
        };

        cursor.map_or(NextPage::Done, NextPage::Continue)
    }
}

/// Continuation flag of the legacy idiom, if present
fn legacy_flag(body: &Value) -> Option<bool> {
    body.get("has-more")
        .or_else(|| body.get("hasMore"))
        .and_then(Value::as_bool)
}

/// Cursor values arrive as strings or numbers; empty and zero mean "none"
/// in either form
fn cursor_string(value: &Value) -> Option<String> {
    let cursor = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let zero = cursor.parse::<f64>().is_ok_and(|n| n == 0.0);
    (!cursor.is_empty() && !zero).then_some(cursor)
}

/// Result of the next page computation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextPage {
    /// More pages available starting at this cursor/offset
    Continue(String),
    /// No more pages
    Done,
}

impl NextPage {
    /// Check if this is a done result
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Tracks pagination state during iteration
#[derive(Debug, Clone, Default)]
pub struct PaginationState {
    /// Pages fetched so far
    pub pages: u32,
    /// Cursor/offset to send with the next request
    pub cursor: Option<String>,
    /// Total items fetched so far
    pub total_fetched: u64,
    /// Idiom seen on the most recent page
    pub idiom: Option<PagingIdiom>,
    /// Is pagination complete?
    pub done: bool,
}

impl PaginationState {
    /// Create a new pagination state
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark pagination as complete
    pub fn mark_done(&mut self) {
        self.done = true;
        self.cursor = None;
    }

    /// Record a fetched page
    pub fn add_page(&mut self, items: usize) {
        self.pages += 1;
        self.total_fetched += items as u64;
    }

    /// Set cursor
    pub fn set_cursor(&mut self, cursor: String) {
        self.cursor = Some(cursor);
    }
}
