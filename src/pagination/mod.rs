//! Pagination module
//!
//! Supports: nested `paging.next.after` cursors, flat offset keys, and the
//! legacy `has-more` / `vid-offset` pair.
//!
//! # Overview
//!
//! A [`Pager`] turns one listing endpoint into a lazy sequence of items. The
//! paging idiom is detected from every response, and iteration stops on an
//! empty page, a missing cursor, or a false continuation flag.

mod pager;
mod types;

pub use pager::Pager;
pub use types::{NextPage, PaginationState, PagingIdiom};
