// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # hubspot-sync
//!
//! Incremental, checkpointed extraction of HubSpot CRM records, emitted as a
//! JSON-lines change stream of `RECORD` and `STATE` messages.
//!
//! ## Features
//!
//! - **OAuth2 refresh**: Token exchange with proactive expiry and a single
//!   re-exchange on 401
//! - **Resilient HTTP**: Retry with backoff, rate limiting, 520 resubmits
//! - **Windowed search**: Activity windows that page past the 10k cap
//! - **Batch enrichment**: Associations and property history merged per page
//! - **Monotonic bookmarks**: Checkpoints only ever move forward
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hubspot_sync::{HubConfig, StateManager, SyncEngine};
//! use hubspot_sync::engine::StdoutSink;
//!
//! #[tokio::main]
//! async fn main() -> hubspot_sync::Result<()> {
//!     let config = HubConfig::from_file("config.json")?;
//!     let state = StateManager::from_file("state.json")?;
//!
//!     let mut engine = SyncEngine::new(config, state)?;
//!     let report = engine.run(&mut StdoutSink::stdout()).await?;
//!     std::process::exit(report.exit_status().code().into());
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         SyncEngine                           │
//! │   registry order → window → open source → BookmarkGuard      │
//! └──────────────────────────────────────────────────────────────┘
//!                                │
//! ┌──────────┬───────────┬───────┴───────┬───────────┬───────────┐
//! │   Auth   │   HTTP    │   Paginate    │  Search   │  Enrich   │
//! ├──────────┼───────────┼───────────────┼───────────┼───────────┤
//! │ Bearer   │ Retry     │ Offset        │ Windows   │ Assoc.    │
//! │ OAuth2   │ Rate Limit│ has-more      │ Cap split │ History   │
//! │ Refresh  │ Backoff   │ paging.next   │ 520 retry │           │
//! └──────────┴───────────┴───────────────┴───────────┴───────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types and failure classification
pub mod error;

/// Common types and type aliases
pub mod types;

/// Run configuration
pub mod config;

/// Authentication
pub mod auth;

/// HTTP client with retry and rate limiting
pub mod http;

/// Offset and cursor pagination
pub mod pagination;

/// Windowed CRM search
pub mod search;

/// Association and property-history enrichment
pub mod enrich;

/// Bookmarks and cross-stream state
pub mod state;

/// Stream definitions and the registry
pub mod streams;

/// Sync orchestration and output
pub mod engine;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, FailureKind, Result};
pub use types::*;

pub use config::HubConfig;
pub use engine::{ExitStatus, Message, RunReport, SyncEngine};
pub use state::{SharedState, StateManager};
pub use streams::{StreamHandler, StreamRegistry};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
