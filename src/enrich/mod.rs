//! Record enrichment
//!
//! Batches primary records and attaches association references and property
//! history fetched through the batch-read endpoints.

mod batch;
mod source;

pub use batch::{BatchEnricher, EnrichmentPlan, CONTACT_CHUNK_SIZE, DEAL_CHUNK_SIZE};
pub use source::EnrichedSearch;
