//! Stream catalogue
//!
//! Every extractable table is a registered [`StreamHandler`]: a static
//! [`StreamDescriptor`] plus the code that opens its lazy record source.
//! The [`StreamRegistry`] keeps them in sync order so streams that seed
//! shared state run before the streams that consume it.

mod crm;
mod dependent;
mod registry;
mod types;

pub use crm::{
    fetch_property_names, mark_form_guid, property_pager, ListingStream, Observer, PageLimit,
    SearchStream,
};
pub use dependent::{
    submissions_path, ContactEventsStream, SubmissionsStream, EVENTS_PATH, FORMS_PATH,
    SUBMISSIONS_PAGE_LIMIT,
};
pub use registry::{StreamRegistry, COMPANY_PROPERTIES, CONTACTS_LOOKBACK_DAYS};
pub use types::{RecordSource, SourceRecord, StreamContext, StreamDescriptor, StreamHandler};

#[cfg(test)]
mod tests;
