//! Ordered table of stream handlers

use super::crm::{mark_form_guid, ListingStream, PageLimit, SearchStream};
use super::dependent::{ContactEventsStream, SubmissionsStream, FORMS_PATH};
use super::types::{StreamDescriptor, StreamHandler};
use crate::config::{CustomObjectConfig, HubConfig};
use crate::enrich::EnrichmentPlan;
use crate::error::{Error, Result};
use crate::state::SharedState;
use chrono::Duration;
use serde_json::Value;
use std::sync::Arc;

/// Properties always requested for companies
pub const COMPANY_PROPERTIES: &[&str] = &[
    "name",
    "country",
    "domain",
    "website",
    "numberofemployees",
    "industry",
    "hs_user_ids_of_all_owners",
    "owneremail",
    "ownername",
    "hubspot_owner_id",
    "hs_all_owner_ids",
    "industrynaics",
    "industrysic",
    "number_of_employees_company",
    "employeesinalllocations",
    "employeesinalllocationsnum",
    "annualrevenue",
    "currency",
    "salesannual",
    "salesannualnum",
    "total_revenue",
    "type",
    "hs_merged_object_ids",
    "lifecyclestage",
    "hs_additional_domains",
    "recent_conversion_date",
];

/// Days stored contact bookmarks are rewound, so late activity data is caught
pub const CONTACTS_LOOKBACK_DAYS: i64 = 1;

/// Handlers in sync order.
///
/// Streams that seed shared state are registered before the streams that
/// consume it.
#[derive(Clone, Default)]
pub struct StreamRegistry {
    handlers: Vec<Arc<dyn StreamHandler>>,
}

impl StreamRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stream `config` enables, in sync order
    pub fn standard(config: &HubConfig) -> Self {
        let mut registry = Self::new();
        registry
            .register(owners())
            .register(companies())
            .register(deal_pipelines())
            .register(forms())
            .register(contacts())
            .register(deals());

        if config.advanced_features_enabled {
            registry
                .register(engagements())
                .register(email_events())
                .register(SubmissionsStream::default())
                .register(ContactEventsStream::default());
        }

        for object in &config.custom_objects {
            registry.register(custom_object(object));
        }
        registry
    }

    /// Append a handler
    pub fn register(&mut self, handler: impl StreamHandler + 'static) -> &mut Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Handler registered under `name`
    pub fn get(&self, name: &str) -> Option<Arc<dyn StreamHandler>> {
        self.handlers
            .iter()
            .find(|h| h.descriptor().name == name)
            .cloned()
    }

    /// Registered stream names in sync order
    pub fn names(&self) -> Vec<&str> {
        self.handlers
            .iter()
            .map(|h| h.descriptor().name.as_str())
            .collect()
    }

    /// Descriptors in sync order
    pub fn descriptors(&self) -> impl Iterator<Item = &StreamDescriptor> {
        self.handlers.iter().map(|h| h.descriptor())
    }

    /// Handlers to run for a selection, in sync order.
    ///
    /// An empty selection means every registered stream.
    pub fn select(&self, names: &[String]) -> Result<Vec<Arc<dyn StreamHandler>>> {
        if let Some(unknown) = names.iter().find(|n| self.get(n).is_none()) {
            return Err(Error::StreamNotFound {
                stream: unknown.clone(),
            });
        }
        Ok(self
            .handlers
            .iter()
            .filter(|h| names.is_empty() || names.contains(&h.descriptor().name))
            .cloned()
            .collect())
    }

    /// Number of registered streams
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for StreamRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRegistry")
            .field("streams", &self.names())
            .finish()
    }
}

// ============================================================================
// Built-in Streams
// ============================================================================

fn owners() -> ListingStream {
    ListingStream::new(
        StreamDescriptor::incremental("owners", "updatedAt").replicated_on(&["updatedAt"]),
        "/crm/v3/owners",
    )
    .paged("results", "after")
    .limit(PageLimit::Fixed(100))
}

fn companies() -> ListingStream {
    ListingStream::new(
        StreamDescriptor::incremental("companies", "hs_lastmodifieddate")
            .replicated_on(&["updatedAt"])
            .with_properties_sync("companies"),
        "/crm/v3/objects/companies",
    )
    .paged("results", "after")
    .limit(PageLimit::Fixed(100))
    .query("properties", COMPANY_PROPERTIES.join(","))
}

fn deal_pipelines() -> ListingStream {
    ListingStream::new(
        StreamDescriptor::incremental("deal_pipelines", "updatedAt").replicated_on(&["updatedAt"]),
        "/crm/v3/pipelines/deals",
    )
    .paged("results", "after")
}

fn forms() -> ListingStream {
    ListingStream::new(
        StreamDescriptor::incremental("forms", "updatedAt").replicated_on(&["updatedAt"]),
        FORMS_PATH,
    )
    .observe_with(mark_form_guid)
}

fn observe_contact(record: &Value, shared: &mut SharedState) {
    shared.observe_contact(record);
}

fn contacts() -> SearchStream {
    SearchStream::new(
        StreamDescriptor::incremental("contacts", "updatedAt")
            .replicated_on(&["properties", "lastmodifieddate"])
            .with_properties_sync("contacts")
            .with_lookback(Duration::days(CONTACTS_LOOKBACK_DAYS)),
        "contacts",
        "lastmodifieddate",
    )
    .enriched(EnrichmentPlan::contacts())
    .records_window()
    .observe_with(observe_contact)
}

fn deals() -> SearchStream {
    SearchStream::new(
        StreamDescriptor::incremental("deals", "hs_lastmodifieddate")
            .replicated_on(&["properties", "hs_lastmodifieddate"])
            .with_properties_sync("deals"),
        "deals",
        "hs_lastmodifieddate",
    )
    .enriched(EnrichmentPlan::deals())
}

fn engagements() -> ListingStream {
    ListingStream::new(
        StreamDescriptor::incremental("engagements", "lastUpdated")
            .replicated_on(&["engagement", "lastUpdated"])
            .advanced(),
        "/engagements/v1/engagements/paged",
    )
    .paged("results", "offset")
    .limit(PageLimit::Configured)
}

fn email_events() -> ListingStream {
    ListingStream::new(
        StreamDescriptor::incremental("email_events", "created")
            .replicated_on(&["created"])
            .advanced(),
        "/email/public/v1/events",
    )
    .paged("events", "offset")
    .limit(PageLimit::Fixed(1000))
    .windowed("startTimestamp", "endTimestamp")
}

fn custom_object(object: &CustomObjectConfig) -> SearchStream {
    let object_type = object.object_type();
    SearchStream::new(
        StreamDescriptor::incremental(object.stream_name(), "hs_lastmodifieddate")
            .replicated_on(&["properties", "hs_lastmodifieddate"])
            .with_properties_sync(object_type.clone())
            .custom_object(object.portal_id),
        object_type,
        "hs_lastmodifieddate",
    )
}
