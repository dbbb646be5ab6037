//! Streams whose work lists are seeded by earlier streams of the same run

use super::types::{RecordSource, StreamContext, StreamDescriptor, StreamHandler};
use crate::error::{FailureKind, Result};
use crate::http::HttpClient;
use crate::pagination::Pager;
use crate::state::SharedState;
use crate::types::{string_at_path, QueryParams};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Forms listing that complements the form ids seen on contacts
pub const FORMS_PATH: &str = "/forms/v2/forms";

/// Activity events endpoint
pub const EVENTS_PATH: &str = "/events/v3/events";

/// Largest page the submissions endpoint serves
pub const SUBMISSIONS_PAGE_LIMIT: u32 = 50;

/// Submissions endpoint of one form
pub fn submissions_path(form_id: &str) -> String {
    format!("/form-integrations/v1/submissions/forms/{form_id}")
}

// ============================================================================
// Form Submissions
// ============================================================================

/// Submissions of every form referenced by contacts or listed by the forms
/// endpoint
#[derive(Debug, Clone)]
pub struct SubmissionsStream {
    descriptor: StreamDescriptor,
}

impl SubmissionsStream {
    /// Create the stream under `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            descriptor: StreamDescriptor::full_table(name).advanced(),
        }
    }
}

impl Default for SubmissionsStream {
    fn default() -> Self {
        Self::new("submissions")
    }
}

#[async_trait]
impl StreamHandler for SubmissionsStream {
    fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    async fn open(
        &self,
        ctx: &StreamContext,
        shared: &mut SharedState,
    ) -> Result<Box<dyn RecordSource>> {
        let from_contacts = shared.submission_form_count();
        let listed = Pager::new(Arc::clone(&ctx.client), FORMS_PATH)
            .collect_all()
            .await?;
        for form in &listed {
            if let Some(guid) = string_at_path(form, &["guid"]) {
                shared.mark_submission_form(guid);
            }
        }

        let forms: VecDeque<String> = shared.iter_submission_forms().map(String::from).collect();
        info!(
            stream = %self.descriptor.name,
            forms = forms.len(),
            from_contacts,
            "Collected forms for submission extraction"
        );

        Ok(Box::new(FanOut::new(
            Arc::clone(&ctx.client),
            forms,
            FanOutKind::Submissions,
        )))
    }
}

// ============================================================================
// Contact Activity Events
// ============================================================================

/// Activity events of the contacts queued while syncing contacts.
///
/// Requires the enterprise events scope; accounts without it yield nothing.
/// The bookmark is the contacts window end, not a per-record value.
#[derive(Debug, Clone)]
pub struct ContactEventsStream {
    descriptor: StreamDescriptor,
}

impl ContactEventsStream {
    /// Create the stream under `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            descriptor: StreamDescriptor::incremental(name, "lastSynced").advanced(),
        }
    }
}

impl Default for ContactEventsStream {
    fn default() -> Self {
        Self::new("contacts_events")
    }
}

#[async_trait]
impl StreamHandler for ContactEventsStream {
    fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    async fn open(
        &self,
        ctx: &StreamContext,
        shared: &mut SharedState,
    ) -> Result<Box<dyn RecordSource>> {
        let Some(window) = shared.activity_window() else {
            info!(stream = %self.descriptor.name, "Contacts were not synced in this run, nothing to extract");
            return Ok(Box::new(VecDeque::<Value>::new()));
        };

        if let Err(e) = ctx.client.probe(EVENTS_PATH, QueryParams::new()).await {
            if e.failure_kind() == FailureKind::MissingScope {
                info!(
                    stream = %self.descriptor.name,
                    "Account lacks the events scope, no event data can be retrieved"
                );
                return Ok(Box::new(VecDeque::<Value>::new()));
            }
            return Err(e);
        }

        let contacts: VecDeque<String> =
            shared.iter_activity_candidates().map(String::from).collect();
        info!(stream = %self.descriptor.name, contacts = contacts.len(), "Extracting contact events");

        Ok(Box::new(FanOut::new(
            Arc::clone(&ctx.client),
            contacts,
            FanOutKind::ContactEvents {
                after: event_timestamp(window.start),
                before: event_timestamp(window.end),
                limit: ctx.page_size,
            },
        )))
    }

    fn final_bookmark(&self, shared: &SharedState) -> Option<DateTime<Utc>> {
        shared.activity_window().map(|window| window.end)
    }
}

/// Timestamp format of the events endpoint filters
fn event_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ============================================================================
// Fan-out Source
// ============================================================================

/// Which endpoint a fan-out pages per key
#[derive(Debug, Clone)]
enum FanOutKind {
    Submissions,
    ContactEvents {
        after: String,
        before: String,
        limit: u32,
    },
}

/// Drains one pager per key, in key order
#[derive(Debug)]
struct FanOut {
    client: Arc<HttpClient>,
    keys: VecDeque<String>,
    kind: FanOutKind,
    current: Option<(String, Pager)>,
}

impl FanOut {
    fn new(client: Arc<HttpClient>, keys: VecDeque<String>, kind: FanOutKind) -> Self {
        Self {
            client,
            keys,
            kind,
            current: None,
        }
    }

    /// Pager for the next usable key, or `None` once keys run out
    async fn advance(&mut self) -> Result<Option<(String, Pager)>> {
        while let Some(key) = self.keys.pop_front() {
            match &self.kind {
                FanOutKind::Submissions => {
                    let path = submissions_path(&key);
                    if let Err(e) = self.client.probe(&path, QueryParams::new()).await {
                        // Some listed forms never accept submissions
                        if e.failure_kind() == FailureKind::InvalidCredentials {
                            return Err(e);
                        }
                        warn!(form = %key, error = %e, "Skipping unreachable form");
                        continue;
                    }
                    let pager = Pager::new(Arc::clone(&self.client), path)
                        .query("limit", SUBMISSIONS_PAGE_LIMIT)
                        .data_field("results")
                        .offset_param("after");
                    return Ok(Some((key, pager)));
                }
                FanOutKind::ContactEvents {
                    after,
                    before,
                    limit,
                } => {
                    let pager = Pager::new(Arc::clone(&self.client), EVENTS_PATH)
                        .query("limit", limit)
                        .query("objectType", "contact")
                        .query("objectId", &key)
                        .query("occurredAfter", after)
                        .query("occurredBefore", before)
                        .data_field("results")
                        .offset_param("after");
                    return Ok(Some((key, pager)));
                }
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl RecordSource for FanOut {
    async fn next_record(&mut self) -> Result<Option<Value>> {
        loop {
            if let Some((key, pager)) = self.current.as_mut() {
                if let Some(mut record) = pager.next_item().await? {
                    if matches!(self.kind, FanOutKind::Submissions) {
                        if let Some(fields) = record.as_object_mut() {
                            fields.insert("form_id".to_string(), Value::String(key.clone()));
                        }
                    }
                    return Ok(Some(record));
                }
                debug!(key = %key, pages = pager.state().pages, "Key drained");
                self.current = None;
            }

            match self.advance().await? {
                Some(next) => self.current = Some(next),
                None => return Ok(None),
            }
        }
    }
}
