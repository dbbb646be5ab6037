//! Cross-stream state
//!
//! Records observed while scanning one stream seed the work lists of later
//! streams in the same run. Lives only for the duration of a run.

use crate::types::{replication_value_at, string_at_path, ExtractionWindow};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::debug;

/// Contact property listing `guid:timestamp` pairs separated by `;`
pub const FORM_SUBMISSIONS_PROPERTY: &str = "hs_calculated_form_submissions";

/// Contact properties whose timestamps mark recent activity
pub const ACTIVITY_PROPERTIES: [&str; 2] = ["hs_analytics_last_timestamp", "recent_conversion_date"];

/// Typed store shared by the streams of one run
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    activity_candidates: BTreeSet<String>,
    submission_forms: BTreeSet<String>,
    activity_window: Option<ExtractionWindow>,
}

impl SharedState {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an entity for activity-event extraction; returns whether it was new
    pub fn mark_activity_candidate(&mut self, entity_id: impl Into<String>) -> bool {
        self.activity_candidates.insert(entity_id.into())
    }

    /// Queue a form for submission extraction; returns whether it was new
    pub fn mark_submission_form(&mut self, form_id: impl Into<String>) -> bool {
        self.submission_forms.insert(form_id.into())
    }

    /// Entities queued for activity-event extraction
    pub fn iter_activity_candidates(&self) -> impl Iterator<Item = &str> {
        self.activity_candidates.iter().map(String::as_str)
    }

    /// Forms queued for submission extraction
    pub fn iter_submission_forms(&self) -> impl Iterator<Item = &str> {
        self.submission_forms.iter().map(String::as_str)
    }

    /// Number of queued activity candidates
    pub fn activity_candidate_count(&self) -> usize {
        self.activity_candidates.len()
    }

    /// Number of queued forms
    pub fn submission_form_count(&self) -> usize {
        self.submission_forms.len()
    }

    /// Remember the window the contacts stream used
    pub fn set_activity_window(&mut self, window: ExtractionWindow) {
        self.activity_window = Some(window);
    }

    /// Window the contacts stream used in this run, if it ran
    pub fn activity_window(&self) -> Option<ExtractionWindow> {
        self.activity_window
    }

    /// Harvest form ids and activity candidacy from a contact record.
    ///
    /// Form ids come from every `guid:timestamp` entry of the calculated
    /// submissions property. The contact becomes an activity candidate when
    /// either activity timestamp falls in `(start, end]` of the recorded
    /// window.
    pub fn observe_contact(&mut self, record: &Value) {
        if let Some(raw) = string_at_path(record, &["properties", FORM_SUBMISSIONS_PROPERTY]) {
            for entry in raw.split(';') {
                let guid = entry.split(':').next().unwrap_or_default().trim();
                if !guid.is_empty() {
                    self.mark_submission_form(guid);
                }
            }
        }

        let Some(window) = self.activity_window else {
            return;
        };
        let Some(id) = string_at_path(record, &["id"]) else {
            return;
        };

        let active = ACTIVITY_PROPERTIES.into_iter().any(|property| {
            replication_value_at(record, &["properties", property])
                .is_some_and(|ts| window.contains_activity(ts))
        });
        if active && self.mark_activity_candidate(id.as_str()) {
            debug!(contact = %id, "Queued contact for event extraction");
        }
    }
}
