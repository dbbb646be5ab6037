//! Batch association and property-history lookups

use crate::error::Result;
use crate::http::HttpClient;
use crate::types::string_at_path;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Batch size for deal-like objects
pub const DEAL_CHUNK_SIZE: usize = 50;

/// Batch size for contact-like objects
pub const CONTACT_CHUNK_SIZE: usize = 100;

/// Which extra data to attach to each record of an object type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentPlan {
    /// Object type of the primary records
    pub object_type: String,
    /// Related object types to resolve associations to
    pub associations: Vec<String>,
    /// Properties whose value history is attached
    pub history_properties: Vec<String>,
    /// Records per batch call
    pub chunk_size: usize,
}

impl EnrichmentPlan {
    /// Create an empty plan for `object_type`
    pub fn new(object_type: impl Into<String>, chunk_size: usize) -> Self {
        Self {
            object_type: object_type.into(),
            associations: Vec::new(),
            history_properties: Vec::new(),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Resolve associations to `to_object`
    #[must_use]
    pub fn associate(mut self, to_object: impl Into<String>) -> Self {
        self.associations.push(to_object.into());
        self
    }

    /// Attach the history of `property`
    #[must_use]
    pub fn history(mut self, property: impl Into<String>) -> Self {
        self.history_properties.push(property.into());
        self
    }

    /// Deals: contact and company associations plus pipeline stage history
    pub fn deals() -> Self {
        Self::new("deals", DEAL_CHUNK_SIZE)
            .associate("contacts")
            .associate("companies")
            .history("dealstage")
    }

    /// Contacts: company associations
    pub fn contacts() -> Self {
        Self::new("contacts", CONTACT_CHUNK_SIZE).associate("companies")
    }

    /// Whether the plan adds anything
    pub fn is_empty(&self) -> bool {
        self.associations.is_empty() && self.history_properties.is_empty()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRequest<'a> {
    properties: &'a [String],
    properties_with_history: &'a [String],
    inputs: Vec<Value>,
}

/// Executes an [`EnrichmentPlan`] against chunks of records
#[derive(Debug, Clone)]
pub struct BatchEnricher {
    client: Arc<HttpClient>,
    plan: EnrichmentPlan,
}

impl BatchEnricher {
    /// Create an enricher
    pub fn new(client: Arc<HttpClient>, plan: EnrichmentPlan) -> Self {
        Self { client, plan }
    }

    /// The plan being executed
    pub fn plan(&self) -> &EnrichmentPlan {
        &self.plan
    }

    /// Attach associations and property history to every record in place.
    ///
    /// Records gain `associations.{type}.results = [{"id": ...}]` for every
    /// planned association (empty when none exist) and, when the plan names
    /// history properties, a `propertiesWithHistory` object.
    pub async fn enrich(&self, records: &mut [Value]) -> Result<()> {
        if records.is_empty() || self.plan.is_empty() {
            return Ok(());
        }

        let ids: Vec<String> = records
            .iter()
            .map(|r| string_at_path(r, &["id"]).unwrap_or_default())
            .collect();

        let mut associations = Vec::with_capacity(self.plan.associations.len());
        for to_object in &self.plan.associations {
            associations.push((to_object, self.fetch_associations(to_object, &ids).await?));
        }

        let mut history = if self.plan.history_properties.is_empty() {
            None
        } else {
            Some(self.fetch_history(&ids).await?)
        };

        for (record, id) in records.iter_mut().zip(&ids) {
            let Some(object) = record.as_object_mut() else {
                continue;
            };

            let mut attached = Map::new();
            for (to_object, by_id) in &associations {
                let results = by_id.get(id).cloned().unwrap_or_default();
                attached.insert((*to_object).clone(), json!({ "results": results }));
            }
            if !attached.is_empty() {
                object.insert("associations".to_string(), Value::Object(attached));
            }

            if let Some(history) = history.as_mut() {
                let entry = history.remove(id).unwrap_or_else(|| json!({}));
                object.insert("propertiesWithHistory".to_string(), entry);
            }
        }

        Ok(())
    }

    /// `POST /crm/v3/associations/{from}/{to}/batch/read`
    async fn fetch_associations(
        &self,
        to_object: &str,
        ids: &[String],
    ) -> Result<HashMap<String, Vec<Value>>> {
        let path = format!(
            "/crm/v3/associations/{}/{to_object}/batch/read",
            self.plan.object_type
        );
        let body = json!({ "inputs": inputs(ids) });
        let response = self.client.post_json(&path, body).await?;

        let mut by_id: HashMap<String, Vec<Value>> = HashMap::new();
        for entry in results(&response) {
            let Some(from) = string_at_path(entry, &["from", "id"]) else {
                continue;
            };
            let targets = entry
                .get("to")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(|t| t.get("id").cloned())
                .map(|id| json!({ "id": id }));
            by_id.entry(from).or_default().extend(targets);
        }

        debug!(
            from = %self.plan.object_type,
            to = to_object,
            batch = ids.len(),
            matched = by_id.len(),
            "Fetched associations"
        );
        Ok(by_id)
    }

    /// `POST /crm/v3/objects/{type}/batch/read` with `propertiesWithHistory`
    async fn fetch_history(&self, ids: &[String]) -> Result<HashMap<String, Value>> {
        let path = format!("/crm/v3/objects/{}/batch/read", self.plan.object_type);
        let request = HistoryRequest {
            properties: &self.plan.history_properties,
            properties_with_history: &self.plan.history_properties,
            inputs: inputs(ids),
        };
        let response = self
            .client
            .post_json(&path, serde_json::to_value(request)?)
            .await?;

        Ok(results(&response)
            .filter_map(|entry| {
                let id = string_at_path(entry, &["id"])?;
                let history = entry.get("propertiesWithHistory")?.clone();
                Some((id, history))
            })
            .collect())
    }
}

fn inputs(ids: &[String]) -> Vec<Value> {
    ids.iter().map(|id| json!({ "id": id })).collect()
}

fn results(response: &Value) -> impl Iterator<Item = &Value> {
    response
        .get("results")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}
