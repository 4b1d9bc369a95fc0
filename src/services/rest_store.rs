use crate::services::error::{HubError, HubResult};
use crate::services::event_store::EventStore;
use crate::services::model::{EventRecord, QueryFilter, Table};
use std::collections::BTreeMap;

const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Event store backed by a Supabase (PostgREST) project.
pub struct RestEventStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestEventStore {
    pub fn new(base_url: &str, api_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.name())
    }

    async fn fetch(&self, filter: &QueryFilter) -> anyhow::Result<Vec<serde_json::Value>> {
        let response = self
            .client
            .get(self.table_url(filter.table()))
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .query(&query_params(filter))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("PostgREST returned {status}: {body}");
        }

        Ok(response.json().await?)
    }

    async fn insert(&self, table: Table, attributes: &BTreeMap<String, String>) -> anyhow::Result<()> {
        let response = self
            .client
            .post(self.table_url(table))
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Prefer", "return=minimal")
            .json(attributes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("PostgREST returned {status}: {body}");
        }
        Ok(())
    }
}

fn query_params(filter: &QueryFilter) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), "*".to_string())];
    for predicate in filter.predicates() {
        params.push((
            predicate.field().to_string(),
            format!("eq.{}", predicate.value()),
        ));
    }
    let direction = if filter.ascending() { "asc" } else { "desc" };
    params.push((
        "order".to_string(),
        format!("{}.{direction}", filter.order_field().column()),
    ));
    params.push(("limit".to_string(), filter.limit().to_string()));
    params
}

fn record_from_row(table: Table, row: serde_json::Value) -> Option<EventRecord> {
    let serde_json::Value::Object(fields) = row else {
        return None;
    };

    let mut created_at = String::new();
    let mut attributes = BTreeMap::new();
    for (key, value) in fields {
        let text = match value {
            serde_json::Value::String(s) => s,
            serde_json::Value::Null => continue,
            other => other.to_string(),
        };
        if key == "created_at" {
            created_at = text;
        } else if key != "id" {
            attributes.insert(key, text);
        }
    }

    Some(EventRecord {
        table,
        created_at,
        attributes,
    })
}

#[async_trait::async_trait]
impl EventStore for RestEventStore {
    async fn query(&self, filter: &QueryFilter) -> HubResult<Vec<EventRecord>> {
        let rows = self
            .fetch(filter)
            .await
            .map_err(|e| HubError::Store(e.to_string()))?;
        let records: Vec<EventRecord> = rows
            .into_iter()
            .filter_map(|row| record_from_row(filter.table(), row))
            .collect();
        tracing::debug!(
            table = filter.table().name(),
            rows = records.len(),
            "rest store: point query"
        );
        Ok(records)
    }

    async fn append(&self, table: Table, attributes: BTreeMap<String, String>) -> HubResult<()> {
        self.insert(table, &attributes)
            .await
            .map_err(|e| HubError::Store(e.to_string()))
    }
}
