use crate::services::error::{HubError, HubResult};
use crate::services::model::{EventRecord, QueryFilter, Table};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::collections::BTreeMap;

#[async_trait::async_trait]
pub trait EventStore: Send + Sync {
    /// Point query: rows of `filter.table()` matching every predicate, ordered
    /// by creation time, at most `filter.limit()` of them.
    async fn query(&self, filter: &QueryFilter) -> HubResult<Vec<EventRecord>>;
    async fn append(&self, table: Table, attributes: BTreeMap<String, String>) -> HubResult<()>;
}

pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn build_select(filter: &QueryFilter) -> QueryBuilder<'static, Postgres> {
    let table = filter.table();
    let mut qb = QueryBuilder::new(format!(
        "SELECT {}, created_at FROM {}",
        table.columns().join(", "),
        table.name()
    ));

    for (i, predicate) in filter.predicates().iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        qb.push(predicate.field());
        qb.push(" = ");
        qb.push_bind(predicate.value());
    }

    // id breaks created_at ties so repeated lookups pick the same row
    let direction = if filter.ascending() { "ASC" } else { "DESC" };
    qb.push(format!(
        " ORDER BY {col} {direction}, id {direction} LIMIT ",
        col = filter.order_field().column()
    ));
    qb.push_bind(i64::from(filter.limit()));
    qb
}

pub(crate) fn build_insert(
    table: Table,
    attributes: &BTreeMap<String, String>,
) -> HubResult<QueryBuilder<'static, Postgres>> {
    if let Some(unknown) = attributes
        .keys()
        .find(|key| !table.columns().contains(&key.as_str()))
    {
        return Err(HubError::Store(format!(
            "unknown column `{unknown}` for {}",
            table.name()
        )));
    }
    if attributes.is_empty() {
        return Err(HubError::Store(format!("empty insert into {}", table.name())));
    }

    let columns: Vec<&str> = attributes.keys().map(String::as_str).collect();
    let mut qb = QueryBuilder::new(format!(
        "INSERT INTO {} ({}) VALUES (",
        table.name(),
        columns.join(", ")
    ));
    let mut values = qb.separated(", ");
    for value in attributes.values() {
        values.push_bind(value.clone());
    }
    values.push_unseparated(")");
    Ok(qb)
}

#[async_trait::async_trait]
impl EventStore for PgEventStore {
    async fn query(&self, filter: &QueryFilter) -> HubResult<Vec<EventRecord>> {
        let table = filter.table();
        let rows = build_select(filter)
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| HubError::Store(e.to_string()))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let created_at: DateTime<Utc> = row
                .try_get("created_at")
                .map_err(|e| HubError::Store(e.to_string()))?;
            let mut attributes = BTreeMap::new();
            for column in table.columns() {
                let value: Option<String> = row
                    .try_get(*column)
                    .map_err(|e| HubError::Store(e.to_string()))?;
                if let Some(value) = value {
                    attributes.insert((*column).to_string(), value);
                }
            }
            records.push(EventRecord {
                table,
                created_at: created_at.to_rfc3339_opts(SecondsFormat::Micros, false),
                attributes,
            });
        }

        tracing::debug!(
            table = table.name(),
            predicates = filter.predicates().len(),
            rows = records.len(),
            "event store: point query"
        );
        Ok(records)
    }

    async fn append(&self, table: Table, attributes: BTreeMap<String, String>) -> HubResult<()> {
        build_insert(table, &attributes)?
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| HubError::Store(e.to_string()))?;
        Ok(())
    }
}
