use crate::schema::*;
use forge::prelude::*;
use uuid::Uuid;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

fn page_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListSensorReadingsInput {
    pub sensor_type: Option<String>,
    pub limit: Option<i64>,
}

#[forge::query(public)]
pub async fn list_sensor_readings(
    ctx: &QueryContext,
    input: ListSensorReadingsInput,
) -> Result<Vec<SensorReading>> {
    let limit = page_limit(input.limit);

    if let Some(ref sensor_type) = input.sensor_type {
        if !matches!(sensor_type.as_str(), "light" | "rain") {
            return Err(ForgeError::Validation(format!(
                "unknown sensor type `{sensor_type}`"
            )));
        }
        sqlx::query_as::<_, SensorReading>(
            r#"
            SELECT id, sensor_type, sensor_value, created_at
            FROM sensor_readings
            WHERE sensor_type = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(sensor_type)
        .bind(limit)
        .fetch_all(ctx.db())
        .await
        .map_err(|e| ForgeError::Database(e.to_string()))
    } else {
        sqlx::query_as::<_, SensorReading>(
            r#"
            SELECT id, sensor_type, sensor_value, created_at
            FROM sensor_readings
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(ctx.db())
        .await
        .map_err(|e| ForgeError::Database(e.to_string()))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListAccessLogsInput {
    pub limit: Option<i64>,
}

#[forge::query(public)]
pub async fn list_access_logs(
    ctx: &QueryContext,
    input: ListAccessLogsInput,
) -> Result<Vec<AccessLog>> {
    sqlx::query_as::<_, AccessLog>(
        r#"
        SELECT id, event_source, created_at
        FROM access_logs
        ORDER BY created_at DESC, id DESC
        LIMIT $1
        "#,
    )
    .bind(page_limit(input.limit))
    .fetch_all(ctx.db())
    .await
    .map_err(|e| ForgeError::Database(e.to_string()))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListEventsInput {
    pub trace_id: Option<Uuid>,
    pub limit: Option<i64>,
}

#[forge::query(public)]
pub async fn list_events(ctx: &QueryContext, input: ListEventsInput) -> Result<Vec<Event>> {
    let limit = page_limit(input.limit);

    if let Some(trace_id) = input.trace_id {
        sqlx::query_as::<_, Event>(
            r#"
            SELECT id, trace_id, source, action, payload, created_at
            FROM events
            WHERE trace_id = $1
            ORDER BY created_at, id
            LIMIT $2
            "#,
        )
        .bind(trace_id)
        .bind(limit)
        .fetch_all(ctx.db())
        .await
        .map_err(|e| ForgeError::Database(e.to_string()))
    } else {
        sqlx::query_as::<_, Event>(
            r#"
            SELECT id, trace_id, source, action, payload, created_at
            FROM events
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(ctx.db())
        .await
        .map_err(|e| ForgeError::Database(e.to_string()))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListOutboxInput {
    pub pending_only: Option<bool>,
    pub limit: Option<i64>,
}

#[forge::query(public)]
pub async fn list_outbox(ctx: &QueryContext, input: ListOutboxInput) -> Result<Vec<Outbox>> {
    let limit = page_limit(input.limit);

    if input.pending_only.unwrap_or(false) {
        sqlx::query_as::<_, Outbox>(
            r#"
            SELECT id, topic, payload, processed_at, trace_id, created_at
            FROM outbox
            WHERE processed_at IS NULL
            ORDER BY created_at, id
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(ctx.db())
        .await
        .map_err(|e| ForgeError::Database(e.to_string()))
    } else {
        sqlx::query_as::<_, Outbox>(
            r#"
            SELECT id, topic, payload, processed_at, trace_id, created_at
            FROM outbox
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(ctx.db())
        .await
        .map_err(|e| ForgeError::Database(e.to_string()))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetHealthInput {}

#[derive(Debug, Serialize)]
pub struct HealthView {
    pub pending_inbound: i64,
    pub pending_outbox: i64,
}

#[forge::query(public)]
pub async fn get_health(ctx: &QueryContext, _input: GetHealthInput) -> Result<HealthView> {
    let (pending_inbound, pending_outbox): (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM bus_messages WHERE processed_at IS NULL),
            (SELECT COUNT(*) FROM outbox WHERE processed_at IS NULL)
        "#,
    )
    .fetch_one(ctx.db())
    .await
    .map_err(|e| ForgeError::Database(e.to_string()))?;

    Ok(HealthView {
        pending_inbound,
        pending_outbox,
    })
}
