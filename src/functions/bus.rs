use crate::schema::BusMessage;
use crate::services::{
    Classifier, EventStore, HubConfig, HubError, HubResult, IntentRouter, OutboxPublisher,
    Publisher, SensorKind, Table, Topics, build_event_store,
};
use forge::prelude::*;
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const CLAIM_BATCH: i64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusRoute {
    Reading(SensorKind),
    Door,
    Command,
    Ignored,
}

pub fn route_topic(topics: &Topics, topic: &str) -> BusRoute {
    if topic == topics.light {
        BusRoute::Reading(SensorKind::Light)
    } else if topic == topics.rain {
        BusRoute::Reading(SensorKind::Rain)
    } else if topic == topics.door {
        BusRoute::Door
    } else if topic == topics.command {
        BusRoute::Command
    } else {
        BusRoute::Ignored
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Ingested {
    Reading { sensor_type: &'static str },
    Door,
    Answered { reply: String },
    Skipped { reason: &'static str },
}

impl Ingested {
    fn action(&self) -> &'static str {
        match self {
            Self::Reading { .. } => "sensor_reading_stored",
            Self::Door => "access_logged",
            Self::Answered { .. } => "command_answered",
            Self::Skipped { .. } => "message_skipped",
        }
    }

    fn details(&self) -> serde_json::Value {
        match self {
            Self::Reading { sensor_type } => serde_json::json!({ "sensor_type": sensor_type }),
            Self::Door => serde_json::json!({}),
            Self::Answered { reply } => serde_json::json!({ "reply": reply }),
            Self::Skipped { reason } => serde_json::json!({ "reason": reason }),
        }
    }
}

/// Applies one inbound message. Sensor payloads are stored verbatim; commands
/// are answered on the response topic. Every write runs under `deadline`.
pub async fn ingest(
    topics: &Topics,
    topic: &str,
    payload: &str,
    store: &dyn EventStore,
    router: &IntentRouter,
    publisher: &dyn Publisher,
    deadline: Duration,
) -> HubResult<Ingested> {
    match route_topic(topics, topic) {
        BusRoute::Reading(kind) => {
            let sensor_type = match kind {
                SensorKind::Light => "light",
                SensorKind::Rain => "rain",
            };
            let attributes = BTreeMap::from([
                ("sensor_type".to_string(), sensor_type.to_string()),
                ("sensor_value".to_string(), payload.to_string()),
            ]);
            tokio::time::timeout(deadline, store.append(Table::SensorReading, attributes))
                .await
                .map_err(|_| HubError::Timeout("sensor reading write"))??;
            Ok(Ingested::Reading { sensor_type })
        }
        BusRoute::Door => {
            let attributes = BTreeMap::from([("event_source".to_string(), payload.to_string())]);
            tokio::time::timeout(deadline, store.append(Table::AccessLog, attributes))
                .await
                .map_err(|_| HubError::Timeout("access log write"))??;
            Ok(Ingested::Door)
        }
        BusRoute::Command => {
            let command = payload.trim();
            if command.is_empty() {
                return Ok(Ingested::Skipped {
                    reason: "blank command",
                });
            }
            let reply = router.handle_command(command).await;
            tokio::time::timeout(deadline, publisher.publish(&topics.response, &reply))
                .await
                .map_err(|_| HubError::Timeout("response publish"))??;
            Ok(Ingested::Answered { reply })
        }
        BusRoute::Ignored => {
            tracing::debug!(topic, "bus: no handler for topic");
            Ok(Ingested::Skipped {
                reason: "unhandled topic",
            })
        }
    }
}

/// Per-message bookkeeping sink (`events` rows in production).
#[async_trait::async_trait]
pub trait TraceLog: Send + Sync {
    async fn record(&self, trace_id: Uuid, action: &str, details: serde_json::Value) -> HubResult<()>;
}

pub struct PgTraceLog {
    pool: PgPool,
}

impl PgTraceLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TraceLog for PgTraceLog {
    async fn record(&self, trace_id: Uuid, action: &str, details: serde_json::Value) -> HubResult<()> {
        sqlx::query(
            r#"
            INSERT INTO events (trace_id, source, action, payload)
            VALUES ($1, 'bus', $2, $3)
            "#,
        )
        .bind(trace_id)
        .bind(action)
        .bind(details)
        .execute(&self.pool)
        .await
        .map_err(|e| HubError::Store(e.to_string()))?;
        Ok(())
    }
}

/// Handles already-claimed messages in order. No single failure, including
/// a failed trace row, stops the rest of the batch.
pub async fn handle_batch(
    messages: &[BusMessage],
    config: &HubConfig,
    store: Arc<dyn EventStore>,
    classifier: Arc<dyn Classifier>,
    publisher_for: impl Fn(Uuid) -> Arc<dyn Publisher>,
    trace_log: &dyn TraceLog,
) -> u32 {
    let mut processed = 0u32;

    for msg in messages {
        let trace_id = msg.trace_id.unwrap_or_else(Uuid::new_v4);
        let publisher = publisher_for(trace_id);
        let router = IntentRouter::from_config(
            config,
            store.clone(),
            publisher.clone(),
            classifier.clone(),
        );

        let (action, mut details) = match ingest(
            &config.topics,
            &msg.topic,
            &msg.payload,
            store.as_ref(),
            &router,
            publisher.as_ref(),
            config.publish_timeout,
        )
        .await
        {
            Ok(ingested) => {
                tracing::info!(
                    topic = %msg.topic,
                    trace_id = %trace_id,
                    action = ingested.action(),
                    "bus: message handled"
                );
                (ingested.action(), ingested.details())
            }
            Err(e) => {
                tracing::error!(
                    topic = %msg.topic,
                    trace_id = %trace_id,
                    error = %e,
                    "bus: message dropped"
                );
                ("message_failed", serde_json::json!({ "error": e.to_string() }))
            }
        };

        if let Some(fields) = details.as_object_mut() {
            fields.insert("message_id".to_string(), serde_json::json!(msg.id));
            fields.insert("topic".to_string(), serde_json::json!(msg.topic));
        }

        if let Err(e) = trace_log.record(trace_id, action, details).await {
            tracing::error!(
                message_id = %msg.id,
                trace_id = %trace_id,
                error = %e,
                "bus: trace row not written"
            );
        }

        processed += 1;
    }

    processed
}

pub async fn bus_tick(
    db: &PgPool,
    config: &HubConfig,
    store: Arc<dyn EventStore>,
    classifier: Arc<dyn Classifier>,
) -> Result<u32> {
    // claiming marks the batch processed up front; failures are logged, not retried
    let mut claimed = sqlx::query_as::<_, BusMessage>(
        r#"
        UPDATE bus_messages SET processed_at = now()
        WHERE id IN (
            SELECT id FROM bus_messages
            WHERE processed_at IS NULL
            ORDER BY created_at, id
            LIMIT $1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING id, topic, payload, processed_at, trace_id, created_at
        "#,
    )
    .bind(CLAIM_BATCH)
    .fetch_all(db)
    .await?;

    if claimed.is_empty() {
        return Ok(0);
    }
    claimed.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    let outbox = OutboxPublisher::new(db.clone());
    let trace_log = PgTraceLog::new(db.clone());
    let processed = handle_batch(
        &claimed,
        config,
        store,
        classifier,
        |trace_id| Arc::new(outbox.with_trace(trace_id)) as Arc<dyn Publisher>,
        &trace_log,
    )
    .await;

    Ok(processed)
}

#[forge::daemon]
pub async fn bus(ctx: &DaemonContext) -> Result<()> {
    let config = crate::get_hub_config()?;
    let classifier = crate::get_classifier()?;
    let store = build_event_store(&config.store, ctx.db())
        .map_err(|e| ForgeError::Internal(format!("failed to create event store: {e}")))?;
    let poll_ms: u64 = ctx.env_parse("HOMEHUB_LOOP_POLL_MS_BUS").unwrap_or(250);

    loop {
        tokio::select! {
            _ = ctx.shutdown_signal() => break,
            _ = tokio::time::sleep(std::time::Duration::from_millis(poll_ms)) => {
                match bus_tick(ctx.db(), config, store.clone(), classifier.clone()).await {
                    Ok(n) if n > 0 => tracing::debug!(processed = n, "bus tick"),
                    Err(e) => tracing::error!(error = %e, "bus tick failed"),
                    _ => {}
                }
            }
        }
    }
    Ok(())
}
