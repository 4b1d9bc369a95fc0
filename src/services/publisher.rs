use crate::services::error::{HubError, HubResult};
use sqlx::PgPool;
use uuid::Uuid;

#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: &str) -> HubResult<()>;
}

/// Queues publishes in the `outbox` table; the broker bridge drains it.
pub struct OutboxPublisher {
    pool: PgPool,
    trace_id: Option<Uuid>,
}

impl OutboxPublisher {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            trace_id: None,
        }
    }

    pub fn with_trace(&self, trace_id: Uuid) -> Self {
        Self {
            pool: self.pool.clone(),
            trace_id: Some(trace_id),
        }
    }
}

#[async_trait::async_trait]
impl Publisher for OutboxPublisher {
    async fn publish(&self, topic: &str, payload: &str) -> HubResult<()> {
        sqlx::query(
            r#"
            INSERT INTO outbox (topic, payload, trace_id)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(topic)
        .bind(payload)
        .bind(self.trace_id)
        .execute(&self.pool)
        .await
        .map_err(|e| HubError::Publish(e.to_string()))?;

        tracing::debug!(topic, payload_len = payload.len(), "outbox: queued publish");
        Ok(())
    }
}
