use chrono::{DateTime, Utc};
use forge::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inbound broker message, copied in by the bus bridge.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[forge::model]
pub struct BusMessage {
    pub id: Uuid,
    pub topic: String,
    pub payload: String,
    pub processed_at: Option<DateTime<Utc>>,
    pub trace_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
