use chrono::{DateTime, Utc};
use forge::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[forge::model]
pub struct Outbox {
    pub id: Uuid,
    pub topic: String,
    pub payload: String,
    pub processed_at: Option<DateTime<Utc>>,
    pub trace_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
