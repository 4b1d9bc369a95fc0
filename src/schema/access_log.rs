use chrono::{DateTime, Utc};
use forge::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[forge::model]
pub struct AccessLog {
    pub id: i64,
    pub event_source: String,
    pub created_at: DateTime<Utc>,
}
