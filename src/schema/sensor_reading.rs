use chrono::{DateTime, Utc};
use forge::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[forge::model]
pub struct SensorReading {
    pub id: i64,
    pub sensor_type: String,
    pub sensor_value: String,
    pub created_at: DateTime<Utc>,
}
