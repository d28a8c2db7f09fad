use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Subject marks for one school standard. `subjects` is stored as sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MarksRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub standard: i32,
    pub subjects: Value,
    pub created_at: DateTime<Utc>,
}
