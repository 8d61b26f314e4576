use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr, EnumString, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    Meeting,
    Training,
    Celebration,
    Holiday,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Event {
    pub id: u64,
    #[schema(example = "Quarterly town hall")]
    pub title: String,
    pub description: Option<String>,
    #[schema(example = "Main hall")]
    pub location: Option<String>,
    #[schema(example = "meeting")]
    pub event_type: String,
    #[schema(value_type = String, example = "2026-02-01T10:00:00")]
    pub start_time: NaiveDateTime,
    #[schema(value_type = String, example = "2026-02-01T12:00:00")]
    pub end_time: NaiveDateTime,
    pub created_by: u64,
}
