use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr, EnumString, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AnnouncementCategory {
    General,
    Policy,
    Holiday,
    Urgent,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Announcement {
    #[schema(example = 4)]
    pub id: u64,
    #[schema(example = "Office closed on Friday")]
    pub title: String,
    pub body: String,
    #[schema(example = "holiday")]
    pub category: String,
    pub author_id: u64,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub published_at: Option<DateTime<Utc>>,
}
