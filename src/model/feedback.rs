use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr, EnumString, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FeedbackCategory {
    General,
    Workplace,
    Management,
    Suggestion,
    Complaint,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr, EnumString, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FeedbackStatus {
    Open,
    Resolved,
}

/// Row as stored; `employee_id` is kept even for anonymous feedback so the
/// author can list their own submissions.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeedbackRow {
    pub id: u64,
    pub employee_id: u64,
    pub employee_name: String,
    pub subject: String,
    pub message: String,
    pub category: String,
    pub anonymous: bool,
    pub status: String,
    pub response: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Feedback {
    pub id: u64,
    /// Absent when submitted anonymously
    pub employee_id: Option<u64>,
    pub employee_name: Option<String>,
    #[schema(example = "Parking space")]
    pub subject: String,
    pub message: String,
    #[schema(example = "workplace")]
    pub category: String,
    pub anonymous: bool,
    #[schema(example = "open")]
    pub status: String,
    pub response: Option<String>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<FeedbackRow> for Feedback {
    fn from(row: FeedbackRow) -> Self {
        let (employee_id, employee_name) = if row.anonymous {
            (None, None)
        } else {
            (Some(row.employee_id), Some(row.employee_name))
        };
        Feedback {
            id: row.id,
            employee_id,
            employee_name,
            subject: row.subject,
            message: row.message,
            category: row.category,
            anonymous: row.anonymous,
            status: row.status,
            response: row.response,
            created_at: row.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(anonymous: bool) -> FeedbackRow {
        FeedbackRow {
            id: 1,
            employee_id: 42,
            employee_name: "Jane Roe".into(),
            subject: "Coffee".into(),
            message: "More of it".into(),
            category: "suggestion".into(),
            anonymous,
            status: "open".into(),
            response: None,
            created_at: None,
        }
    }

    #[test]
    fn anonymous_feedback_hides_author() {
        let fb = Feedback::from(row(true));
        assert_eq!(fb.employee_id, None);
        assert_eq!(fb.employee_name, None);
    }

    #[test]
    fn named_feedback_keeps_author() {
        let fb = Feedback::from(row(false));
        assert_eq!(fb.employee_id, Some(42));
        assert_eq!(fb.employee_name.as_deref(), Some("Jane Roe"));
    }
}
