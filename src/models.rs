use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    pub sub: String,
    pub role: u8, // role id
    pub exp: usize,
    pub jti: String,

    pub token_type: TokenType,
    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum TokenType {
    Access,
    Refresh,
}

/// Body of every successful mutation; the client shows `message` as a toast.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Leave approved")]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = 12)]
    pub id: Option<u64>,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            id: None,
        }
    }

    pub fn created(message: impl Into<String>, id: u64) -> Self {
        Self {
            message: message.into(),
            id: Some(id),
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReviewDecision {
    /// Optional note shown to the requester
    #[schema(example = "Approved as discussed")]
    pub remark: Option<String>,
}
