use serde::Deserialize;
use sqlx::FromRow;
use validator::Validate;

/// Self-registration. Accounts are linked to an employee record by HR afterwards,
/// so any extra field such as `employee_id` is refused.
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RegisterReq {
    #[validate(length(min = 3, max = 64, message = "username must be 3-64 characters"))]
    pub username: String,
    #[validate(length(min = 8, max = 128, message = "password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginReq {
    pub username: String,
    pub password: String,
}

#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: u64,
    pub username: String,
    pub password: String,
    pub role_id: u8,
    pub employee_id: Option<u64>,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registration_cannot_claim_an_employee() {
        let claimed = serde_json::from_value::<RegisterReq>(json!({
            "username": "mallory",
            "password": "hunter2hunter2",
            "employee_id": 1
        }));
        assert!(claimed.is_err());

        let plain = serde_json::from_value::<RegisterReq>(json!({
            "username": "mallory",
            "password": "hunter2hunter2"
        }))
        .unwrap();
        assert!(plain.validate().is_ok());
    }
}
