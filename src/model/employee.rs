use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr, EnumString, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EmployeeStatus {
    Active,
    Inactive,
    Terminated,
}

/// A row of the employee directory. `status` holds an [`EmployeeStatus`] value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Employee {
    pub id: u64,
    #[schema(example = "E-1042")]
    pub employee_code: String,
    #[schema(example = "Amina")]
    pub first_name: String,
    #[schema(example = "Rahman")]
    pub last_name: String,
    #[schema(example = "amina.rahman@example.com")]
    pub email: String,
    #[schema(nullable = true)]
    pub phone: Option<String>,
    pub department_id: u64,
    pub job_title_id: u64,
    #[schema(value_type = String, format = "date", example = "2023-09-18")]
    pub hire_date: NaiveDate,
    #[schema(example = "active")]
    pub status: String,
}

/// The caller's own record plus the self-service contact fields.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Profile {
    pub id: u64,
    pub employee_code: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub department_id: u64,
    pub job_title_id: u64,
    #[schema(value_type = String, format = "date")]
    pub hire_date: NaiveDate,
    pub status: String,
}
