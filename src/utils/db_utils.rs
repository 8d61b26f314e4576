use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use sqlx::{Executor, MySql};
use validator::ValidateEmail;

use crate::error::ApiError;

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Null,
}

/// How a whitelisted column accepts JSON input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Non-blank text of at most this many characters
    Text(usize),
    Email,
    /// Text restricted to the listed values
    OneOf(&'static [&'static str]),
    Id,
    Date,
    DateTime,
    Bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
}

impl Column {
    pub const fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
        }
    }

    pub const fn nullable(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            kind,
            nullable: true,
        }
    }
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

fn convert(column: &Column, value: &Value) -> Result<SqlValue, ApiError> {
    let invalid = || ApiError::BadRequest(format!("Invalid value for field {}", column.name));

    if value.is_null() {
        return if column.nullable {
            Ok(SqlValue::Null)
        } else {
            Err(ApiError::BadRequest(format!("{} cannot be null", column.name)))
        };
    }

    match column.kind {
        ColumnKind::Text(max) => {
            let s = value.as_str().ok_or_else(invalid)?;
            if s.trim().is_empty() {
                return Err(ApiError::BadRequest(format!("{} must not be blank", column.name)));
            }
            if s.chars().count() > max {
                return Err(ApiError::BadRequest(format!(
                    "{} must be at most {max} characters",
                    column.name
                )));
            }
            Ok(SqlValue::String(s.to_string()))
        }
        ColumnKind::Email => {
            let s = value.as_str().ok_or_else(invalid)?.trim();
            if !s.validate_email() || s.chars().count() > 255 {
                return Err(ApiError::BadRequest(format!("{} is not a valid email", column.name)));
            }
            Ok(SqlValue::String(s.to_string()))
        }
        ColumnKind::OneOf(allowed) => {
            let s = value.as_str().ok_or_else(invalid)?;
            if allowed.contains(&s) {
                Ok(SqlValue::String(s.to_string()))
            } else {
                Err(ApiError::BadRequest(format!(
                    "Invalid {}. Allowed: {}",
                    column.name,
                    allowed.join(", ")
                )))
            }
        }
        ColumnKind::Id => value.as_u64().map(SqlValue::U64).ok_or_else(invalid),
        ColumnKind::Date => value
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .map(SqlValue::Date)
            .ok_or_else(invalid),
        ColumnKind::DateTime => value
            .as_str()
            .and_then(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").ok())
            .map(SqlValue::DateTime)
            .ok_or_else(invalid),
        ColumnKind::Bool => value.as_bool().map(SqlValue::Bool).ok_or_else(invalid),
    }
}

/// ===============================
/// Build dynamic UPDATE SQL
/// ===============================
/// Only columns listed in `columns` may be updated; any other key is rejected.
pub fn build_update_sql(
    table: &str,
    columns: &[Column],
    payload: &Value,
    id_column: &str,
    id_value: u64,
) -> Result<SqlUpdate, ApiError> {
    let obj = payload
        .as_object()
        .ok_or_else(|| ApiError::BadRequest("Payload must be a JSON object".to_string()))?;

    if obj.is_empty() {
        return Err(ApiError::BadRequest("No fields provided for update".to_string()));
    }

    let mut assignments = Vec::with_capacity(obj.len());
    let mut values = Vec::with_capacity(obj.len() + 1);

    for (key, value) in obj {
        let column = columns
            .iter()
            .find(|c| c.name == key)
            .ok_or_else(|| ApiError::BadRequest(format!("Field {key} cannot be updated")))?;

        assignments.push(format!("{} = ?", column.name));
        values.push(convert(column, value)?);
    }

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        table,
        assignments.join(", "),
        id_column
    );

    // WHERE id = ?
    values.push(SqlValue::U64(id_value));

    Ok(SqlUpdate { sql, values })
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update<'e, E>(executor: E, update: SqlUpdate) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = MySql>,
{
    let mut query = sqlx::query(&update.sql);

    for value in update.values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
            SqlValue::F64(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::DateTime(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }

    let result = query.execute(executor).await?;
    Ok(result.rows_affected())
}
