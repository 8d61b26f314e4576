use crate::{
    auth::{
        auth::AuthUser,
        password::{hash_password, verify_password},
    },
    cache::QueryCache,
    error::ApiError,
    model::{employee::Profile, resource::Resource},
    models::MessageResponse,
    validation::validated,
};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::{info, instrument};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct UpdateContact {
    #[schema(example = "+8801712345678")]
    #[validate(length(max = 32, message = "phone is too long"))]
    pub phone: Option<String>,
    #[schema(example = "House 12, Road 4, Dhaka")]
    #[validate(length(max = 255, message = "address is too long"))]
    pub address: Option<String>,
    #[schema(example = "Jane Doe, +8801812345678")]
    #[validate(length(max = 255, message = "emergency contact is too long"))]
    pub emergency_contact: Option<String>,
}

#[derive(Deserialize, ToSchema, Validate)]
pub struct ChangePassword {
    pub current_password: String,
    #[validate(length(min = 8, max = 128, message = "password must be at least 8 characters"))]
    pub new_password: String,
}

fn trimmed(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// The caller's own employee profile
#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "Profile", body = Profile),
        (status = 403, description = "No employee profile")
    ),
    security(("bearer_auth" = [])),
    tag = "Profile"
)]
pub async fn get_profile(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> Result<HttpResponse, ApiError> {
    let employee_id = auth.employee_id()?;

    let profile = sqlx::query_as::<_, Profile>(
        r#"
        SELECT id, employee_code, first_name, last_name, email, phone, address,
               emergency_contact, department_id, job_title_id, hire_date, status
        FROM employees
        WHERE id = ?
        "#,
    )
    .bind(employee_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| ApiError::not_found("Profile"))?;

    Ok(HttpResponse::Ok().json(profile))
}

/// Update the caller's contact fields; blank values clear the field
#[utoipa::path(
    put,
    path = "/api/me",
    request_body = UpdateContact,
    responses(
        (status = 200, description = "Profile updated", body = MessageResponse),
        (status = 400, description = "Validation failed")
    ),
    security(("bearer_auth" = [])),
    tag = "Profile"
)]
pub async fn update_profile(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    payload: web::Json<UpdateContact>,
) -> Result<HttpResponse, ApiError> {
    let employee_id = auth.employee_id()?;
    validated(&*payload)?;

    sqlx::query(
        r#"
        UPDATE employees
        SET phone = ?, address = ?, emergency_contact = ?
        WHERE id = ?
        "#,
    )
    .bind(trimmed(&payload.phone))
    .bind(trimmed(&payload.address))
    .bind(trimmed(&payload.emergency_contact))
    .bind(employee_id)
    .execute(pool.get_ref())
    .await?;

    // phone shows up in the employee table
    cache.invalidate(Resource::Employees);
    Ok(HttpResponse::Ok().json(MessageResponse::new("Profile updated")))
}

/// Change the caller's password after verifying the current one
#[utoipa::path(
    put,
    path = "/api/me/password",
    request_body = ChangePassword,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Validation failed"),
        (status = 401, description = "Current password is incorrect")
    ),
    security(("bearer_auth" = [])),
    tag = "Profile"
)]
#[instrument(name = "change_password", skip(pool, payload), fields(user_id = auth.user_id))]
pub async fn change_password(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<ChangePassword>,
) -> Result<HttpResponse, ApiError> {
    validated(&*payload)?;

    let stored = sqlx::query_scalar::<_, String>("SELECT password FROM users WHERE id = ?")
        .bind(auth.user_id)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    if !verify_password(&payload.current_password, &stored) {
        info!("Password change refused: current password mismatch");
        return Err(ApiError::Unauthorized(
            "Current password is incorrect".to_string(),
        ));
    }

    let hashed = hash_password(&payload.new_password)?;
    sqlx::query("UPDATE users SET password = ? WHERE id = ?")
        .bind(&hashed)
        .bind(auth.user_id)
        .execute(pool.get_ref())
        .await?;

    // sign out other sessions
    sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = ? AND revoked = FALSE")
        .bind(auth.user_id)
        .execute(pool.get_ref())
        .await?;

    info!("Password changed");
    Ok(HttpResponse::Ok().json(MessageResponse::new("Password changed")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_contact_values_clear_the_field() {
        assert_eq!(trimmed(&Some("   ".into())), None);
        assert_eq!(trimmed(&Some(" +880 ".into())), Some("+880"));
        assert_eq!(trimmed(&None), None);
    }

    #[test]
    fn short_new_password_is_rejected() {
        let payload = ChangePassword {
            current_password: "old-password".into(),
            new_password: "short".into(),
        };
        match validated(&payload) {
            Err(ApiError::Validation(fields)) => assert_eq!(fields[0].field, "new_password"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
