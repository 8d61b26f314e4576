use crate::{
    auth::auth::AuthUser,
    cache::{QueryCache, Scope},
    db::is_constraint_violation,
    error::ApiError,
    listing::{FilterValue, ListQuery, SqlFilter, fetch_page},
    model::{attendance::Attendance, resource::Resource},
    models::MessageResponse,
};
use actix_web::{HttpResponse, web};
use sqlx::MySqlPool;

/// Check-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance",
    responses(
        (status = 200, description = "Checked in successfully", body = MessageResponse),
        (status = 409, description = "Already checked in today", body = Object, example = json!({
            "message": "Already checked in today"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_in(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
) -> Result<HttpResponse, ApiError> {
    let employee_id = auth.employee_id()?;

    let result = sqlx::query(
        r#"
        INSERT INTO attendance (employee_id, date, check_in)
        VALUES (?, CURDATE(), CURTIME())
        "#,
    )
    .bind(employee_id)
    .execute(pool.get_ref())
    .await;

    match result {
        Ok(_) => {
            cache.invalidate(Resource::Attendance);
            Ok(HttpResponse::Ok().json(MessageResponse::new("Checked in successfully")))
        }
        // unique (employee_id, date)
        Err(e) if is_constraint_violation(&e) => {
            Err(ApiError::Conflict("Already checked in today".to_string()))
        }
        Err(e) => {
            tracing::error!(error = %e, employee_id, "Check-in failed");
            Err(ApiError::from(e))
        }
    }
}

/// Check-out endpoint
#[utoipa::path(
    put,
    path = "/api/attendance",
    responses(
        (status = 200, description = "Checked out successfully", body = MessageResponse),
        (status = 400, description = "No active check-in found for today", body = Object, example = json!({
            "message": "No active check-in found for today"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_out(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
) -> Result<HttpResponse, ApiError> {
    let employee_id = auth.employee_id()?;

    let result = sqlx::query(
        r#"
        UPDATE attendance
        SET check_out = CURTIME()
        WHERE employee_id = ?
        AND date = CURDATE()
        AND check_out IS NULL
        "#,
    )
    .bind(employee_id)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        tracing::error!(error = %e, employee_id, "Check-out failed");
        ApiError::from(e)
    })?;

    if result.rows_affected() == 0 {
        return Err(ApiError::BadRequest(
            "No active check-in found for today".to_string(),
        ));
    }

    cache.invalidate(Resource::Attendance);
    Ok(HttpResponse::Ok().json(MessageResponse::new("Checked out successfully")))
}

/// Caller's own attendance history, newest first
#[utoipa::path(
    get,
    path = "/api/attendance/me",
    params(ListQuery),
    responses(
        (status = 200, description = "Paginated attendance list", body = Object),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn my_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    let employee_id = auth.employee_id()?;
    let params = query.normalize();

    cache
        .respond(
            Resource::Attendance,
            Scope::Employee(employee_id),
            &params,
            || async {
                let mut filter = SqlFilter::new();
                filter.eq("employee_id", FilterValue::U64(employee_id));

                fetch_page::<Attendance>(
                    pool.get_ref(),
                    "id, employee_id, date, check_in, check_out",
                    "attendance",
                    &filter,
                    "date DESC",
                    &params,
                )
                .await
            },
        )
        .await
}
