use crate::{
    api::reviewable,
    auth::{
        auth::AuthUser,
        permissions::{AccessControl, Permission},
    },
    cache::{QueryCache, Scope},
    error::ApiError,
    listing::{FilterValue, ListQuery, SqlFilter, fetch_page, parse_facet},
    model::{
        attendance::RequestStatus,
        leave_request::{LeaveRequest, LeaveType},
        resource::Resource,
    },
    models::{MessageResponse, ReviewDecision},
    validation::{check_date_range, validated},
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::{error, info};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

const SELECT: &str = "l.id, l.employee_id, CONCAT(e.first_name, ' ', e.last_name) AS employee_name, \
     l.start_date, l.end_date, l.leave_type, l.reason, l.status, l.reviewed_by, l.created_at";
const FROM: &str = "leave_requests l JOIN employees e ON e.id = l.employee_id";

#[derive(Debug, Deserialize, ToSchema, Validate)]
#[validate(schema(function = "validate_leave_dates"))]
pub struct CreateLeave {
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-01-03", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    #[schema(example = "sick")]
    pub leave_type: LeaveType,
    #[schema(example = "Flu")]
    #[validate(length(max = 500, message = "reason is too long"))]
    pub reason: Option<String>,
}

fn validate_leave_dates(leave: &CreateLeave) -> Result<(), ValidationError> {
    check_date_range(leave.start_date, leave.end_date, "end_date")
}

/// Apply for leave
#[utoipa::path(
    post,
    path = "/api/leave",
    request_body = CreateLeave,
    responses(
        (status = 201, description = "Leave request submitted", body = MessageResponse),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Overlaps an existing leave request")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn apply_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    payload: web::Json<CreateLeave>,
) -> Result<HttpResponse, ApiError> {
    let employee_id = auth.employee_id()?;
    validated(&*payload)?;

    let overlapping = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM leave_requests
        WHERE employee_id = ?
        AND status IN ('pending', 'approved')
        AND start_date <= ? AND end_date >= ?
        "#,
    )
    .bind(employee_id)
    .bind(payload.end_date)
    .bind(payload.start_date)
    .fetch_one(pool.get_ref())
    .await?;
    if overlapping > 0 {
        return Err(ApiError::Conflict(
            "Leave overlaps an existing request".to_string(),
        ));
    }

    let reason = payload
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty());

    let result = sqlx::query(
        r#"
        INSERT INTO leave_requests (employee_id, start_date, end_date, leave_type, reason)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(employee_id)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(payload.leave_type.as_ref())
    .bind(reason)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, employee_id, "Failed to submit leave request");
        ApiError::from(e)
    })?;

    cache.invalidate(Resource::Leave);
    Ok(HttpResponse::Created().json(MessageResponse::created(
        "Leave request submitted",
        result.last_insert_id(),
    )))
}

/// Caller's own leave requests
#[utoipa::path(
    get,
    path = "/api/leave/mine",
    params(ListQuery),
    responses((status = 200, description = "Paginated leave list", body = Object)),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn my_leaves(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    let employee_id = auth.employee_id()?;
    let params = query.normalize();
    let statuses: Vec<RequestStatus> = parse_facet("status", &params.status)?;
    let leave_types: Vec<LeaveType> = parse_facet("leave_type", &params.leave_type)?;

    cache
        .respond(Resource::Leave, Scope::Employee(employee_id), &params, || async {
            let mut filter = SqlFilter::new();
            filter
                .eq("l.employee_id", FilterValue::U64(employee_id))
                .any_of("l.status", &statuses)
                .any_of("l.leave_type", &leave_types)
                .search(&["l.reason"], params.search.as_deref());
            fetch_page::<LeaveRequest>(
                pool.get_ref(),
                SELECT,
                FROM,
                &filter,
                "l.start_date DESC",
                &params,
            )
            .await
        })
        .await
}

/// Cancel one of the caller's pending leave requests
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/cancel",
    params(("leave_id" = u64, Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Leave request cancelled", body = MessageResponse),
        (status = 409, description = "Leave request not found or already processed")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn cancel_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let employee_id = auth.employee_id()?;
    let leave_id = path.into_inner();

    let result = sqlx::query(
        r#"
        UPDATE leave_requests
        SET status = 'cancelled'
        WHERE id = ? AND employee_id = ? AND status = 'pending'
        "#,
    )
    .bind(leave_id)
    .bind(employee_id)
    .execute(pool.get_ref())
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::already_processed("Leave request"));
    }

    cache.invalidate(Resource::Leave);
    Ok(HttpResponse::Ok().json(MessageResponse::new("Leave request cancelled")))
}

/// Leave requests for review
#[utoipa::path(
    get,
    path = "/api/leave",
    params(ListQuery),
    responses(
        (status = 200, description = "Paginated leave list", body = Object),
        (status = 400, description = "Invalid filter value"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn list_leaves(
    auth: AuthUser,
    access: web::Data<AccessControl>,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    access.require(&auth, Permission::ReviewLeave).await?;

    let params = query.normalize();
    let statuses: Vec<RequestStatus> = parse_facet("status", &params.status)?;
    let leave_types: Vec<LeaveType> = parse_facet("leave_type", &params.leave_type)?;

    cache
        .respond(Resource::Leave, Scope::Shared, &params, || async {
            let mut filter = SqlFilter::new();
            filter
                .any_of("l.status", &statuses)
                .any_of("l.leave_type", &leave_types)
                .search(
                    &["e.first_name", "e.last_name", "e.employee_code"],
                    params.search.as_deref(),
                );
            fetch_page::<LeaveRequest>(
                pool.get_ref(),
                SELECT,
                FROM,
                &filter,
                "l.created_at DESC",
                &params,
            )
            .await
        })
        .await
}

/// Get a leave request
#[utoipa::path(
    get,
    path = "/api/leave/{leave_id}",
    params(("leave_id" = u64, Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Leave request", body = LeaveRequest),
        (status = 404, description = "Leave request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn get_leave(
    auth: AuthUser,
    access: web::Data<AccessControl>,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let leave_id = path.into_inner();

    let leave = sqlx::query_as::<_, LeaveRequest>(&format!(
        "SELECT {SELECT} FROM {FROM} WHERE l.id = ?"
    ))
    .bind(leave_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| ApiError::not_found("Leave request"))?;

    if auth.employee_id != Some(leave.employee_id) {
        access.require(&auth, Permission::ReviewLeave).await?;
    }

    Ok(HttpResponse::Ok().json(leave))
}

/// Approve a pending leave request
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/approve",
    params(("leave_id" = u64, Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Leave approved", body = MessageResponse),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Leave request not found or already processed")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn approve_leave(
    auth: AuthUser,
    access: web::Data<AccessControl>,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    access.require(&auth, Permission::ReviewLeave).await?;
    review_leave(&auth, pool.get_ref(), path.into_inner(), RequestStatus::Approved, None).await?;

    cache.invalidate(Resource::Leave);
    Ok(HttpResponse::Ok().json(MessageResponse::new("Leave approved")))
}

/// Reject a pending leave request
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/reject",
    params(("leave_id" = u64, Path, description = "Leave request ID")),
    request_body = ReviewDecision,
    responses(
        (status = 200, description = "Leave rejected", body = MessageResponse),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Leave request not found or already processed")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn reject_leave(
    auth: AuthUser,
    access: web::Data<AccessControl>,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    path: web::Path<u64>,
    decision: Option<web::Json<ReviewDecision>>,
) -> Result<HttpResponse, ApiError> {
    access.require(&auth, Permission::ReviewLeave).await?;
    let remark = decision.and_then(|d| d.into_inner().remark);
    review_leave(
        &auth,
        pool.get_ref(),
        path.into_inner(),
        RequestStatus::Rejected,
        remark.as_deref(),
    )
    .await?;

    cache.invalidate(Resource::Leave);
    Ok(HttpResponse::Ok().json(MessageResponse::new("Leave rejected")))
}

async fn review_leave(
    auth: &AuthUser,
    pool: &MySqlPool,
    leave_id: u64,
    status: RequestStatus,
    remark: Option<&str>,
) -> Result<(), ApiError> {
    let owner = sqlx::query_scalar::<_, u64>(
        "SELECT employee_id FROM leave_requests WHERE id = ? AND status = 'pending'",
    )
    .bind(leave_id)
    .fetch_optional(pool)
    .await?;
    reviewable(auth, owner, "Leave request")?;

    // status guard keeps concurrent reviews from both succeeding
    let result = sqlx::query(
        r#"
        UPDATE leave_requests
        SET status = ?, reviewed_by = ?, remark = ?, reviewed_at = NOW()
        WHERE id = ? AND status = 'pending'
        "#,
    )
    .bind(status.as_ref())
    .bind(auth.user_id)
    .bind(remark)
    .bind(leave_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::already_processed("Leave request"));
    }

    info!(leave_id, reviewer = auth.user_id, status = %status, "Leave request reviewed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::END_BEFORE_START;

    fn leave(start: (i32, u32, u32), end: (i32, u32, u32)) -> CreateLeave {
        CreateLeave {
            start_date: NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap(),
            end_date: NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
            leave_type: LeaveType::Annual,
            reason: None,
        }
    }

    #[test]
    fn end_before_start_is_reported_on_end_date() {
        match validated(&leave((2026, 3, 10), (2026, 3, 9))) {
            Err(ApiError::Validation(fields)) => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].field, "end_date");
                assert_eq!(fields[0].message, END_BEFORE_START);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn single_day_leave_is_valid() {
        assert!(validated(&leave((2026, 3, 10), (2026, 3, 10))).is_ok());
    }

    #[test]
    fn leave_type_is_parsed_from_lowercase_json() {
        let body = serde_json::json!({
            "start_date": "2026-03-10",
            "end_date": "2026-03-12",
            "leave_type": "casual"
        });
        let parsed: CreateLeave = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.leave_type, LeaveType::Casual);
        assert!(serde_json::from_value::<CreateLeave>(serde_json::json!({
            "start_date": "2026-03-10",
            "end_date": "2026-03-12",
            "leave_type": "sabbatical"
        }))
        .is_err());
    }
}
