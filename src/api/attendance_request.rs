use crate::{
    api::{ensure_not_own, reviewable},
    auth::{
        auth::AuthUser,
        permissions::{AccessControl, Permission},
    },
    cache::{QueryCache, Scope},
    error::ApiError,
    listing::{FilterValue, ListQuery, SqlFilter, fetch_page, parse_facet},
    model::{
        attendance::{AttendanceRequest, RequestStatus},
        resource::Resource,
    },
    models::{MessageResponse, ReviewDecision},
    validation::{check_time_order, field_error, validated},
};
use actix_web::{HttpResponse, web};
use chrono::{NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

const SELECT: &str = "r.id, r.employee_id, CONCAT(e.first_name, ' ', e.last_name) AS employee_name, \
     r.date, r.check_in, r.check_out, r.reason, r.status, r.reviewed_by, r.remark, r.created_at";
const FROM: &str = "attendance_requests r JOIN employees e ON e.id = r.employee_id";

#[derive(Debug, Deserialize, ToSchema, Validate)]
#[validate(schema(function = "validate_correction"))]
pub struct CreateAttendanceRequest {
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub date: NaiveDate,
    #[schema(example = "09:00:00", value_type = Option<String>)]
    pub check_in: Option<NaiveTime>,
    #[schema(example = "18:00:00", value_type = Option<String>)]
    pub check_out: Option<NaiveTime>,
    #[schema(example = "Forgot to check in")]
    #[validate(
        length(min = 1, max = 500, message = "reason is required"),
        custom(function = "crate::validation::not_blank")
    )]
    pub reason: String,
}

fn validate_correction(req: &CreateAttendanceRequest) -> Result<(), ValidationError> {
    if req.check_in.is_none() && req.check_out.is_none() {
        return Err(field_error(
            "check_in",
            "required",
            "check-in or check-out time is required",
        ));
    }
    if req.date > Utc::now().date_naive() {
        return Err(field_error(
            "date",
            "future",
            "attendance cannot be corrected for a future date",
        ));
    }
    check_time_order(req.check_in, req.check_out)
}

/// Submit an attendance correction request
#[utoipa::path(
    post,
    path = "/api/attendance-requests",
    request_body = CreateAttendanceRequest,
    responses(
        (status = 201, description = "Request submitted", body = MessageResponse),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "A request for this date is already pending")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn create_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    payload: web::Json<CreateAttendanceRequest>,
) -> Result<HttpResponse, ApiError> {
    let employee_id = auth.employee_id()?;
    validated(&*payload)?;

    let pending = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM attendance_requests WHERE employee_id = ? AND date = ? AND status = 'pending'",
    )
    .bind(employee_id)
    .bind(payload.date)
    .fetch_one(pool.get_ref())
    .await?;
    if pending > 0 {
        return Err(ApiError::Conflict(
            "A request for this date is already pending".to_string(),
        ));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO attendance_requests (employee_id, date, check_in, check_out, reason)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(employee_id)
    .bind(payload.date)
    .bind(payload.check_in)
    .bind(payload.check_out)
    .bind(payload.reason.trim())
    .execute(pool.get_ref())
    .await?;

    cache.invalidate(Resource::AttendanceRequests);
    Ok(HttpResponse::Created().json(MessageResponse::created(
        "Attendance request submitted",
        result.last_insert_id(),
    )))
}

/// Caller's own attendance requests
#[utoipa::path(
    get,
    path = "/api/attendance-requests/mine",
    params(ListQuery),
    responses((status = 200, description = "Paginated request list", body = Object)),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn my_requests(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    let employee_id = auth.employee_id()?;
    let params = query.normalize();
    let statuses: Vec<RequestStatus> = parse_facet("status", &params.status)?;

    cache
        .respond(
            Resource::AttendanceRequests,
            Scope::Employee(employee_id),
            &params,
            || async {
                let mut filter = SqlFilter::new();
                filter
                    .eq("r.employee_id", FilterValue::U64(employee_id))
                    .any_of("r.status", &statuses)
                    .search(&["r.reason"], params.search.as_deref());
                fetch_page::<AttendanceRequest>(
                    pool.get_ref(),
                    SELECT,
                    FROM,
                    &filter,
                    "r.created_at DESC",
                    &params,
                )
                .await
            },
        )
        .await
}

/// Attendance requests awaiting or past review
#[utoipa::path(
    get,
    path = "/api/attendance-requests",
    params(ListQuery),
    responses(
        (status = 200, description = "Paginated request list", body = Object),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn list_requests(
    auth: AuthUser,
    access: web::Data<AccessControl>,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    access.require(&auth, Permission::ReviewAttendance).await?;

    let params = query.normalize();
    let statuses: Vec<RequestStatus> = parse_facet("status", &params.status)?;

    cache
        .respond(Resource::AttendanceRequests, Scope::Shared, &params, || async {
            let mut filter = SqlFilter::new();
            filter.any_of("r.status", &statuses).search(
                &["e.first_name", "e.last_name", "e.employee_code", "r.reason"],
                params.search.as_deref(),
            );
            fetch_page::<AttendanceRequest>(
                pool.get_ref(),
                SELECT,
                FROM,
                &filter,
                "r.created_at DESC",
                &params,
            )
            .await
        })
        .await
}

/// Approve a request and write the corrected times into attendance
#[utoipa::path(
    put,
    path = "/api/attendance-requests/{request_id}/approve",
    params(("request_id" = u64, Path, description = "Attendance request ID")),
    request_body = ReviewDecision,
    responses(
        (status = 200, description = "Request approved", body = MessageResponse),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Request not found or already processed")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn approve_request(
    auth: AuthUser,
    access: web::Data<AccessControl>,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    path: web::Path<u64>,
    decision: Option<web::Json<ReviewDecision>>,
) -> Result<HttpResponse, ApiError> {
    access.require(&auth, Permission::ReviewAttendance).await?;
    let request_id = path.into_inner();
    let remark = decision.and_then(|d| d.into_inner().remark);

    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, (u64, NaiveDate, Option<NaiveTime>, Option<NaiveTime>)>(
        r#"
        SELECT employee_id, date, check_in, check_out
        FROM attendance_requests
        WHERE id = ? AND status = 'pending'
        FOR UPDATE
        "#,
    )
    .bind(request_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::already_processed("Attendance request"))?;

    let (employee_id, date, check_in, check_out) = row;
    ensure_not_own(&auth, employee_id)?;

    sqlx::query(
        r#"
        UPDATE attendance_requests
        SET status = 'approved', reviewed_by = ?, remark = ?, reviewed_at = NOW()
        WHERE id = ?
        "#,
    )
    .bind(auth.user_id)
    .bind(remark.as_deref())
    .bind(request_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO attendance (employee_id, date, check_in, check_out)
        VALUES (?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE
            check_in = COALESCE(VALUES(check_in), check_in),
            check_out = COALESCE(VALUES(check_out), check_out)
        "#,
    )
    .bind(employee_id)
    .bind(date)
    .bind(check_in)
    .bind(check_out)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    cache.invalidate(Resource::AttendanceRequests);
    cache.invalidate(Resource::Attendance);
    info!(request_id, reviewer = auth.user_id, "Attendance request approved");

    Ok(HttpResponse::Ok().json(MessageResponse::new("Attendance request approved")))
}

/// Reject a pending request
#[utoipa::path(
    put,
    path = "/api/attendance-requests/{request_id}/reject",
    params(("request_id" = u64, Path, description = "Attendance request ID")),
    request_body = ReviewDecision,
    responses(
        (status = 200, description = "Request rejected", body = MessageResponse),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Request not found or already processed")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn reject_request(
    auth: AuthUser,
    access: web::Data<AccessControl>,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    path: web::Path<u64>,
    decision: Option<web::Json<ReviewDecision>>,
) -> Result<HttpResponse, ApiError> {
    access.require(&auth, Permission::ReviewAttendance).await?;
    let request_id = path.into_inner();
    let remark = decision.and_then(|d| d.into_inner().remark);

    let owner = sqlx::query_scalar::<_, u64>(
        "SELECT employee_id FROM attendance_requests WHERE id = ? AND status = 'pending'",
    )
    .bind(request_id)
    .fetch_optional(pool.get_ref())
    .await?;
    reviewable(&auth, owner, "Attendance request")?;

    let result = sqlx::query(
        r#"
        UPDATE attendance_requests
        SET status = 'rejected', reviewed_by = ?, remark = ?, reviewed_at = NOW()
        WHERE id = ? AND status = 'pending'
        "#,
    )
    .bind(auth.user_id)
    .bind(remark.as_deref())
    .bind(request_id)
    .execute(pool.get_ref())
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::already_processed("Attendance request"));
    }

    cache.invalidate(Resource::AttendanceRequests);
    info!(request_id, reviewer = auth.user_id, "Attendance request rejected");

    Ok(HttpResponse::Ok().json(MessageResponse::new("Attendance request rejected")))
}
