use crate::{
    auth::{
        auth::AuthUser,
        permissions::{AccessControl, Permission},
    },
    cache::{QueryCache, Scope},
    error::ApiError,
    listing::{FilterValue, ListParams, ListQuery, Page, SqlFilter, fetch_page, parse_facet},
    model::{
        feedback::{Feedback, FeedbackCategory, FeedbackRow, FeedbackStatus},
        resource::Resource,
    },
    models::MessageResponse,
    validation::validated,
};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::ToSchema;
use validator::Validate;

const SELECT: &str = "f.id, f.employee_id, CONCAT(e.first_name, ' ', e.last_name) AS employee_name, \
     f.subject, f.message, f.category, f.anonymous, f.status, f.response, f.created_at";
const FROM: &str = "feedback f JOIN employees e ON e.id = f.employee_id";

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SubmitFeedback {
    #[schema(example = "Parking space")]
    #[validate(
        length(min = 1, max = 200, message = "subject is required"),
        custom(function = "crate::validation::not_blank")
    )]
    pub subject: String,
    #[schema(example = "We need more parking spots near the entrance.")]
    #[validate(
        length(min = 1, max = 5000, message = "message is required"),
        custom(function = "crate::validation::not_blank")
    )]
    pub message: String,
    #[schema(example = "workplace")]
    pub category: FeedbackCategory,
    #[serde(default)]
    pub anonymous: bool,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct RespondFeedback {
    #[schema(example = "Thanks, we've reserved two more spots.")]
    #[validate(
        length(min = 1, max = 5000, message = "response is required"),
        custom(function = "crate::validation::not_blank")
    )]
    pub response: String,
}

fn into_feedback_page(page: Page<FeedbackRow>) -> Page<Feedback> {
    Page {
        data: page.data.into_iter().map(Feedback::from).collect(),
        pagination: page.pagination,
    }
}

async fn load_feedback(
    pool: &MySqlPool,
    filter: &SqlFilter,
    params: &ListParams,
) -> Result<Page<Feedback>, ApiError> {
    fetch_page::<FeedbackRow>(pool, SELECT, FROM, filter, "f.created_at DESC", params)
        .await
        .map(into_feedback_page)
}

/// Submit feedback, optionally anonymously
#[utoipa::path(
    post,
    path = "/api/feedback",
    request_body = SubmitFeedback,
    responses(
        (status = 201, description = "Feedback submitted", body = MessageResponse),
        (status = 400, description = "Validation failed")
    ),
    security(("bearer_auth" = [])),
    tag = "Feedback"
)]
pub async fn submit_feedback(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    payload: web::Json<SubmitFeedback>,
) -> Result<HttpResponse, ApiError> {
    let employee_id = auth.employee_id()?;
    validated(&*payload)?;

    let result = sqlx::query(
        r#"
        INSERT INTO feedback (employee_id, subject, message, category, anonymous)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(employee_id)
    .bind(payload.subject.trim())
    .bind(payload.message.trim())
    .bind(payload.category.as_ref())
    .bind(payload.anonymous)
    .execute(pool.get_ref())
    .await?;

    cache.invalidate(Resource::Feedback);
    Ok(HttpResponse::Created().json(MessageResponse::created(
        "Feedback submitted",
        result.last_insert_id(),
    )))
}

/// Caller's own feedback, including anonymous submissions
#[utoipa::path(
    get,
    path = "/api/feedback/mine",
    params(ListQuery),
    responses((status = 200, description = "Paginated feedback list", body = Object)),
    security(("bearer_auth" = [])),
    tag = "Feedback"
)]
pub async fn my_feedback(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    let employee_id = auth.employee_id()?;
    let params = query.normalize();
    let statuses: Vec<FeedbackStatus> = parse_facet("status", &params.status)?;
    let categories: Vec<FeedbackCategory> = parse_facet("category", &params.category)?;

    cache
        .respond(Resource::Feedback, Scope::Employee(employee_id), &params, || async {
            let mut filter = SqlFilter::new();
            filter
                .eq("f.employee_id", FilterValue::U64(employee_id))
                .any_of("f.status", &statuses)
                .any_of("f.category", &categories)
                .search(&["f.subject"], params.search.as_deref());
            load_feedback(pool.get_ref(), &filter, &params).await
        })
        .await
}

/// Feedback for review; anonymous authors are hidden
#[utoipa::path(
    get,
    path = "/api/feedback",
    params(ListQuery),
    responses(
        (status = 200, description = "Paginated feedback list", body = Object),
        (status = 400, description = "Invalid filter value"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Feedback"
)]
pub async fn list_feedback(
    auth: AuthUser,
    access: web::Data<AccessControl>,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    access.require(&auth, Permission::ReviewFeedback).await?;

    let params = query.normalize();
    let statuses: Vec<FeedbackStatus> = parse_facet("status", &params.status)?;
    let categories: Vec<FeedbackCategory> = parse_facet("category", &params.category)?;

    cache
        .respond(Resource::Feedback, Scope::Shared, &params, || async {
            let mut filter = SqlFilter::new();
            filter
                .any_of("f.status", &statuses)
                .any_of("f.category", &categories)
                .search(&["f.subject"], params.search.as_deref());
            load_feedback(pool.get_ref(), &filter, &params).await
        })
        .await
}

/// Respond to open feedback, resolving it
#[utoipa::path(
    put,
    path = "/api/feedback/{feedback_id}/respond",
    params(("feedback_id" = u64, Path, description = "Feedback ID")),
    request_body = RespondFeedback,
    responses(
        (status = 200, description = "Feedback resolved", body = MessageResponse),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Feedback not found or already processed")
    ),
    security(("bearer_auth" = [])),
    tag = "Feedback"
)]
pub async fn respond_feedback(
    auth: AuthUser,
    access: web::Data<AccessControl>,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    path: web::Path<u64>,
    payload: web::Json<RespondFeedback>,
) -> Result<HttpResponse, ApiError> {
    access.require(&auth, Permission::ReviewFeedback).await?;
    validated(&*payload)?;
    let feedback_id = path.into_inner();

    let result = sqlx::query(
        r#"
        UPDATE feedback
        SET status = 'resolved', response = ?, responded_by = ?, responded_at = NOW()
        WHERE id = ? AND status = 'open'
        "#,
    )
    .bind(payload.response.trim())
    .bind(auth.user_id)
    .bind(feedback_id)
    .execute(pool.get_ref())
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::already_processed("Feedback"));
    }

    cache.invalidate(Resource::Feedback);
    info!(feedback_id, by = auth.user_id, "Feedback resolved");

    Ok(HttpResponse::Ok().json(MessageResponse::new("Feedback resolved")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::Pagination;

    #[test]
    fn anonymous_flag_defaults_to_false() {
        let parsed: SubmitFeedback = serde_json::from_value(serde_json::json!({
            "subject": "Coffee",
            "message": "Please get a better machine",
            "category": "suggestion"
        }))
        .unwrap();
        assert!(!parsed.anonymous);
        assert!(validated(&parsed).is_ok());
    }

    #[test]
    fn page_conversion_hides_anonymous_authors() {
        let row = FeedbackRow {
            id: 5,
            employee_id: 9,
            employee_name: "Jane Roe".into(),
            subject: "Noise".into(),
            message: "Open office is loud".into(),
            category: "workplace".into(),
            anonymous: true,
            status: "open".into(),
            response: None,
            created_at: None,
        };
        let page = into_feedback_page(Page {
            data: vec![row],
            pagination: Pagination::new(1, 10, 1),
        });
        assert_eq!(page.data[0].employee_id, None);
        assert_eq!(page.pagination.total_count, 1);
    }

    #[test]
    fn blank_response_is_rejected() {
        let payload = RespondFeedback { response: " ".into() };
        assert!(matches!(validated(&payload), Err(ApiError::Validation(_))));
    }
}
