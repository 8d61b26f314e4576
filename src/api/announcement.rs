use crate::{
    auth::{
        auth::AuthUser,
        permissions::{AccessControl, Permission},
    },
    cache::{QueryCache, Scope},
    error::ApiError,
    listing::{ListQuery, SqlFilter, fetch_page, parse_facet},
    model::{
        announcement::{Announcement, AnnouncementCategory},
        resource::Resource,
    },
    models::MessageResponse,
    utils::db_utils::{Column, ColumnKind, build_update_sql, execute_update},
    validation::validated,
};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::Value;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::ToSchema;
use validator::Validate;

const COLUMNS: &str = "id, title, body, category, author_id, published_at";

const UPDATABLE: &[Column] = &[
    Column::new("title", ColumnKind::Text(200)),
    Column::new("body", ColumnKind::Text(10_000)),
    Column::new(
        "category",
        ColumnKind::OneOf(&["general", "policy", "holiday", "urgent"]),
    ),
];

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateAnnouncement {
    #[schema(example = "Office closed on Friday")]
    #[validate(
        length(min = 1, max = 200, message = "title is required"),
        custom(function = "crate::validation::not_blank")
    )]
    pub title: String,
    #[schema(example = "The office will be closed for maintenance.")]
    #[validate(
        length(min = 1, max = 10000, message = "body is required"),
        custom(function = "crate::validation::not_blank")
    )]
    pub body: String,
    #[schema(example = "holiday")]
    pub category: AnnouncementCategory,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateAnnouncement {
    pub title: Option<String>,
    pub body: Option<String>,
    pub category: Option<AnnouncementCategory>,
}

/// List announcements, newest first
#[utoipa::path(
    get,
    path = "/api/announcements",
    params(ListQuery),
    responses(
        (status = 200, description = "Paginated announcement list", body = Object),
        (status = 400, description = "Invalid filter value")
    ),
    security(("bearer_auth" = [])),
    tag = "Announcement"
)]
pub async fn list_announcements(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    let params = query.normalize();
    let categories: Vec<AnnouncementCategory> = parse_facet("category", &params.category)?;

    cache
        .respond(Resource::Announcements, Scope::Shared, &params, || async {
            let mut filter = SqlFilter::new();
            filter
                .any_of("category", &categories)
                .search(&["title", "body"], params.search.as_deref());
            fetch_page::<Announcement>(
                pool.get_ref(),
                COLUMNS,
                "announcements",
                &filter,
                "published_at DESC, id DESC",
                &params,
            )
            .await
        })
        .await
}

/// Get an announcement
#[utoipa::path(
    get,
    path = "/api/announcements/{announcement_id}",
    params(("announcement_id" = u64, Path, description = "Announcement ID")),
    responses(
        (status = 200, description = "Announcement found", body = Announcement),
        (status = 404, description = "Announcement not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Announcement"
)]
pub async fn get_announcement(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let announcement = sqlx::query_as::<_, Announcement>(&format!(
        "SELECT {COLUMNS} FROM announcements WHERE id = ?"
    ))
    .bind(path.into_inner())
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| ApiError::not_found("Announcement"))?;

    Ok(HttpResponse::Ok().json(announcement))
}

/// Publish an announcement
#[utoipa::path(
    post,
    path = "/api/announcements",
    request_body = CreateAnnouncement,
    responses(
        (status = 201, description = "Announcement published", body = MessageResponse),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Announcement"
)]
pub async fn create_announcement(
    auth: AuthUser,
    access: web::Data<AccessControl>,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    payload: web::Json<CreateAnnouncement>,
) -> Result<HttpResponse, ApiError> {
    access.require(&auth, Permission::ManageAnnouncements).await?;
    validated(&*payload)?;

    let result = sqlx::query(
        r#"
        INSERT INTO announcements (title, body, category, author_id, published_at)
        VALUES (?, ?, ?, ?, NOW())
        "#,
    )
    .bind(payload.title.trim())
    .bind(payload.body.trim())
    .bind(payload.category.as_ref())
    .bind(auth.user_id)
    .execute(pool.get_ref())
    .await?;

    cache.invalidate(Resource::Announcements);
    info!(announcement_id = result.last_insert_id(), by = auth.user_id, "Announcement published");

    Ok(HttpResponse::Created().json(MessageResponse::created(
        "Announcement published",
        result.last_insert_id(),
    )))
}

/// Update an announcement
#[utoipa::path(
    put,
    path = "/api/announcements/{announcement_id}",
    params(("announcement_id" = u64, Path, description = "Announcement ID")),
    request_body(content = UpdateAnnouncement, description = "Any subset of the announcement fields"),
    responses(
        (status = 200, description = "Announcement updated", body = MessageResponse),
        (status = 400, description = "Unknown field or invalid value"),
        (status = 404, description = "Announcement not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Announcement"
)]
pub async fn update_announcement(
    auth: AuthUser,
    access: web::Data<AccessControl>,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    access.require(&auth, Permission::ManageAnnouncements).await?;
    let announcement_id = path.into_inner();

    let update = build_update_sql("announcements", UPDATABLE, &body, "id", announcement_id)?;
    if execute_update(pool.get_ref(), update).await? == 0 {
        ensure_exists(pool.get_ref(), announcement_id).await?;
    }

    cache.invalidate(Resource::Announcements);
    Ok(HttpResponse::Ok().json(MessageResponse::new("Announcement updated")))
}

/// Delete an announcement
#[utoipa::path(
    delete,
    path = "/api/announcements/{announcement_id}",
    params(("announcement_id" = u64, Path, description = "Announcement ID")),
    responses(
        (status = 200, description = "Announcement deleted", body = MessageResponse),
        (status = 404, description = "Announcement not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Announcement"
)]
pub async fn delete_announcement(
    auth: AuthUser,
    access: web::Data<AccessControl>,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    access.require(&auth, Permission::ManageAnnouncements).await?;

    let result = sqlx::query("DELETE FROM announcements WHERE id = ?")
        .bind(path.into_inner())
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Announcement"));
    }

    cache.invalidate(Resource::Announcements);
    Ok(HttpResponse::Ok().json(MessageResponse::new("Announcement deleted")))
}

// MySQL reports 0 affected rows when the new values equal the old ones
async fn ensure_exists(pool: &MySqlPool, announcement_id: u64) -> Result<(), ApiError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM announcements WHERE id = ?")
        .bind(announcement_id)
        .fetch_one(pool)
        .await?;
    if count == 0 {
        return Err(ApiError::not_found("Announcement"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blank_title_is_rejected() {
        let payload = CreateAnnouncement {
            title: "  ".into(),
            body: "Body".into(),
            category: AnnouncementCategory::General,
        };
        match validated(&payload) {
            Err(ApiError::Validation(fields)) => assert_eq!(fields[0].field, "title"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn update_whitelist_matches_category_values() {
        assert!(build_update_sql("announcements", UPDATABLE, &json!({"category": "urgent"}), "id", 1).is_ok());
        assert!(build_update_sql("announcements", UPDATABLE, &json!({"category": "gossip"}), "id", 1).is_err());
        assert!(build_update_sql("announcements", UPDATABLE, &json!({"author_id": 9}), "id", 1).is_err());
    }

    #[test]
    fn category_facet_rejects_unknown_values() {
        let ok: Vec<AnnouncementCategory> =
            parse_facet("category", &["policy".to_string(), "urgent".to_string()]).unwrap();
        assert_eq!(ok, vec![AnnouncementCategory::Policy, AnnouncementCategory::Urgent]);
        assert!(parse_facet::<AnnouncementCategory>("category", &["memo".to_string()]).is_err());
    }
}
