use crate::{
    auth::{
        auth::AuthUser,
        permissions::{AccessControl, Permission},
    },
    cache::{QueryCache, Scope},
    error::ApiError,
    listing::{ListQuery, SqlFilter, fetch_page, parse_facet},
    model::{
        event::{Event, EventType},
        resource::Resource,
    },
    models::MessageResponse,
    utils::db_utils::{Column, ColumnKind, build_update_sql, execute_update},
    validation::{check_datetime_range, checked, validated},
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::Value;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

const COLUMNS: &str = "id, title, description, location, event_type, start_time, end_time, created_by";

const UPDATABLE: &[Column] = &[
    Column::new("title", ColumnKind::Text(200)),
    Column::nullable("description", ColumnKind::Text(10_000)),
    Column::nullable("location", ColumnKind::Text(200)),
    Column::new(
        "event_type",
        ColumnKind::OneOf(&["meeting", "training", "celebration", "holiday"]),
    ),
    Column::new("start_time", ColumnKind::DateTime),
    Column::new("end_time", ColumnKind::DateTime),
];

#[derive(Debug, Deserialize, ToSchema, Validate)]
#[validate(schema(function = "validate_event_times"))]
pub struct CreateEvent {
    #[schema(example = "Quarterly town hall")]
    #[validate(
        length(min = 1, max = 200, message = "title is required"),
        custom(function = "crate::validation::not_blank")
    )]
    pub title: String,
    pub description: Option<String>,
    #[schema(example = "Main hall")]
    #[validate(length(max = 200, message = "location is too long"))]
    pub location: Option<String>,
    #[schema(example = "meeting")]
    pub event_type: EventType,
    #[schema(value_type = String, example = "2026-02-01T10:00:00")]
    pub start_time: NaiveDateTime,
    #[schema(value_type = String, example = "2026-02-01T12:00:00")]
    pub end_time: NaiveDateTime,
}

fn validate_event_times(event: &CreateEvent) -> Result<(), ValidationError> {
    check_datetime_range(event.start_time, event.end_time, "end_time")
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateEvent {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub event_type: Option<EventType>,
    #[schema(value_type = Option<String>, example = "2026-02-01T10:00:00")]
    pub start_time: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>, example = "2026-02-01T12:00:00")]
    pub end_time: Option<NaiveDateTime>,
}

/// Reads a timestamp out of a partial update body, if present and well formed.
fn time_field(body: &Value, key: &str) -> Option<NaiveDateTime> {
    body.get(key)
        .and_then(Value::as_str)
        .and_then(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").ok())
}

/// List events, upcoming first
#[utoipa::path(
    get,
    path = "/api/events",
    params(ListQuery),
    responses(
        (status = 200, description = "Paginated event list", body = Object),
        (status = 400, description = "Invalid filter value")
    ),
    security(("bearer_auth" = [])),
    tag = "Event"
)]
pub async fn list_events(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    let params = query.normalize();
    let event_types: Vec<EventType> = parse_facet("event_type", &params.event_type)?;

    cache
        .respond(Resource::Events, Scope::Shared, &params, || async {
            let mut filter = SqlFilter::new();
            filter
                .any_of("event_type", &event_types)
                .search(&["title", "location"], params.search.as_deref());
            fetch_page::<Event>(
                pool.get_ref(),
                COLUMNS,
                "events",
                &filter,
                "start_time DESC",
                &params,
            )
            .await
        })
        .await
}

/// Get an event
#[utoipa::path(
    get,
    path = "/api/events/{event_id}",
    params(("event_id" = u64, Path, description = "Event ID")),
    responses(
        (status = 200, description = "Event found", body = Event),
        (status = 404, description = "Event not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Event"
)]
pub async fn get_event(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let event = fetch_event(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(event))
}

/// Create an event
#[utoipa::path(
    post,
    path = "/api/events",
    request_body = CreateEvent,
    responses(
        (status = 201, description = "Event created", body = MessageResponse),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Event"
)]
pub async fn create_event(
    auth: AuthUser,
    access: web::Data<AccessControl>,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    payload: web::Json<CreateEvent>,
) -> Result<HttpResponse, ApiError> {
    access.require(&auth, Permission::ManageEvents).await?;
    validated(&*payload)?;

    let result = sqlx::query(
        r#"
        INSERT INTO events (title, description, location, event_type, start_time, end_time, created_by)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.title.trim())
    .bind(payload.description.as_deref())
    .bind(payload.location.as_deref())
    .bind(payload.event_type.as_ref())
    .bind(payload.start_time)
    .bind(payload.end_time)
    .bind(auth.user_id)
    .execute(pool.get_ref())
    .await?;

    cache.invalidate(Resource::Events);
    info!(event_id = result.last_insert_id(), by = auth.user_id, "Event created");

    Ok(HttpResponse::Created().json(MessageResponse::created(
        "Event created",
        result.last_insert_id(),
    )))
}

/// Update an event; a changed start or end time is checked against the stored one
#[utoipa::path(
    put,
    path = "/api/events/{event_id}",
    params(("event_id" = u64, Path, description = "Event ID")),
    request_body(content = UpdateEvent, description = "Any subset of the event fields"),
    responses(
        (status = 200, description = "Event updated", body = MessageResponse),
        (status = 400, description = "Unknown field or invalid value"),
        (status = 404, description = "Event not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Event"
)]
pub async fn update_event(
    auth: AuthUser,
    access: web::Data<AccessControl>,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    access.require(&auth, Permission::ManageEvents).await?;
    let event_id = path.into_inner();

    let update = build_update_sql("events", UPDATABLE, &body, "id", event_id)?;

    let current = fetch_event(pool.get_ref(), event_id).await?;
    let start = time_field(&body, "start_time").unwrap_or(current.start_time);
    let end = time_field(&body, "end_time").unwrap_or(current.end_time);
    checked(check_datetime_range(start, end, "end_time"))?;

    execute_update(pool.get_ref(), update).await?;

    cache.invalidate(Resource::Events);
    Ok(HttpResponse::Ok().json(MessageResponse::new("Event updated")))
}

/// Delete an event
#[utoipa::path(
    delete,
    path = "/api/events/{event_id}",
    params(("event_id" = u64, Path, description = "Event ID")),
    responses(
        (status = 200, description = "Event deleted", body = MessageResponse),
        (status = 404, description = "Event not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Event"
)]
pub async fn delete_event(
    auth: AuthUser,
    access: web::Data<AccessControl>,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    access.require(&auth, Permission::ManageEvents).await?;

    let result = sqlx::query("DELETE FROM events WHERE id = ?")
        .bind(path.into_inner())
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Event"));
    }

    cache.invalidate(Resource::Events);
    Ok(HttpResponse::Ok().json(MessageResponse::new("Event deleted")))
}

async fn fetch_event(pool: &MySqlPool, event_id: u64) -> Result<Event, ApiError> {
    sqlx::query_as::<_, Event>(&format!("SELECT {COLUMNS} FROM events WHERE id = ?"))
        .bind(event_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Event"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::END_BEFORE_START;
    use serde_json::json;

    fn at(hour: u32) -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2026, 2, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn event(start: u32, end: u32) -> CreateEvent {
        CreateEvent {
            title: "Town hall".into(),
            description: None,
            location: Some("Main hall".into()),
            event_type: EventType::Meeting,
            start_time: at(start),
            end_time: at(end),
        }
    }

    #[test]
    fn end_before_start_is_reported_on_end_time() {
        match validated(&event(12, 10)) {
            Err(ApiError::Validation(fields)) => {
                assert_eq!(fields[0].field, "end_time");
                assert_eq!(fields[0].message, END_BEFORE_START);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(validated(&event(10, 12)).is_ok());
    }

    #[test]
    fn partial_update_times_are_read_from_body() {
        let body = json!({ "end_time": "2026-02-01T09:00:00", "title": "Moved" });
        assert_eq!(time_field(&body, "end_time"), Some(at(9)));
        assert_eq!(time_field(&body, "start_time"), None);
    }

    #[test]
    fn event_type_is_whitelisted_on_update() {
        assert!(build_update_sql("events", UPDATABLE, &json!({"event_type": "party"}), "id", 3).is_err());
        assert!(build_update_sql("events", UPDATABLE, &json!({"event_type": "training"}), "id", 3).is_ok());
    }
}
