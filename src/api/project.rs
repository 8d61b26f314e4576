use crate::{
    auth::{
        auth::AuthUser,
        permissions::{AccessControl, Permission},
    },
    cache::{QueryCache, Scope},
    db::is_constraint_violation,
    error::ApiError,
    listing::{ListQuery, SqlFilter, fetch_page, parse_facet},
    model::{
        project::{Project, ProjectDetail, ProjectMember, ProjectStatus},
        resource::Resource,
    },
    models::MessageResponse,
    utils::db_utils::{Column, ColumnKind, build_update_sql, execute_update},
    validation::{check_date_range, checked, validated},
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use sqlx::MySqlPool;
use tracing::{error, info};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

const COLUMNS: &str = "id, name, client, description, status, start_date, end_date, manager_id";

const UPDATABLE: &[Column] = &[
    Column::new("name", ColumnKind::Text(200)),
    Column::nullable("client", ColumnKind::Text(200)),
    Column::nullable("description", ColumnKind::Text(10_000)),
    Column::new(
        "status",
        ColumnKind::OneOf(&["planned", "active", "on_hold", "completed"]),
    ),
    Column::new("start_date", ColumnKind::Date),
    Column::nullable("end_date", ColumnKind::Date),
    Column::nullable("manager_id", ColumnKind::Id),
];

#[derive(Debug, Deserialize, ToSchema, Validate)]
#[validate(schema(function = "validate_project_dates"))]
pub struct CreateProject {
    #[schema(example = "Payroll migration")]
    #[validate(
        length(min = 1, max = 200, message = "name is required"),
        custom(function = "crate::validation::not_blank")
    )]
    pub name: String,
    #[schema(example = "Internal")]
    #[validate(length(max = 200, message = "client is too long"))]
    pub client: Option<String>,
    pub description: Option<String>,
    #[schema(example = "planned")]
    pub status: Option<ProjectStatus>,
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-06-30", format = "date", value_type = Option<String>)]
    pub end_date: Option<NaiveDate>,
    #[schema(example = 7)]
    pub manager_id: Option<u64>,
}

fn validate_project_dates(project: &CreateProject) -> Result<(), ValidationError> {
    match project.end_date {
        Some(end) => check_date_range(project.start_date, end, "end_date"),
        None => Ok(()),
    }
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateProject {
    pub name: Option<String>,
    pub client: Option<String>,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    #[schema(format = "date", value_type = Option<String>)]
    pub start_date: Option<NaiveDate>,
    #[schema(format = "date", value_type = Option<String>)]
    pub end_date: Option<NaiveDate>,
    pub manager_id: Option<u64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddMember {
    #[schema(example = 1000)]
    pub employee_id: u64,
    #[schema(example = "developer")]
    pub role: Option<String>,
}

/// The date range after applying a partial update to the stored one.
fn merged_dates(body: &Value, current: &Project) -> (NaiveDate, Option<NaiveDate>) {
    let parse = |v: &Value| {
        v.as_str()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
    };
    let start = body
        .get("start_date")
        .and_then(parse)
        .unwrap_or(current.start_date);
    let end = match body.get("end_date") {
        Some(Value::Null) => None,
        Some(v) => parse(v).or(current.end_date),
        None => current.end_date,
    };
    (start, end)
}

/// List projects
#[utoipa::path(
    get,
    path = "/api/projects",
    params(ListQuery),
    responses(
        (status = 200, description = "Paginated project list", body = Object),
        (status = 400, description = "Invalid filter value")
    ),
    security(("bearer_auth" = [])),
    tag = "Project"
)]
pub async fn list_projects(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    let params = query.normalize();
    let statuses: Vec<ProjectStatus> = parse_facet("status", &params.status)?;

    cache
        .respond(Resource::Projects, Scope::Shared, &params, || async {
            let mut filter = SqlFilter::new();
            filter
                .any_of("status", &statuses)
                .search(&["name", "client"], params.search.as_deref());
            fetch_page::<Project>(
                pool.get_ref(),
                COLUMNS,
                "projects",
                &filter,
                "start_date DESC, id DESC",
                &params,
            )
            .await
        })
        .await
}

/// Get a project with its members
#[utoipa::path(
    get,
    path = "/api/projects/{project_id}",
    params(("project_id" = u64, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project found", body = ProjectDetail),
        (status = 404, description = "Project not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Project"
)]
pub async fn get_project(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let project_id = path.into_inner();
    let project = fetch_project(pool.get_ref(), project_id).await?;

    let members = sqlx::query_as::<_, ProjectMember>(
        r#"
        SELECT m.employee_id, CONCAT(e.first_name, ' ', e.last_name) AS employee_name, m.role
        FROM project_members m
        JOIN employees e ON e.id = m.employee_id
        WHERE m.project_id = ?
        ORDER BY e.first_name, e.last_name
        "#,
    )
    .bind(project_id)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(ProjectDetail { project, members }))
}

/// Create a project
#[utoipa::path(
    post,
    path = "/api/projects",
    request_body = CreateProject,
    responses(
        (status = 201, description = "Project created", body = MessageResponse),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Project"
)]
pub async fn create_project(
    auth: AuthUser,
    access: web::Data<AccessControl>,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    payload: web::Json<CreateProject>,
) -> Result<HttpResponse, ApiError> {
    access.require(&auth, Permission::ManageProjects).await?;
    validated(&*payload)?;

    let status = payload.status.unwrap_or(ProjectStatus::Planned);

    let result = sqlx::query(
        r#"
        INSERT INTO projects (name, client, description, status, start_date, end_date, manager_id)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.name.trim())
    .bind(payload.client.as_deref())
    .bind(payload.description.as_deref())
    .bind(status.as_ref())
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(payload.manager_id)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, "Failed to create project");
        ApiError::from(e)
    })?;

    cache.invalidate(Resource::Projects);
    info!(project_id = result.last_insert_id(), by = auth.user_id, "Project created");

    Ok(HttpResponse::Created().json(MessageResponse::created(
        "Project created",
        result.last_insert_id(),
    )))
}

/// Update a project
#[utoipa::path(
    put,
    path = "/api/projects/{project_id}",
    params(("project_id" = u64, Path, description = "Project ID")),
    request_body(content = UpdateProject, description = "Any subset of the project fields"),
    responses(
        (status = 200, description = "Project updated", body = MessageResponse),
        (status = 400, description = "Unknown field or invalid value"),
        (status = 404, description = "Project not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Project"
)]
pub async fn update_project(
    auth: AuthUser,
    access: web::Data<AccessControl>,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    access.require(&auth, Permission::ManageProjects).await?;
    let project_id = path.into_inner();

    let update = build_update_sql("projects", UPDATABLE, &body, "id", project_id)?;

    let current = fetch_project(pool.get_ref(), project_id).await?;
    if let (start, Some(end)) = merged_dates(&body, &current) {
        checked(check_date_range(start, end, "end_date"))?;
    }

    execute_update(pool.get_ref(), update).await?;

    cache.invalidate(Resource::Projects);
    Ok(HttpResponse::Ok().json(MessageResponse::new("Project updated")))
}

/// Delete a project and its memberships
#[utoipa::path(
    delete,
    path = "/api/projects/{project_id}",
    params(("project_id" = u64, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project deleted", body = MessageResponse),
        (status = 404, description = "Project not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Project"
)]
pub async fn delete_project(
    auth: AuthUser,
    access: web::Data<AccessControl>,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    access.require(&auth, Permission::ManageProjects).await?;
    let project_id = path.into_inner();

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM project_members WHERE project_id = ?")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Project"));
    }
    tx.commit().await?;

    cache.invalidate(Resource::Projects);
    Ok(HttpResponse::Ok().json(MessageResponse::new("Project deleted")))
}

/// Add an employee to a project
#[utoipa::path(
    post,
    path = "/api/projects/{project_id}/members",
    params(("project_id" = u64, Path, description = "Project ID")),
    request_body = AddMember,
    responses(
        (status = 201, description = "Member added", body = MessageResponse),
        (status = 404, description = "Project not found"),
        (status = 409, description = "Already a member or unknown employee")
    ),
    security(("bearer_auth" = [])),
    tag = "Project"
)]
pub async fn add_member(
    auth: AuthUser,
    access: web::Data<AccessControl>,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    path: web::Path<u64>,
    payload: web::Json<AddMember>,
) -> Result<HttpResponse, ApiError> {
    access.require(&auth, Permission::ManageProjects).await?;
    let project_id = path.into_inner();
    fetch_project(pool.get_ref(), project_id).await?;

    let role = payload
        .role
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty());

    let result = sqlx::query(
        "INSERT INTO project_members (project_id, employee_id, role) VALUES (?, ?, ?)",
    )
    .bind(project_id)
    .bind(payload.employee_id)
    .bind(role)
    .execute(pool.get_ref())
    .await;

    match result {
        Ok(_) => {
            cache.invalidate(Resource::Projects);
            Ok(HttpResponse::Created().json(MessageResponse::new("Member added")))
        }
        // duplicate membership or missing employee
        Err(e) if is_constraint_violation(&e) => Err(ApiError::Conflict(
            "Employee is already a member or does not exist".to_string(),
        )),
        Err(e) => Err(ApiError::from(e)),
    }
}

/// Remove an employee from a project
#[utoipa::path(
    delete,
    path = "/api/projects/{project_id}/members/{employee_id}",
    params(
        ("project_id" = u64, Path, description = "Project ID"),
        ("employee_id" = u64, Path, description = "Employee ID")
    ),
    responses(
        (status = 200, description = "Member removed", body = MessageResponse),
        (status = 404, description = "Membership not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Project"
)]
pub async fn remove_member(
    auth: AuthUser,
    access: web::Data<AccessControl>,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    path: web::Path<(u64, u64)>,
) -> Result<HttpResponse, ApiError> {
    access.require(&auth, Permission::ManageProjects).await?;
    let (project_id, employee_id) = path.into_inner();

    let result =
        sqlx::query("DELETE FROM project_members WHERE project_id = ? AND employee_id = ?")
            .bind(project_id)
            .bind(employee_id)
            .execute(pool.get_ref())
            .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Project member"));
    }

    cache.invalidate(Resource::Projects);
    Ok(HttpResponse::Ok().json(MessageResponse::new("Member removed")))
}

async fn fetch_project(pool: &MySqlPool, project_id: u64) -> Result<Project, ApiError> {
    sqlx::query_as::<_, Project>(&format!("SELECT {COLUMNS} FROM projects WHERE id = ?"))
        .bind(project_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Project"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    fn stored() -> Project {
        Project {
            id: 1,
            name: "Payroll migration".into(),
            client: None,
            description: None,
            status: "active".into(),
            start_date: date(1, 1),
            end_date: Some(date(6, 30)),
            manager_id: None,
        }
    }

    #[test]
    fn open_ended_project_is_valid() {
        let payload = CreateProject {
            name: "Intranet".into(),
            client: None,
            description: None,
            status: None,
            start_date: date(3, 1),
            end_date: None,
            manager_id: None,
        };
        assert!(validated(&payload).is_ok());
    }

    #[test]
    fn end_before_start_is_rejected_on_create() {
        let payload = CreateProject {
            name: "Intranet".into(),
            client: None,
            description: None,
            status: Some(ProjectStatus::Active),
            start_date: date(3, 1),
            end_date: Some(date(2, 1)),
            manager_id: None,
        };
        match validated(&payload) {
            Err(ApiError::Validation(fields)) => assert_eq!(fields[0].field, "end_date"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn partial_update_merges_with_stored_dates() {
        let (start, end) = merged_dates(&json!({ "start_date": "2026-07-01" }), &stored());
        assert_eq!(start, date(7, 1));
        assert_eq!(end, Some(date(6, 30)));

        let (_, end) = merged_dates(&json!({ "end_date": null }), &stored());
        assert_eq!(end, None);
    }

    #[test]
    fn status_values_follow_snake_case() {
        assert_eq!(ProjectStatus::OnHold.as_ref(), "on_hold");
        assert!(build_update_sql("projects", UPDATABLE, &json!({"status": "on_hold"}), "id", 1).is_ok());
    }
}
