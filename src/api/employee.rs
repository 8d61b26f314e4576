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
        employee::{Employee, EmployeeStatus},
        resource::Resource,
    },
    models::MessageResponse,
    utils::db_utils::{Column, ColumnKind, build_update_sql, execute_update},
    validation::validated,
};
use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::MySqlPool;
use tracing::{error, info};
use utoipa::ToSchema;
use validator::Validate;

const EMPLOYEE_COLUMNS: &str = "id, employee_code, first_name, last_name, email, phone, department_id, job_title_id, hire_date, status";

const UPDATABLE: &[Column] = &[
    Column::new("employee_code", ColumnKind::Text(32)),
    Column::new("first_name", ColumnKind::Text(100)),
    Column::new("last_name", ColumnKind::Text(100)),
    Column::new("email", ColumnKind::Email),
    Column::nullable("phone", ColumnKind::Text(32)),
    Column::new("department_id", ColumnKind::Id),
    Column::new("job_title_id", ColumnKind::Id),
    Column::new("hire_date", ColumnKind::Date),
    Column::new(
        "status",
        ColumnKind::OneOf(&["active", "inactive", "terminated"]),
    ),
];

#[derive(Deserialize, Serialize, ToSchema, Validate)]
pub struct CreateEmployee {
    #[schema(example = "EMP-3000", value_type = String)]
    #[validate(length(min = 1, max = 32, message = "employee code is required"))]
    pub employee_code: String,
    #[schema(example = "first name", value_type = String)]
    #[validate(length(min = 1, max = 100, message = "first name is required"))]
    pub first_name: String,
    #[schema(example = "last name", value_type = String)]
    #[validate(length(min = 1, max = 100, message = "last name is required"))]
    pub last_name: String,
    #[schema(example = "john@email.com", format = "email", value_type = String)]
    #[validate(email(message = "email is not valid"))]
    pub email: String,
    #[schema(example = "+8801712345678")]
    pub phone: Option<String>,
    #[schema(example = 1, value_type = u64)]
    pub department_id: u64,
    #[schema(example = 2, value_type = u64)]
    pub job_title_id: u64,
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub hire_date: chrono::NaiveDate,
}

/// Partial update; only fields present in the body are written.
#[derive(Deserialize, ToSchema)]
pub struct UpdateEmployee {
    pub employee_code: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub department_id: Option<u64>,
    pub job_title_id: Option<u64>,
    #[schema(example = "inactive")]
    pub status: Option<EmployeeStatus>,
    #[schema(example = "2026-01-01", format = "date", value_type = Option<String>)]
    pub hire_date: Option<chrono::NaiveDate>,
}

/// List Employees
#[utoipa::path(
    get,
    path = "/api/employees",
    params(ListQuery),
    responses(
        (status = 200, description = "Paginated employee list", body = Object),
        (status = 400, description = "Invalid filter value"),
        (status = 403, description = "Forbidden")
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_employees(
    auth: AuthUser,
    access: web::Data<AccessControl>,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    access.require(&auth, Permission::ViewEmployees).await?;

    let params = query.normalize();
    let statuses: Vec<EmployeeStatus> = parse_facet("status", &params.status)?;
    let departments: Vec<u64> = parse_facet("department_id", &params.department_id)?;

    cache
        .respond(Resource::Employees, Scope::Shared, &params, || async {
            let mut filter = SqlFilter::new();
            filter
                .any_of("status", &statuses)
                .any_of_ids("department_id", &departments)
                .search(
                    &["first_name", "last_name", "email", "employee_code"],
                    params.search.as_deref(),
                );

            fetch_page::<Employee>(
                pool.get_ref(),
                EMPLOYEE_COLUMNS,
                "employees",
                &filter,
                "id DESC",
                &params,
            )
            .await
        })
        .await
}

/// Create Employee
#[utoipa::path(
    post,
    path = "/api/employees",
    request_body = CreateEmployee,
    responses(
        (status = 201, description = "Employee created successfully", body = MessageResponse),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Employee code or email already exists")
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_employee(
    auth: AuthUser,
    access: web::Data<AccessControl>,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    payload: web::Json<CreateEmployee>,
) -> Result<HttpResponse, ApiError> {
    access.require(&auth, Permission::ManageEmployees).await?;
    validated(&*payload)?;

    let result = sqlx::query(
        r#"
        INSERT INTO employees
        (employee_code, first_name, last_name, email, phone, department_id, job_title_id, hire_date, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'active')
        "#,
    )
    .bind(payload.employee_code.trim())
    .bind(payload.first_name.trim())
    .bind(payload.last_name.trim())
    .bind(payload.email.trim())
    .bind(payload.phone.as_deref())
    .bind(payload.department_id)
    .bind(payload.job_title_id)
    .bind(payload.hire_date)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, "Failed to create employee");
        ApiError::from(e)
    })?;

    cache.invalidate(Resource::Employees);
    info!(employee_id = result.last_insert_id(), by = auth.user_id, "Employee created");

    Ok(HttpResponse::Created().json(MessageResponse::created(
        "Employee created successfully",
        result.last_insert_id(),
    )))
}

/// Get Employee by ID
#[utoipa::path(
    get,
    path = "/api/employees/{employee_id}",
    params(
        ("employee_id" = u64, Path, description = "Employee ID")
    ),
    responses(
        (status = 200, description = "Employee found", body = Employee),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_employee(
    auth: AuthUser,
    access: web::Data<AccessControl>,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let employee_id = path.into_inner();

    // everyone may read their own record
    if auth.employee_id != Some(employee_id) {
        access.require(&auth, Permission::ViewEmployees).await?;
    }

    let employee = sqlx::query_as::<_, Employee>(&format!(
        "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = ?"
    ))
    .bind(employee_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| ApiError::not_found("Employee"))?;

    Ok(HttpResponse::Ok().json(employee))
}

/// Update Employee
#[utoipa::path(
    put,
    path = "/api/employees/{employee_id}",
    params(
        ("employee_id" = u64, Path, description = "Employee ID")
    ),
    request_body(content = UpdateEmployee, description = "Any subset of the employee fields"),
    responses(
        (status = 200, description = "Employee updated successfully", body = MessageResponse),
        (status = 400, description = "Unknown field or invalid value"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update_employee(
    auth: AuthUser,
    access: web::Data<AccessControl>,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    access.require(&auth, Permission::ManageEmployees).await?;
    let employee_id = path.into_inner();

    let update = build_update_sql("employees", UPDATABLE, &body, "id", employee_id)?;
    let affected = execute_update(pool.get_ref(), update).await?;

    if affected == 0 {
        let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM employees WHERE id = ?")
            .bind(employee_id)
            .fetch_one(pool.get_ref())
            .await?;
        if exists == 0 {
            return Err(ApiError::not_found("Employee"));
        }
    }

    cache.invalidate(Resource::Employees);
    Ok(HttpResponse::Ok().json(MessageResponse::new("Employee updated successfully")))
}

/// Delete Employee
#[utoipa::path(
    delete,
    path = "/api/employees/{employee_id}",
    params(
        ("employee_id" = u64, Path, description = "Employee ID")
    ),
    responses(
        (status = 200, description = "Successfully deleted", body = MessageResponse),
        (status = 404, description = "Employee not found"),
        (status = 409, description = "Employee still referenced")
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_employee(
    auth: AuthUser,
    access: web::Data<AccessControl>,
    pool: web::Data<MySqlPool>,
    cache: web::Data<QueryCache>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    access.require(&auth, Permission::ManageEmployees).await?;
    let employee_id = path.into_inner();

    let result = sqlx::query("DELETE FROM employees WHERE id = ?")
        .bind(employee_id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| {
            error!(error = %e, employee_id, "Failed to delete employee");
            ApiError::from(e)
        })?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Employee"));
    }

    cache.invalidate(Resource::Employees);
    Ok(HttpResponse::Ok().json(MessageResponse::new("Successfully deleted")))
}

/// Links a registered user account to this employee record.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LinkAccount {
    #[schema(example = 42)]
    pub user_id: u64,
}

/// Link Account
#[utoipa::path(
    put,
    path = "/api/employees/{employee_id}/account",
    params(
        ("employee_id" = u64, Path, description = "Employee ID")
    ),
    request_body = LinkAccount,
    responses(
        (status = 200, description = "Account linked", body = MessageResponse),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Employee or user not found"),
        (status = 409, description = "Account or employee already linked")
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn link_account(
    auth: AuthUser,
    access: web::Data<AccessControl>,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<LinkAccount>,
) -> Result<HttpResponse, ApiError> {
    access.require(&auth, Permission::ManageEmployees).await?;
    let employee_id = path.into_inner();
    let user_id = payload.user_id;

    let employee = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM employees WHERE id = ?")
        .bind(employee_id)
        .fetch_one(pool.get_ref())
        .await?;
    if employee == 0 {
        return Err(ApiError::not_found("Employee"));
    }

    let result = sqlx::query("UPDATE users SET employee_id = ? WHERE id = ? AND employee_id IS NULL")
        .bind(employee_id)
        .bind(user_id)
        .execute(pool.get_ref())
        .await;

    match result {
        Ok(done) if done.rows_affected() == 1 => {
            info!(employee_id, user_id, linked_by = auth.user_id, "User account linked to employee");
            Ok(HttpResponse::Ok().json(MessageResponse::new("Account linked successfully")))
        }
        Ok(_) => {
            let user = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_one(pool.get_ref())
                .await?;
            if user == 0 {
                Err(ApiError::not_found("User"))
            } else {
                Err(ApiError::Conflict("User account is already linked".to_string()))
            }
        }
        Err(e) if is_constraint_violation(&e) => Err(ApiError::Conflict(
            "Employee already has an account".to_string(),
        )),
        Err(e) => {
            error!(error = %e, employee_id, user_id, "Failed to link account");
            Err(ApiError::from(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> CreateEmployee {
        CreateEmployee {
            employee_code: "EMP-1".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "ada@example.com".into(),
            phone: None,
            department_id: 1,
            job_title_id: 1,
            hire_date: chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        }
    }

    #[test]
    fn valid_employee_passes() {
        assert!(payload().validate().is_ok());
    }

    #[test]
    fn bad_email_is_reported_on_email_field() {
        let mut p = payload();
        p.email = "not-an-email".into();
        let err = validated(&p).unwrap_err();
        match err {
            ApiError::Validation(fields) => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].field, "email");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn status_is_restricted_on_update() {
        let body = serde_json::json!({ "status": "on_vacation" });
        assert!(build_update_sql("employees", UPDATABLE, &body, "id", 1).is_err());
        let body = serde_json::json!({ "status": "inactive", "phone": null });
        assert!(build_update_sql("employees", UPDATABLE, &body, "id", 1).is_ok());
    }

    #[test]
    fn update_checks_email_and_name_length() {
        let body = serde_json::json!({ "email": "not-an-email" });
        assert!(matches!(
            build_update_sql("employees", UPDATABLE, &body, "id", 1),
            Err(ApiError::BadRequest(msg)) if msg.contains("email")
        ));

        let body = serde_json::json!({ "first_name": "A".repeat(101) });
        assert!(build_update_sql("employees", UPDATABLE, &body, "id", 1).is_err());

        let body = serde_json::json!({ "email": "ada@example.com", "last_name": "Byron" });
        assert!(build_update_sql("employees", UPDATABLE, &body, "id", 1).is_ok());
    }

    #[actix_web::test]
    async fn only_employee_managers_link_accounts() {
        use crate::{auth::permissions::MemoryGrantStore, model::role::Role};
        use actix_web::{App, HttpMessage, dev::Service, http::StatusCode, test};
        use std::sync::Arc;

        let access = web::Data::new(AccessControl::new(Arc::new(MemoryGrantStore::with_defaults())));
        let pool = sqlx::MySqlPool::connect_lazy("mysql://hr:hr@127.0.0.1:1/hr").unwrap();
        let app = test::init_service(
            App::new()
                .app_data(access)
                .app_data(web::Data::new(pool))
                .wrap_fn(|req, srv| {
                    req.extensions_mut().insert(AuthUser {
                        user_id: 9,
                        username: "self-service".into(),
                        role: Role::Employee,
                        employee_id: None,
                    });
                    srv.call(req)
                })
                .route("/employees/{id}/account", web::put().to(link_account)),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/employees/1/account")
            .set_json(serde_json::json!({ "user_id": 9 }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
    }
}
