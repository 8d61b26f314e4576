use crate::{
    auth::{
        auth::AuthUser,
        permissions::{AccessControl, Permission},
    },
    cache::QueryCache,
    error::ApiError,
    model::{resource::Resource, role::Role},
    models::MessageResponse,
};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct GrantChange {
    #[schema(example = "manager")]
    pub role: Role,
    #[schema(example = "manage_events")]
    pub permission: Permission,
}

/// Role to permission matrix
#[utoipa::path(
    get,
    path = "/api/permissions",
    responses(
        (status = 200, description = "Permissions held by each role", body = Object, example = json!({
            "admin": ["view_employees", "manage_employees"],
            "employee": []
        })),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Permission"
)]
pub async fn permission_matrix(
    auth: AuthUser,
    access: web::Data<AccessControl>,
) -> Result<HttpResponse, ApiError> {
    access.require(&auth, Permission::ManagePermissions).await?;
    Ok(HttpResponse::Ok().json(access.matrix().await?))
}

/// Grant a permission to a role
#[utoipa::path(
    post,
    path = "/api/permissions/grant",
    request_body = GrantChange,
    responses(
        (status = 200, description = "Permission granted", body = MessageResponse),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Permission"
)]
pub async fn grant_permission(
    auth: AuthUser,
    access: web::Data<AccessControl>,
    cache: web::Data<QueryCache>,
    payload: web::Json<GrantChange>,
) -> Result<HttpResponse, ApiError> {
    access.require(&auth, Permission::ManagePermissions).await?;

    let changed = access.grant(payload.role, payload.permission).await?;
    if changed {
        cache.invalidate(Resource::Permissions);
        info!(role = %payload.role, permission = %payload.permission, by = auth.user_id, "Permission granted");
    }

    Ok(HttpResponse::Ok().json(MessageResponse::new(format!(
        "{} granted to {}",
        payload.permission, payload.role
    ))))
}

/// Revoke a permission from a role
#[utoipa::path(
    post,
    path = "/api/permissions/revoke",
    request_body = GrantChange,
    responses(
        (status = 200, description = "Permission revoked", body = MessageResponse),
        (status = 400, description = "Admin permissions cannot be revoked"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Permission"
)]
pub async fn revoke_permission(
    auth: AuthUser,
    access: web::Data<AccessControl>,
    cache: web::Data<QueryCache>,
    payload: web::Json<GrantChange>,
) -> Result<HttpResponse, ApiError> {
    access.require(&auth, Permission::ManagePermissions).await?;

    let changed = access.revoke(payload.role, payload.permission).await?;
    if changed {
        cache.invalidate(Resource::Permissions);
        info!(role = %payload.role, permission = %payload.permission, by = auth.user_id, "Permission revoked");
    }

    Ok(HttpResponse::Ok().json(MessageResponse::new(format!(
        "{} revoked from {}",
        payload.permission, payload.role
    ))))
}
