use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

use crate::{auth::auth::AuthUser, error::ApiError, model::role::Role};

#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Hash,
    Ord,
    PartialOrd,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
    EnumString,
    EnumIter,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Permission {
    ViewEmployees,
    ManageEmployees,
    ReviewAttendance,
    ReviewLeave,
    ManageAnnouncements,
    ManageEvents,
    ManageProjects,
    ReviewFeedback,
    ManagePermissions,
}

pub type PermissionSet = Arc<HashSet<Permission>>;

static ALL_PERMISSIONS: Lazy<PermissionSet> =
    Lazy::new(|| Arc::new(Permission::iter().collect()));

/// Grants a fresh installation starts with; `schema.sql` seeds the same rows.
pub fn default_grants(role: Role) -> Vec<Permission> {
    use Permission::*;
    match role {
        Role::Admin => Permission::iter().collect(),
        Role::Hr => Permission::iter()
            .filter(|p| *p != ManagePermissions)
            .collect(),
        Role::Manager => vec![ViewEmployees, ReviewAttendance, ReviewLeave, ManageProjects],
        Role::Employee => Vec::new(),
    }
}

/// Persistent role → permission grants.
#[async_trait]
pub trait GrantStore: Send + Sync {
    async fn load(&self, role: Role) -> Result<HashSet<Permission>, ApiError>;
    /// Returns `false` when the grant already existed.
    async fn grant(&self, role: Role, permission: Permission) -> Result<bool, ApiError>;
    /// Returns `false` when there was nothing to revoke.
    async fn revoke(&self, role: Role, permission: Permission) -> Result<bool, ApiError>;
}

pub struct MySqlGrantStore {
    pool: MySqlPool,
}

impl MySqlGrantStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GrantStore for MySqlGrantStore {
    async fn load(&self, role: Role) -> Result<HashSet<Permission>, ApiError> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT permission FROM role_permissions WHERE role_id = ?",
        )
        .bind(role.id())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .filter_map(|raw| match raw.parse::<Permission>() {
                Ok(p) => Some(p),
                Err(_) => {
                    tracing::warn!(permission = %raw, role = %role, "Ignoring unknown permission grant");
                    None
                }
            })
            .collect())
    }

    async fn grant(&self, role: Role, permission: Permission) -> Result<bool, ApiError> {
        let result = sqlx::query(
            "INSERT IGNORE INTO role_permissions (role_id, permission) VALUES (?, ?)",
        )
        .bind(role.id())
        .bind(permission.as_ref())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke(&self, role: Role, permission: Permission) -> Result<bool, ApiError> {
        let result =
            sqlx::query("DELETE FROM role_permissions WHERE role_id = ? AND permission = ?")
                .bind(role.id())
                .bind(permission.as_ref())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// In-process grants, seeded with [`default_grants`].
#[derive(Default)]
pub struct MemoryGrantStore {
    grants: RwLock<HashMap<Role, HashSet<Permission>>>,
}

impl MemoryGrantStore {
    pub fn with_defaults() -> Self {
        let grants = Role::iter()
            .map(|role| (role, default_grants(role).into_iter().collect()))
            .collect();
        Self {
            grants: RwLock::new(grants),
        }
    }
}

#[async_trait]
impl GrantStore for MemoryGrantStore {
    async fn load(&self, role: Role) -> Result<HashSet<Permission>, ApiError> {
        let grants = self
            .grants
            .read()
            .map_err(|_| ApiError::internal("grant store poisoned"))?;
        Ok(grants.get(&role).cloned().unwrap_or_default())
    }

    async fn grant(&self, role: Role, permission: Permission) -> Result<bool, ApiError> {
        let mut grants = self
            .grants
            .write()
            .map_err(|_| ApiError::internal("grant store poisoned"))?;
        Ok(grants.entry(role).or_default().insert(permission))
    }

    async fn revoke(&self, role: Role, permission: Permission) -> Result<bool, ApiError> {
        let mut grants = self
            .grants
            .write()
            .map_err(|_| ApiError::internal("grant store poisoned"))?;
        Ok(grants
            .get_mut(&role)
            .map(|set| set.remove(&permission))
            .unwrap_or(false))
    }
}

/// Cached permission checks. Admin always holds every permission.
pub struct AccessControl {
    store: Arc<dyn GrantStore>,
    cache: Cache<Role, PermissionSet>,
}

impl AccessControl {
    pub fn new(store: Arc<dyn GrantStore>) -> Self {
        Self {
            store,
            cache: Cache::builder()
                .max_capacity(16)
                .time_to_live(Duration::from_secs(300))
                .build(),
        }
    }

    pub async fn permissions_of(&self, role: Role) -> Result<PermissionSet, ApiError> {
        if role == Role::Admin {
            return Ok(ALL_PERMISSIONS.clone());
        }

        let store = self.store.clone();
        self.cache
            .try_get_with(role, async move { store.load(role).await.map(Arc::new) })
            .await
            .map_err(|e: Arc<ApiError>| (*e).clone())
    }

    pub async fn allows(&self, user: &AuthUser, permission: Permission) -> Result<bool, ApiError> {
        Ok(self.permissions_of(user.role).await?.contains(&permission))
    }

    pub async fn require(&self, user: &AuthUser, permission: Permission) -> Result<(), ApiError> {
        if self.allows(user, permission).await? {
            Ok(())
        } else {
            tracing::info!(user_id = user.user_id, role = %user.role, %permission, "Permission denied");
            Err(ApiError::Forbidden(format!("Missing permission: {permission}")))
        }
    }

    pub async fn grant(&self, role: Role, permission: Permission) -> Result<bool, ApiError> {
        if role == Role::Admin {
            return Ok(false);
        }
        let changed = self.store.grant(role, permission).await?;
        self.cache.invalidate(&role).await;
        Ok(changed)
    }

    pub async fn revoke(&self, role: Role, permission: Permission) -> Result<bool, ApiError> {
        if role == Role::Admin {
            return Err(ApiError::BadRequest(
                "Admin permissions cannot be revoked".to_string(),
            ));
        }
        let changed = self.store.revoke(role, permission).await?;
        self.cache.invalidate(&role).await;
        Ok(changed)
    }

    /// Role → sorted permission list, for the permission editor.
    pub async fn matrix(&self) -> Result<BTreeMap<String, Vec<Permission>>, ApiError> {
        let mut matrix = BTreeMap::new();
        for role in Role::iter() {
            let mut perms: Vec<Permission> =
                self.permissions_of(role).await?.iter().copied().collect();
            perms.sort();
            matrix.insert(role.to_string(), perms);
        }
        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> AuthUser {
        AuthUser {
            user_id: 1,
            username: "u".into(),
            role,
            employee_id: Some(1),
        }
    }

    fn access() -> AccessControl {
        AccessControl::new(Arc::new(MemoryGrantStore::with_defaults()))
    }

    #[tokio::test]
    async fn admin_holds_everything() {
        let access = access();
        for p in Permission::iter() {
            assert!(access.allows(&user(Role::Admin), p).await.unwrap());
        }
    }

    #[tokio::test]
    async fn defaults_follow_role() {
        let access = access();
        assert!(access.allows(&user(Role::Hr), Permission::ReviewLeave).await.unwrap());
        assert!(!access.allows(&user(Role::Hr), Permission::ManagePermissions).await.unwrap());
        assert!(access.allows(&user(Role::Manager), Permission::ManageProjects).await.unwrap());
        assert!(!access.allows(&user(Role::Manager), Permission::ManageEvents).await.unwrap());
        assert!(!access.allows(&user(Role::Employee), Permission::ViewEmployees).await.unwrap());
    }

    #[tokio::test]
    async fn require_reports_missing_permission() {
        let err = access()
            .require(&user(Role::Employee), Permission::ReviewFeedback)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(msg) if msg.contains("review_feedback")));
    }

    #[tokio::test]
    async fn grant_and_revoke_take_effect_despite_cache() {
        let access = access();
        let employee = user(Role::Employee);

        assert!(!access.allows(&employee, Permission::ManageEvents).await.unwrap());
        assert!(access.grant(Role::Employee, Permission::ManageEvents).await.unwrap());
        assert!(access.allows(&employee, Permission::ManageEvents).await.unwrap());
        assert!(!access.grant(Role::Employee, Permission::ManageEvents).await.unwrap());

        assert!(access.revoke(Role::Employee, Permission::ManageEvents).await.unwrap());
        assert!(!access.allows(&employee, Permission::ManageEvents).await.unwrap());
    }

    #[tokio::test]
    async fn admin_grants_cannot_be_revoked() {
        let err = access()
            .revoke(Role::Admin, Permission::ManagePermissions)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn matrix_lists_every_role() {
        let matrix = access().matrix().await.unwrap();
        assert_eq!(matrix.len(), 4);
        assert!(matrix["employee"].is_empty());
        assert_eq!(matrix["admin"].len(), Permission::iter().count());
    }
}
