use crate::{
    auth::{
        auth::bearer_token,
        jwt::{TokenSubject, generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::Config,
    db::is_constraint_violation,
    error::ApiError,
    model::{
        role::Role,
        user::{LoginReq, RegisterReq, UserRow},
    },
    models::{Claims, MessageResponse, TokenType},
    utils::username_index::UsernameIndex,
    validation::validated,
};
use actix_web::{HttpRequest, HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument};

#[derive(Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Issues an access/refresh pair and records the refresh token id.
async fn issue_tokens(
    subject: &TokenSubject,
    pool: &MySqlPool,
    config: &Config,
) -> Result<TokenPair, ApiError> {
    let access_token =
        generate_access_token(subject, &config.jwt_secret, config.access_token_ttl)?;
    let (refresh_token, refresh_claims) =
        generate_refresh_token(subject, &config.jwt_secret, config.refresh_token_ttl)?;

    debug!(
        user_id = subject.user_id,
        jti = %refresh_claims.jti,
        "Storing refresh token"
    );

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(subject.user_id)
    .bind(&refresh_claims.jti)
    .bind(refresh_claims.exp as i64)
    .execute(pool)
    .await
    .map_err(|e| {
        error!(error = %e, "Failed to store refresh token");
        ApiError::from(e)
    })?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

/// Self-registration always creates an unlinked employee-role account; HR links
/// it to an employee record and an admin assigns elevated roles.
#[instrument(name = "auth_register", skip(pool, index, user), fields(username = %user.username))]
pub async fn register(
    user: web::Json<RegisterReq>,
    pool: web::Data<MySqlPool>,
    index: web::Data<UsernameIndex>,
) -> Result<HttpResponse, ApiError> {
    validated(&*user)?;
    let username = user.username.trim().to_lowercase();

    let available = index
        .is_available(&username, pool.get_ref())
        .await
        .map_err(|e| ApiError::internal(format!("username lookup failed: {e}")))?;
    if !available {
        return Err(ApiError::Conflict("Username already taken".to_string()));
    }

    let hashed = hash_password(&user.password)?;

    let result = sqlx::query(
        r#"INSERT INTO users (username, password, role_id, is_active) VALUES (?, ?, ?, TRUE)"#,
    )
    .bind(&username)
    .bind(&hashed)
    .bind(Role::Employee.id())
    .execute(pool.get_ref())
    .await;

    match result {
        Ok(_) => {
            index.mark_taken(&username).await;
            info!("User registered");
            Ok(HttpResponse::Created().json(MessageResponse::new("User registered successfully")))
        }
        Err(e) if is_constraint_violation(&e) => {
            index.mark_taken(&username).await;
            Err(ApiError::Conflict("Username already exists".to_string()))
        }
        Err(e) => {
            error!(error = %e, "Failed to register user");
            Err(ApiError::from(e))
        }
    }
}

#[instrument(
    name = "auth_login",
    skip(pool, config, user),
    fields(username = %user.username)
)]
pub async fn login(
    user: web::Json<LoginReq>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    info!("Login request received");

    if user.username.trim().is_empty() || user.password.is_empty() {
        info!("Validation failed: empty username or password");
        return Err(ApiError::BadRequest("Username or password required".to_string()));
    }

    let invalid = || ApiError::Unauthorized("Invalid credentials".to_string());

    let db_user = sqlx::query_as::<_, UserRow>(
        r#"
        SELECT id, username, password, role_id, employee_id, is_active
        FROM users
        WHERE username = ?
        "#,
    )
    .bind(user.username.trim().to_lowercase())
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| {
        info!("Invalid credentials: user not found");
        invalid()
    })?;

    if !db_user.is_active {
        info!(user_id = db_user.id, "Login refused: account disabled");
        return Err(ApiError::Forbidden("Account is disabled".to_string()));
    }

    if !verify_password(&user.password, &db_user.password) {
        info!("Invalid credentials: password mismatch");
        return Err(invalid());
    }

    let subject = TokenSubject {
        user_id: db_user.id,
        username: db_user.username.clone(),
        role: db_user.role_id,
        employee_id: db_user.employee_id,
    };
    let tokens = issue_tokens(&subject, pool.get_ref(), &config).await?;

    // non-fatal
    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
        .bind(db_user.id)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to update last_login_at");
    }

    info!("Login successful");
    Ok(HttpResponse::Ok().json(tokens))
}

fn refresh_claims(req: &HttpRequest, config: &Config) -> Result<Claims, ApiError> {
    let token = bearer_token(req)?;
    let claims = verify_token(token, &config.jwt_secret)?;
    if claims.token_type != TokenType::Refresh {
        return Err(ApiError::Unauthorized("Refresh token required".to_string()));
    }
    Ok(claims)
}

/// Rotates the refresh token: the presented one is revoked and a new pair issued.
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    let claims = refresh_claims(&req, &config)?;

    let revoked = sqlx::query(
        "UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ? AND revoked = FALSE AND expires_at > NOW()",
    )
    .bind(&claims.jti)
    .execute(pool.get_ref())
    .await?;

    if revoked.rows_affected() == 0 {
        info!(user_id = claims.user_id, "Refresh with unknown or revoked token");
        return Err(ApiError::Unauthorized("Refresh token revoked".to_string()));
    }

    let tokens = issue_tokens(&TokenSubject::from(&claims), pool.get_ref(), &config).await?;
    Ok(HttpResponse::Ok().json(tokens))
}

/// Revokes the presented refresh token. Always answers 204.
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> HttpResponse {
    let Ok(claims) = refresh_claims(&req, &config) else {
        return HttpResponse::NoContent().finish();
    };

    // idempotent
    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to revoke refresh token on logout");
    }

    HttpResponse::NoContent().finish()
}
