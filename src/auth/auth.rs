use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::error::ApiError;
use crate::model::role::Role;
use crate::models::TokenType;
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::{Ready, ready};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,

    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,
}

/// Pulls the bearer token out of an `Authorization` header value.
pub fn bearer_token(req: &HttpRequest) -> Result<&str, ApiError> {
    req.headers()
        .get("Authorization")
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?
        .to_str()
        .map_err(|_| ApiError::Unauthorized("Invalid Authorization header encoding".to_string()))?
        .strip_prefix("Bearer ")
        .ok_or_else(|| {
            ApiError::Unauthorized("Authorization header must start with Bearer".to_string())
        })
}

/// Decodes an access token into the caller's identity.
pub fn authenticate(token: &str, config: &Config) -> Result<AuthUser, ApiError> {
    let claims = verify_token(token, &config.jwt_secret)?;

    if claims.token_type != TokenType::Access {
        return Err(ApiError::Unauthorized("Access token required".to_string()));
    }

    let role = Role::from_id(claims.role)
        .ok_or_else(|| ApiError::Unauthorized("Invalid role".to_string()))?;

    Ok(AuthUser {
        user_id: claims.user_id,
        username: claims.sub,
        role,
        employee_id: claims.employee_id,
    })
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // already decoded by the auth middleware
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }

        let Some(config) = req.app_data::<Data<Config>>() else {
            return ready(Err(ApiError::internal("Config missing")));
        };

        ready(bearer_token(req).and_then(|token| authenticate(token, config)))
    }
}

impl AuthUser {
    /// The linked employee record; accounts without one cannot use self-service endpoints.
    pub fn employee_id(&self) -> Result<u64, ApiError> {
        self.employee_id
            .ok_or_else(|| ApiError::Forbidden("No employee profile".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{TokenSubject, generate_access_token, generate_refresh_token};
    use actix_web::test::TestRequest;

    fn subject(role: u8) -> TokenSubject {
        TokenSubject {
            user_id: 3,
            username: "mgr".into(),
            role,
            employee_id: Some(30),
        }
    }

    #[test]
    fn access_token_authenticates() {
        let config = Config::for_tests();
        let token = generate_access_token(&subject(3), &config.jwt_secret, 60).unwrap();
        let user = authenticate(&token, &config).unwrap();
        assert_eq!(user.role, Role::Manager);
        assert_eq!(user.employee_id().unwrap(), 30);
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let config = Config::for_tests();
        let (token, _) = generate_refresh_token(&subject(3), &config.jwt_secret, 60).unwrap();
        assert!(matches!(
            authenticate(&token, &config),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn unknown_role_is_rejected() {
        let config = Config::for_tests();
        let token = generate_access_token(&subject(42), &config.jwt_secret, 60).unwrap();
        assert!(authenticate(&token, &config).is_err());
    }

    #[test]
    fn bearer_prefix_is_required() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Token abc"))
            .to_http_request();
        assert!(bearer_token(&req).is_err());

        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer abc"))
            .to_http_request();
        assert_eq!(bearer_token(&req).unwrap(), "abc");
    }

    #[test]
    fn account_without_employee_is_forbidden_self_service() {
        let user = AuthUser {
            user_id: 1,
            username: "svc".into(),
            role: Role::Admin,
            employee_id: None,
        };
        assert!(matches!(user.employee_id(), Err(ApiError::Forbidden(_))));
    }
}
