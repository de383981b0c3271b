use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use password_hash::{PasswordHash, SaltString};
use serde::{Deserialize, Serialize};

use crate::{
    config::{AdminBootstrap, AppConfig, Env},
    error::ApiError,
    models::{NewUser, Role, User},
    policy::Actor,
    repository::RepositoryState,
};

/// Claims
///
/// Payload of the HS256 access tokens this server issues and accepts.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id, as a decimal string.
    pub sub: String,
    /// Expiration time (seconds since epoch). Always validated.
    pub exp: u64,
    /// Issued at.
    pub iat: u64,
}

/// issue_token
///
/// Signs an access token for `user_id` valid for `config.jwt_ttl_seconds`.
pub fn issue_token(config: &AppConfig, user_id: i64) -> Result<String, ApiError> {
    let now = Utc::now().timestamp().max(0) as u64;
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now,
        exp: now + config.jwt_ttl_seconds,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("token signing failed: {e}")))
}

/// Decodes and validates a token, returning the user id it was issued for.
pub fn validate_token(config: &AppConfig, token: &str) -> Result<i64, ApiError> {
    let mut validation = Validation::default();
    validation.validate_exp = true;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        match e.kind() {
            ErrorKind::ExpiredSignature => tracing::debug!("rejected expired token"),
            other => tracing::debug!(?other, "rejected invalid token"),
        }
        ApiError::Unauthorized
    })?;

    data.claims.sub.parse().map_err(|_| ApiError::Unauthorized)
}

/// Hashes a password into an Argon2 PHC string with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes)
        .map_err(|e| ApiError::Internal(format!("salt generation failed: {e}")))?;
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| ApiError::Internal(format!("salt encoding failed: {e}")))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|phc| phc.to_string())
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))
}

/// Checks a password against a stored hash. Accounts without a hash never match.
pub fn verify_password(hash: Option<&str>, password: &str) -> bool {
    let Some(hash) = hash else {
        return false;
    };
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// bootstrap_admin
///
/// Guarantees the configured administrator exists. An existing account with that
/// username is promoted to admin; its password is left alone.
pub async fn bootstrap_admin(
    repo: &RepositoryState,
    admin: &AdminBootstrap,
) -> Result<User, ApiError> {
    if let Some(existing) = repo.find_user_by_username(&admin.username).await? {
        if existing.role == Role::Admin {
            return Ok(existing);
        }
        tracing::info!(user_id = existing.id, "promoting bootstrap user to admin");
        return repo
            .set_user_role(existing.id, Role::Admin)
            .await?
            .ok_or_else(|| ApiError::Internal("bootstrap user vanished during promotion".into()));
    }

    let user = repo
        .create_user(NewUser {
            username: admin.username.clone(),
            email: admin.email.clone(),
            password_hash: Some(hash_password(&admin.password)?),
            role: Role::Admin,
        })
        .await?;
    tracing::info!(user_id = user.id, username = %user.username, "bootstrap admin created");
    Ok(user)
}

/// AuthUser
///
/// The resolved identity of an authenticated request. The role is read from the
/// database on every request, so a role change applies without re-issuing tokens.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

impl AuthUser {
    pub fn actor(&self) -> Actor {
        Actor::new(self.id, self.role)
    }

    /// Rejects with 403 unless the user's role is one of `roles`.
    pub fn require_role(&self, roles: &[Role]) -> Result<(), ApiError> {
        if roles.contains(&self.role) {
            return Ok(());
        }
        let required: Vec<&str> = roles.iter().map(Role::as_str).collect();
        tracing::warn!(user_id = self.id, role = %self.role, ?required, "role check denied");
        Err(ApiError::forbidden(format!(
            "Access denied: User does not have one of the required roles ({}). Current role: {}.",
            required.join(", "),
            self.role
        )))
    }
}

/// AuthUser Extractor Implementation
///
/// 1. Local bypass: with `AUTH_DEV_BYPASS` set in `Env::Local`, an `x-user-id` header naming
///    an existing user is accepted.
/// 2. Bearer token extraction and JWT validation.
/// 3. Database lookup, so deleted users are rejected even with a valid token.
///
/// Rejection: 401 with a `{"msg"}` body on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        if config.env == Env::Local && config.dev_auth_bypass {
            if let Some(user_id) = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<i64>().ok())
            {
                if let Some(user) = repo.get_user(user_id).await? {
                    return Ok(AuthUser {
                        id: user.id,
                        username: user.username,
                        role: user.role,
                    });
                }
            }
        }

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;

        let user_id = validate_token(&config, token)?;

        let user = repo.get_user(user_id).await?.ok_or_else(|| {
            tracing::warn!(user_id, "valid token for a user that no longer exists");
            ApiError::Unauthorized
        })?;

        Ok(AuthUser {
            id: user.id,
            username: user.username,
            role: user.role,
        })
    }
}
