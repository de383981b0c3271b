use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};

use crate::{
    AppState,
    auth::{self as authn, AuthUser},
    error::ApiError,
    models::{
        LoginRequest, LoginResponse, MessageResponse, NewUser, RegisterResponse,
        RegisterUserRequest, RegisteredUser, Role, UserProfile,
    },
};

/// login
///
/// [Public Route] Exchanges a username and password for an access token.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = LoginResponse),
        (status = 400, description = "Missing username or password", body = MessageResponse),
        (status = 401, description = "Bad username or password", body = MessageResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(req) = payload?;
    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Missing username or password"));
    }

    let user = state.repo.find_user_by_username(req.username.trim()).await?;
    match user {
        Some(user) if authn::verify_password(user.password_hash.as_deref(), &req.password) => {
            tracing::info!(user_id = user.id, "login succeeded");
            let access_token = authn::issue_token(&state.config, user.id)?;
            Ok(Json(LoginResponse { access_token }))
        }
        _ => {
            tracing::warn!(username = %req.username, "login rejected");
            Err(ApiError::BadCredentials)
        }
    }
}

/// register_user
///
/// [Public Route] Creates a local account. New accounts always start as `read_only`;
/// an admin promotes them through PUT /admin/users/{id}/role.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterUserRequest,
    responses(
        (status = 201, description = "User created", body = RegisterResponse),
        (status = 400, description = "Missing field or duplicate username/email", body = MessageResponse)
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    payload: Result<Json<RegisterUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let Json(req) = payload?;
    if req.username.trim().is_empty() || req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Missing username, email, or password"));
    }

    let password_hash = authn::hash_password(&req.password)?;
    let user = state
        .repo
        .create_user(NewUser {
            username: req.username.trim().to_string(),
            email: req.email.trim().to_string(),
            password_hash: Some(password_hash),
            role: Role::ReadOnly,
        })
        .await?;

    tracing::info!(user_id = user.id, username = %user.username, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            msg: "User created successfully".to_string(),
            user: RegisteredUser {
                id: user.id,
                username: user.username,
                email: user.email,
            },
        }),
    ))
}

/// get_me
///
/// [Authenticated Route] The caller's own profile. The client validates a stored token
/// by calling this on startup.
#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "Current user", body = UserProfile),
        (status = 401, description = "Missing or invalid token", body = MessageResponse)
    )
)]
pub async fn get_me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserProfile>, ApiError> {
    let user = state
        .repo
        .get_user(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found for the given token identity"))?;
    Ok(Json(user.profile()))
}
