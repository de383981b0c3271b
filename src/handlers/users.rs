use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};

use crate::{
    AppState,
    auth::AuthUser,
    error::ApiError,
    models::{MessageResponse, Role, UpdateRoleRequest, UserSummary},
};

/// get_users
///
/// [Authenticated Route] The user directory, used to pick task assignees.
#[utoipa::path(
    get,
    path = "/api/users",
    responses((status = 200, description = "All users", body = [UserSummary]))
)]
pub async fn get_users(
    _user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let users = state.repo.list_users().await?;
    Ok(Json(users.iter().map(|u| u.summary()).collect()))
}

/// update_user_role
///
/// [Admin Route] Changes a user's role. Takes effect on that user's next request.
#[utoipa::path(
    put,
    path = "/api/admin/users/{id}/role",
    params(("id" = i64, Path, description = "User ID")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = UserSummary),
        (status = 403, description = "Caller is not an admin", body = MessageResponse),
        (status = 404, description = "User not found", body = MessageResponse)
    )
)]
pub async fn update_user_role(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<UpdateRoleRequest>, JsonRejection>,
) -> Result<Json<UserSummary>, ApiError> {
    user.require_role(&[Role::Admin])?;
    let Json(req) = payload?;

    let updated = state
        .repo
        .set_user_role(id, req.role)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    tracing::info!(target_user = id, role = %req.role, admin_id = user.id, "user role changed");
    Ok(Json(updated.summary()))
}
