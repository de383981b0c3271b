use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};

use super::{date_field, load_project, require_field};
use crate::{
    AppState,
    auth::AuthUser,
    error::ApiError,
    models::{CreateProjectRequest, MessageResponse, Project, Task, UpdateProjectRequest},
    policy,
    repository::NewProject,
};

/// get_projects
///
/// [Authenticated Route] Lists projects visible to the caller: everything for admins and
/// read-only auditors, owned projects for consultants.
#[utoipa::path(
    get,
    path = "/api/projects",
    responses((status = 200, description = "Visible projects", body = [Project]))
)]
pub async fn get_projects(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Project>>, ApiError> {
    let projects = if policy::can_list_all_projects(&user.actor()) {
        state.repo.list_projects().await?
    } else {
        state.repo.list_projects_owned_by(user.id).await?
    };
    Ok(Json(projects))
}

/// create_project
///
/// [Authenticated Route] Creates a project owned by the caller. Admins and consultants only.
#[utoipa::path(
    post,
    path = "/api/projects",
    request_body = CreateProjectRequest,
    responses(
        (status = 201, description = "Created", body = Project),
        (status = 400, description = "Missing project name or bad date", body = MessageResponse),
        (status = 403, description = "Role not allowed", body = MessageResponse)
    )
)]
pub async fn create_project(
    user: AuthUser,
    State(state): State<AppState>,
    payload: Result<Json<CreateProjectRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    user.require_role(policy::CREATOR_ROLES)?;
    let Json(req) = payload?;
    require_field(&req.name, "Missing project name")?;

    let start_date = date_field(req.start_date.as_deref(), "start_date")?;
    let end_date = date_field(req.end_date.as_deref(), "end_date")?;
    let project = state
        .repo
        .create_project(NewProject::from_request(req, user.id, start_date, end_date))
        .await?;

    tracing::info!(project_id = project.id, owner_id = user.id, "project created");
    Ok((StatusCode::CREATED, Json(project)))
}

/// get_project
///
/// [Authenticated Route] One project. Visible to admins, read-only users, the owner, and
/// anyone assigned a task inside it.
#[utoipa::path(
    get,
    path = "/api/projects/{id}",
    params(("id" = i64, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Found", body = Project),
        (status = 403, description = "Not visible to caller", body = MessageResponse),
        (status = 404, description = "Not found", body = MessageResponse)
    )
)]
pub async fn get_project(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Project>, ApiError> {
    let project =
        load_visible_project(&state, &user, id, "Unauthorized to access this project").await?;
    Ok(Json(project))
}

/// update_project
///
/// [Authenticated Route] Partial update. Owner (consultant) or admin only.
#[utoipa::path(
    put,
    path = "/api/projects/{id}",
    params(("id" = i64, Path, description = "Project ID")),
    request_body = UpdateProjectRequest,
    responses(
        (status = 200, description = "Updated", body = Project),
        (status = 403, description = "Not owner", body = MessageResponse),
        (status = 404, description = "Not found", body = MessageResponse)
    )
)]
pub async fn update_project(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<UpdateProjectRequest>, JsonRejection>,
) -> Result<Json<Project>, ApiError> {
    let Json(req) = payload?;
    let mut project = load_project(&state.repo, id).await?;
    if !policy::can_manage_project(&user.actor(), &project) {
        return Err(ApiError::forbidden("Unauthorized to update this project"));
    }

    if let Some(name) = req.name {
        require_field(&name, "Project name cannot be empty")?;
        project.name = name.trim().to_string();
    }
    if let Some(description) = req.description {
        project.description = Some(description);
    }
    if let Some(status) = req.status {
        project.status = status;
    }
    if let Some(priority) = req.priority {
        project.priority = Some(priority);
    }
    if let Some(project_type) = req.project_type {
        project.project_type = Some(project_type);
    }
    if let Some(start_date) = req.start_date {
        project.start_date = date_field(start_date.as_deref(), "start_date")?;
    }
    if let Some(end_date) = req.end_date {
        project.end_date = date_field(end_date.as_deref(), "end_date")?;
    }

    let saved = state
        .repo
        .save_project(&project)
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))?;
    Ok(Json(saved))
}

/// delete_project
///
/// [Authenticated Route] Removes the project with its tasks and evidence, including the
/// stored evidence files. Owner (consultant) or admin only.
#[utoipa::path(
    delete,
    path = "/api/projects/{id}",
    params(("id" = i64, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 403, description = "Not owner", body = MessageResponse),
        (status = 404, description = "Not found", body = MessageResponse)
    )
)]
pub async fn delete_project(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let project = load_project(&state.repo, id).await?;
    if !policy::can_manage_project(&user.actor(), &project) {
        return Err(ApiError::forbidden("Unauthorized to delete this project"));
    }

    let keys = state
        .repo
        .delete_project(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))?;

    // The records are gone already; a leftover object is only wasted space.
    for key in keys {
        if let Err(e) = state.storage.delete_object(&key).await {
            tracing::warn!(%key, error = %e, "failed to remove evidence object of deleted project");
        }
    }

    tracing::info!(project_id = id, user_id = user.id, "project deleted");
    Ok(Json(MessageResponse::new("Project deleted successfully")))
}

/// get_project_tasks
///
/// [Authenticated Route] Tasks of a project, with the same visibility as the project.
#[utoipa::path(
    get,
    path = "/api/projects/{id}/tasks",
    params(("id" = i64, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Tasks", body = [Task]),
        (status = 403, description = "Not visible to caller", body = MessageResponse),
        (status = 404, description = "Not found", body = MessageResponse)
    )
)]
pub async fn get_project_tasks(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Task>>, ApiError> {
    load_visible_project(&state, &user, id, "Unauthorized to view tasks for this project").await?;
    Ok(Json(state.repo.list_tasks(id).await?))
}

async fn load_visible_project(
    state: &AppState,
    user: &AuthUser,
    id: i64,
    denial: &str,
) -> Result<Project, ApiError> {
    let project = load_project(&state.repo, id).await?;
    let actor = user.actor();
    // Only ask about assignments when ownership and role did not settle it.
    let visible = policy::can_view_project(&actor, &project, false)
        || policy::can_view_project(
            &actor,
            &project,
            state.repo.is_assignee_in_project(id, user.id).await?,
        );
    if !visible {
        tracing::warn!(project_id = id, user_id = user.id, "project access denied");
        return Err(ApiError::forbidden(denial));
    }
    Ok(project)
}
