use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};

use super::{load_project, require_field};
use crate::{
    AppState,
    auth::AuthUser,
    error::ApiError,
    models::{
        ApplyBaselineResponse, Baseline, CreateBaselineRequest, CreateTaskDefinitionRequest,
        MessageResponse, TaskDefinition,
    },
    policy,
    repository::RepositoryState,
};

async fn load_baseline(repo: &RepositoryState, id: i64) -> Result<Baseline, ApiError> {
    repo.get_baseline(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Baseline not found"))
}

/// get_baselines
///
/// [Authenticated Route] Every baseline checklist.
#[utoipa::path(
    get,
    path = "/api/baselines",
    responses((status = 200, description = "Baselines", body = [Baseline]))
)]
pub async fn get_baselines(
    _user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Baseline>>, ApiError> {
    Ok(Json(state.repo.list_baselines().await?))
}

/// create_baseline
///
/// [Authenticated Route] Admins and consultants. Baseline names are unique.
#[utoipa::path(
    post,
    path = "/api/baselines",
    request_body = CreateBaselineRequest,
    responses(
        (status = 201, description = "Created", body = Baseline),
        (status = 400, description = "Missing or duplicate name", body = MessageResponse),
        (status = 403, description = "Role not allowed", body = MessageResponse)
    )
)]
pub async fn create_baseline(
    user: AuthUser,
    State(state): State<AppState>,
    payload: Result<Json<CreateBaselineRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Baseline>), ApiError> {
    user.require_role(policy::CREATOR_ROLES)?;
    let Json(mut req) = payload?;
    require_field(&req.name, "Missing baseline name")?;
    req.name = req.name.trim().to_string();

    let baseline = state.repo.create_baseline(req, user.id).await?;
    tracing::info!(baseline_id = baseline.id, name = %baseline.name, "baseline created");
    Ok((StatusCode::CREATED, Json(baseline)))
}

/// get_task_definitions
#[utoipa::path(
    get,
    path = "/api/baselines/{id}/task_definitions",
    params(("id" = i64, Path, description = "Baseline ID")),
    responses(
        (status = 200, description = "Definitions", body = [TaskDefinition]),
        (status = 404, description = "Baseline not found", body = MessageResponse)
    )
)]
pub async fn get_task_definitions(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<TaskDefinition>>, ApiError> {
    load_baseline(&state.repo, id).await?;
    Ok(Json(state.repo.list_task_definitions(id).await?))
}

/// add_task_definition
///
/// [Authenticated Route] Appends a template task to a baseline. Admins and consultants.
#[utoipa::path(
    post,
    path = "/api/baselines/{id}/task_definitions",
    params(("id" = i64, Path, description = "Baseline ID")),
    request_body = CreateTaskDefinitionRequest,
    responses(
        (status = 201, description = "Created", body = TaskDefinition),
        (status = 400, description = "Missing title", body = MessageResponse),
        (status = 403, description = "Role not allowed", body = MessageResponse),
        (status = 404, description = "Baseline not found", body = MessageResponse)
    )
)]
pub async fn add_task_definition(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<CreateTaskDefinitionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TaskDefinition>), ApiError> {
    user.require_role(policy::CREATOR_ROLES)?;
    let Json(mut req) = payload?;
    require_field(&req.title, "Missing task definition title")?;
    req.title = req.title.trim().to_string();
    load_baseline(&state.repo, id).await?;

    let definition = state.repo.add_task_definition(id, req).await?;
    Ok((StatusCode::CREATED, Json(definition)))
}

/// apply_baseline
///
/// [Authenticated Route] Copies the baseline's task definitions into the project as
/// pending tasks. Definitions already applied to the project are skipped, so applying
/// twice creates nothing the second time. Project owner (consultant) or admin.
#[utoipa::path(
    post,
    path = "/api/projects/{id}/apply_baseline/{baseline_id}",
    params(
        ("id" = i64, Path, description = "Project ID"),
        ("baseline_id" = i64, Path, description = "Baseline ID")
    ),
    responses(
        (status = 201, description = "Tasks created", body = ApplyBaselineResponse),
        (status = 200, description = "Nothing new to create", body = ApplyBaselineResponse),
        (status = 403, description = "Not owner", body = MessageResponse),
        (status = 404, description = "Project or baseline not found", body = MessageResponse)
    )
)]
pub async fn apply_baseline(
    user: AuthUser,
    State(state): State<AppState>,
    Path((project_id, baseline_id)): Path<(i64, i64)>,
) -> Result<(StatusCode, Json<ApplyBaselineResponse>), ApiError> {
    let project = load_project(&state.repo, project_id).await?;
    if !policy::can_manage_project(&user.actor(), &project) {
        return Err(ApiError::forbidden("Unauthorized to apply baselines to this project"));
    }
    let baseline = load_baseline(&state.repo, baseline_id).await?;

    let created = state.repo.apply_baseline(project_id, baseline_id).await?;
    tracing::info!(project_id, baseline_id, created, "baseline applied");

    let status = if created > 0 { StatusCode::CREATED } else { StatusCode::OK };
    Ok((
        status,
        Json(ApplyBaselineResponse {
            msg: format!(
                "Baseline '{}' applied to project '{}': {created} task(s) created",
                baseline.name, project.name
            ),
            created,
        }),
    ))
}
