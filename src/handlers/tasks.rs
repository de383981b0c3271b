use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};

use super::{date_field, ensure_user_exists, load_project, load_task, require_field};
use crate::{
    AppState,
    auth::AuthUser,
    error::ApiError,
    models::{
        CreateTaskRequest, DEFAULT_PRIORITY, DEFAULT_TASK_STATUS, MessageResponse, NewTask, Task,
        UpdateTaskRequest,
    },
    policy::{self, TaskEditScope},
};

/// create_task
///
/// [Authenticated Route] Adds an ad-hoc task to a project. Owner (consultant) or admin.
#[utoipa::path(
    post,
    path = "/api/projects/{id}/tasks",
    params(("id" = i64, Path, description = "Project ID")),
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Created", body = Task),
        (status = 400, description = "Missing title, bad date or unknown assignee", body = MessageResponse),
        (status = 403, description = "Not owner", body = MessageResponse),
        (status = 404, description = "Project not found", body = MessageResponse)
    )
)]
pub async fn create_task(
    user: AuthUser,
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let project = load_project(&state.repo, project_id).await?;
    if !policy::can_manage_project(&user.actor(), &project) {
        return Err(ApiError::forbidden("Unauthorized to add tasks to this project"));
    }
    let Json(req) = payload?;
    require_field(&req.title, "Missing task title")?;
    let due_date = date_field(req.due_date.as_deref(), "due_date")?;
    if let Some(assignee) = req.assigned_to_id {
        ensure_user_exists(&state.repo, assignee).await?;
    }

    let task = state
        .repo
        .create_task(NewTask {
            project_id,
            task_definition_id: None,
            title: req.title.trim().to_string(),
            description: req.description,
            status: req
                .status
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_TASK_STATUS.to_string()),
            priority: Some(
                req.priority
                    .filter(|p| !p.is_empty())
                    .unwrap_or_else(|| DEFAULT_PRIORITY.to_string()),
            ),
            assigned_to_id: req.assigned_to_id,
            due_date,
        })
        .await?;

    tracing::info!(task_id = task.id, project_id, "task created");
    Ok((StatusCode::CREATED, Json(task)))
}

/// get_task
///
/// [Authenticated Route] One task. Visible to admins, read-only users, the project owner
/// and the assignee.
#[utoipa::path(
    get,
    path = "/api/tasks/{id}",
    params(("id" = i64, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Found", body = Task),
        (status = 403, description = "Not visible to caller", body = MessageResponse),
        (status = 404, description = "Not found", body = MessageResponse)
    )
)]
pub async fn get_task(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Task>, ApiError> {
    let (task, project) = load_task(&state.repo, id).await?;
    if !policy::can_view_task(&user.actor(), &project, &task) {
        return Err(ApiError::forbidden("Unauthorized to view this task"));
    }
    Ok(Json(task))
}

/// update_task
///
/// [Authenticated Route] Partial update. The project owner (or an admin) may change any
/// field; the assignee only `status` and `description`, other fields are ignored for them.
#[utoipa::path(
    put,
    path = "/api/tasks/{id}",
    params(("id" = i64, Path, description = "Task ID")),
    request_body = UpdateTaskRequest,
    responses(
        (status = 200, description = "Updated", body = Task),
        (status = 403, description = "Neither owner nor assignee", body = MessageResponse),
        (status = 404, description = "Not found", body = MessageResponse)
    )
)]
pub async fn update_task(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> Result<Json<Task>, ApiError> {
    let Json(req) = payload?;
    let (mut task, project) = load_task(&state.repo, id).await?;
    let scope = policy::task_edit_scope(&user.actor(), &project, &task);

    if scope == TaskEditScope::None {
        return Err(ApiError::forbidden("Unauthorized to update this task"));
    }

    if scope == TaskEditScope::Full {
        if let Some(title) = req.title {
            require_field(&title, "Task title cannot be empty")?;
            task.title = title.trim().to_string();
        }
        if let Some(priority) = req.priority {
            task.priority = Some(priority);
        }
        if let Some(assignee) = req.assigned_to_id {
            if let Some(assignee_id) = assignee {
                ensure_user_exists(&state.repo, assignee_id).await?;
            }
            task.assigned_to_id = assignee;
        }
        if let Some(due_date) = req.due_date {
            task.due_date = date_field(due_date.as_deref(), "due_date")?;
        }
    }

    if let Some(description) = req.description {
        task.description = Some(description);
    }
    if let Some(status) = req.status {
        task.status = status;
    }

    let saved = state
        .repo
        .save_task(&task)
        .await?
        .ok_or_else(|| ApiError::not_found("Task not found"))?;
    Ok(Json(saved))
}
