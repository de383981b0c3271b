//! HTTP handlers, grouped by resource.
//!
//! Every handler follows the same shape: resolve the caller (`AuthUser`), load the
//! records involved, ask `policy` whether the caller may proceed, then act. Denials are
//! 403 with a `{"msg"}` body; missing records are 404.

use crate::{
    error::ApiError,
    models::{Evidence, Project, Task},
    repository::RepositoryState,
};

pub mod auth;
pub mod baselines;
pub mod evidence;
pub mod projects;
pub mod tasks;
pub mod users;

pub use auth::{get_me, login, register_user};
pub use baselines::{
    add_task_definition, apply_baseline, create_baseline, get_baselines, get_task_definitions,
};
pub use evidence::{
    add_evidence, delete_evidence, download_evidence, get_evidence, get_task_evidence,
    update_evidence,
};
pub use projects::{
    create_project, delete_project, get_project, get_project_tasks, get_projects, update_project,
};
pub use tasks::{create_task, get_task, update_task};
pub use users::{get_users, update_user_role};

pub(crate) async fn load_project(repo: &RepositoryState, id: i64) -> Result<Project, ApiError> {
    repo.get_project(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project not found"))
}

/// Loads a task together with its parent project.
pub(crate) async fn load_task(
    repo: &RepositoryState,
    id: i64,
) -> Result<(Task, Project), ApiError> {
    let task = repo
        .get_task(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Task not found"))?;
    let project = repo.get_project(task.project_id).await?.ok_or_else(|| {
        ApiError::Internal(format!(
            "task {} references missing project {}",
            task.id, task.project_id
        ))
    })?;
    Ok((task, project))
}

/// Loads an evidence record with the task and project it belongs to.
pub(crate) async fn load_evidence(
    repo: &RepositoryState,
    id: i64,
) -> Result<(Evidence, Task, Project), ApiError> {
    let evidence = repo
        .get_evidence(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Evidence not found"))?;
    let (task, project) = load_task(repo, evidence.project_task_id).await?;
    Ok((evidence, task, project))
}

/// Rejects with 400 naming `field` when a required text field is blank.
pub(crate) fn require_field(value: &str, msg: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(msg));
    }
    Ok(())
}

/// Parses an optional ISO date from a request, naming the field on failure.
pub(crate) fn date_field(
    value: Option<&str>,
    field: &str,
) -> Result<Option<chrono::NaiveDate>, ApiError> {
    crate::models::parse_date(value)
        .map_err(|_| ApiError::bad_request(format!("Invalid {field}, expected YYYY-MM-DD")))
}

/// Rejects with 400 when an assignee id does not name an existing user.
pub(crate) async fn ensure_user_exists(
    repo: &RepositoryState,
    user_id: i64,
) -> Result<(), ApiError> {
    if repo.get_user(user_id).await?.is_none() {
        return Err(ApiError::bad_request(format!(
            "Assignee user with id {user_id} not found"
        )));
    }
    Ok(())
}
