use crate::{AppState, handlers};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// The engagement workflow: projects, tasks, evidence, baselines and the user directory.
/// Every handler receives a validated `AuthUser` and checks role and ownership itself.
///
/// `max_upload_bytes` bounds the multipart body of evidence uploads only; JSON routes keep
/// Axum's default limit.
pub fn authenticated_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::<AppState>::new()
        // GET /me
        // The caller's own profile. Clients call this to validate a stored token.
        .route("/me", get(handlers::get_me))
        // GET /users
        // Directory for assignee pickers.
        .route("/users", get(handlers::get_users))
        // --- Projects ---
        // Admins and read_only users see every project; consultants see their own.
        .route(
            "/projects",
            get(handlers::get_projects).post(handlers::create_project),
        )
        .route(
            "/projects/{id}",
            get(handlers::get_project)
                .put(handlers::update_project)
                .delete(handlers::delete_project),
        )
        // --- Tasks ---
        .route(
            "/projects/{id}/tasks",
            get(handlers::get_project_tasks).post(handlers::create_task),
        )
        .route(
            "/tasks/{id}",
            get(handlers::get_task).put(handlers::update_task),
        )
        // --- Evidence ---
        // POST /tasks/{id}/evidence
        // Multipart upload (`file`, optional `notes` and `tool_type`).
        .route(
            "/tasks/{id}/evidence",
            get(handlers::get_task_evidence)
                .post(handlers::add_evidence)
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route(
            "/evidence/{id}",
            get(handlers::get_evidence)
                .put(handlers::update_evidence)
                .delete(handlers::delete_evidence),
        )
        .route("/evidence/{id}/download", get(handlers::download_evidence))
        // --- Baselines ---
        .route(
            "/baselines",
            get(handlers::get_baselines).post(handlers::create_baseline),
        )
        .route(
            "/baselines/{id}/task_definitions",
            get(handlers::get_task_definitions).post(handlers::add_task_definition),
        )
        // POST /projects/{id}/apply_baseline/{baseline_id}
        // Idempotent: definitions already applied to the project are skipped.
        .route(
            "/projects/{id}/apply_baseline/{baseline_id}",
            post(handlers::apply_baseline),
        )
}
