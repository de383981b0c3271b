use axum::{
    Json,
    extract::{Multipart, Path, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

use super::{load_evidence, load_task};
use crate::{
    AppState,
    auth::AuthUser,
    error::ApiError,
    models::{Evidence, EvidenceUploadForm, MessageResponse, NewEvidence, UpdateEvidenceRequest},
    policy,
    storage::{evidence_key, sanitize_file_name},
};

/// Fields collected from the evidence upload form.
#[derive(Default)]
struct UploadParts {
    file: Option<(String, Option<String>, Vec<u8>)>,
    notes: Option<String>,
    tool_type: Option<String>,
}

async fn read_upload(mut multipart: Multipart) -> Result<UploadParts, ApiError> {
    let mut parts = UploadParts::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {e}")))?;
                parts.file = Some((file_name, content_type, bytes.to_vec()));
            }
            "notes" | "tool_type" => {
                let text = field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("Failed to read field {name}: {e}"))
                })?;
                let value = Some(text).filter(|t| !t.trim().is_empty());
                if name == "notes" {
                    parts.notes = value;
                } else {
                    parts.tool_type = value;
                }
            }
            other => tracing::debug!(field = other, "ignoring unknown multipart field"),
        }
    }
    Ok(parts)
}

/// add_evidence
///
/// [Authenticated Route] Uploads a file and attaches it to a task as unverified evidence.
/// The project owner, the assignee and admins may upload; read-only users may not.
#[utoipa::path(
    post,
    path = "/api/tasks/{id}/evidence",
    params(("id" = i64, Path, description = "Task ID")),
    request_body(content = EvidenceUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Evidence stored", body = Evidence),
        (status = 400, description = "No file in request", body = MessageResponse),
        (status = 403, description = "Not allowed to add evidence", body = MessageResponse),
        (status = 404, description = "Task not found", body = MessageResponse)
    )
)]
pub async fn add_evidence(
    user: AuthUser,
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Evidence>), ApiError> {
    let (task, project) = load_task(&state.repo, task_id).await?;
    if !policy::can_add_evidence(&user.actor(), &project, &task) {
        return Err(ApiError::forbidden("Unauthorized to add evidence to this task"));
    }

    let upload = read_upload(multipart).await?;
    let Some((raw_name, content_type, bytes)) = upload.file else {
        return Err(ApiError::bad_request("No file part in request"));
    };
    if raw_name.trim().is_empty() {
        return Err(ApiError::bad_request("No selected file"));
    }

    let file_name = sanitize_file_name(&raw_name);
    let key = evidence_key(task_id, &file_name);
    let size = bytes.len();
    state
        .storage
        .put_object(&key, bytes, content_type.as_deref())
        .await?;

    let created = state
        .repo
        .create_evidence(NewEvidence {
            project_task_id: task_id,
            uploaded_by_id: user.id,
            file_name,
            storage_key: key.clone(),
            tool_type: upload.tool_type,
            notes: upload.notes,
            mime_type: content_type,
        })
        .await;

    match created {
        Ok(evidence) => {
            tracing::info!(evidence_id = evidence.id, task_id, size, "evidence uploaded");
            Ok((StatusCode::CREATED, Json(evidence)))
        }
        Err(e) => {
            // Do not leave an orphaned object behind a failed insert.
            if let Err(cleanup) = state.storage.delete_object(&key).await {
                tracing::warn!(%key, error = %cleanup, "failed to remove orphaned evidence object");
            }
            Err(e.into())
        }
    }
}

/// get_task_evidence
///
/// [Authenticated Route] Evidence attached to a task, with the task's visibility.
#[utoipa::path(
    get,
    path = "/api/tasks/{id}/evidence",
    params(("id" = i64, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Evidence list", body = [Evidence]),
        (status = 403, description = "Not visible to caller", body = MessageResponse),
        (status = 404, description = "Task not found", body = MessageResponse)
    )
)]
pub async fn get_task_evidence(
    user: AuthUser,
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> Result<Json<Vec<Evidence>>, ApiError> {
    let (task, project) = load_task(&state.repo, task_id).await?;
    if !policy::can_view_task(&user.actor(), &project, &task) {
        return Err(ApiError::forbidden("Unauthorized to view evidence for this task"));
    }
    Ok(Json(state.repo.list_evidence(task_id).await?))
}

/// get_evidence
///
/// [Authenticated Route] One evidence record. Task viewers and the uploader.
#[utoipa::path(
    get,
    path = "/api/evidence/{id}",
    params(("id" = i64, Path, description = "Evidence ID")),
    responses(
        (status = 200, description = "Found", body = Evidence),
        (status = 403, description = "Not visible to caller", body = MessageResponse),
        (status = 404, description = "Not found", body = MessageResponse)
    )
)]
pub async fn get_evidence(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Evidence>, ApiError> {
    let (evidence, task, project) = load_evidence(&state.repo, id).await?;
    if !policy::can_view_evidence(&user.actor(), &project, &task, &evidence) {
        return Err(ApiError::forbidden("Unauthorized to view this evidence"));
    }
    Ok(Json(evidence))
}

/// update_evidence
///
/// [Authenticated Route] The explicit verification action: sets `notes` and/or
/// `verified`. Project owner (consultant) or admin only.
#[utoipa::path(
    put,
    path = "/api/evidence/{id}",
    params(("id" = i64, Path, description = "Evidence ID")),
    request_body = UpdateEvidenceRequest,
    responses(
        (status = 200, description = "Updated", body = Evidence),
        (status = 403, description = "Not allowed to verify", body = MessageResponse),
        (status = 404, description = "Not found", body = MessageResponse)
    )
)]
pub async fn update_evidence(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<UpdateEvidenceRequest>, JsonRejection>,
) -> Result<Json<Evidence>, ApiError> {
    let Json(req) = payload?;
    let (evidence, _task, project) = load_evidence(&state.repo, id).await?;
    if !policy::can_update_evidence(&user.actor(), &project) {
        return Err(ApiError::forbidden("Unauthorized to update this evidence"));
    }

    let notes = req.notes.or(evidence.notes);
    let verified = req.verified.unwrap_or(evidence.verified);
    let updated = state
        .repo
        .update_evidence(id, notes, verified)
        .await?
        .ok_or_else(|| ApiError::not_found("Evidence not found"))?;

    if updated.verified != evidence.verified {
        tracing::info!(
            evidence_id = id,
            verified = updated.verified,
            user_id = user.id,
            "evidence verification changed"
        );
    }
    Ok(Json(updated))
}

/// delete_evidence
///
/// [Authenticated Route] Removes the record and its stored file. Project owner, admin,
/// or the uploader.
#[utoipa::path(
    delete,
    path = "/api/evidence/{id}",
    params(("id" = i64, Path, description = "Evidence ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 403, description = "Not allowed to delete", body = MessageResponse),
        (status = 404, description = "Not found", body = MessageResponse)
    )
)]
pub async fn delete_evidence(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let (evidence, _task, project) = load_evidence(&state.repo, id).await?;
    if !policy::can_delete_evidence(&user.actor(), &project, &evidence) {
        return Err(ApiError::forbidden("Unauthorized to delete this evidence"));
    }

    if !state.repo.delete_evidence(id).await? {
        return Err(ApiError::not_found("Evidence not found"));
    }
    if let Err(e) = state.storage.delete_object(&evidence.storage_key).await {
        tracing::warn!(key = %evidence.storage_key, error = %e, "failed to remove evidence object");
    }
    Ok(Json(MessageResponse::new("Evidence deleted successfully")))
}

/// download_evidence
///
/// [Authenticated Route] Streams the stored file back as an attachment, with the same
/// visibility as GET /evidence/{id}.
#[utoipa::path(
    get,
    path = "/api/evidence/{id}/download",
    params(("id" = i64, Path, description = "Evidence ID")),
    responses(
        (status = 200, description = "File contents", content_type = "application/octet-stream"),
        (status = 403, description = "Not visible to caller", body = MessageResponse),
        (status = 404, description = "Evidence or file not found", body = MessageResponse)
    )
)]
pub async fn download_evidence(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let (evidence, task, project) = load_evidence(&state.repo, id).await?;
    if !policy::can_view_evidence(&user.actor(), &project, &task, &evidence) {
        return Err(ApiError::forbidden("Unauthorized to download this evidence"));
    }

    let bytes = state.storage.get_object(&evidence.storage_key).await?;
    let content_type = evidence
        .mime_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let disposition = format!(
        "attachment; filename=\"{}\"",
        sanitize_file_name(&evidence.file_name)
    );

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}
