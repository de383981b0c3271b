use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;
use utoipa::ToSchema;

// --- Roles ---

/// Role
///
/// The RBAC field carried by every user. Serialized as `admin`, `consultant` or
/// `read_only`, both on the wire and in the `users.role` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Role {
    Admin,
    Consultant,
    #[default]
    ReadOnly,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Consultant, Role::ReadOnly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Consultant => "consultant",
            Role::ReadOnly => "read_only",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "consultant" => Ok(Role::Consultant),
            "read_only" => Ok(Role::ReadOnly),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

// --- Users ---

/// User
///
/// The canonical identity record stored in the `users` table. Never serialized to
/// clients directly since it carries the password hash.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// Argon2 PHC string. `None` for accounts that cannot log in with a password.
    pub password_hash: Option<String>,
    pub role: Role,
}

impl User {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            role: Some(self.role),
        }
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }
}

/// NewUser
///
/// Insert payload for the repository; the password has already been hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub role: Role,
}

/// UserProfile
///
/// Output schema for the authenticated user's profile (GET /me), also the profile the
/// client caches next to its token. `role` is optional on the client side: a profile
/// without a role is representable and is denied by every role check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<Role>,
}

/// UserSummary
///
/// Row of the user directory (GET /users), used for assignee pickers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: Role,
}

// --- Projects ---

/// Project
///
/// An engagement record from the `projects` table. `owner_id` is the ownership
/// relation every consultant-level permission check is made against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: Option<String>,
    pub project_type: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub owner_id: i64,
}

pub const DEFAULT_PROJECT_STATUS: &str = "active";
pub const DEFAULT_PRIORITY: &str = "Medium";
pub const DEFAULT_TASK_STATUS: &str = "pending";

/// CreateProjectRequest
///
/// Input payload for POST /projects. Dates are ISO `YYYY-MM-DD` strings; an empty
/// string is the same as leaving the date out.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateProjectRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

/// UpdateProjectRequest
///
/// Partial update for PUT /projects/{id}. Absent fields are left untouched. For the
/// date fields an explicit `null` (or empty string) clears the stored date.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct UpdateProjectRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_type: Option<String>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub start_date: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub end_date: Option<Option<String>>,
}

// --- Tasks ---

/// Task
///
/// A unit of work inside exactly one project (`project_tasks` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Task {
    pub id: i64,
    pub project_id: i64,
    pub task_definition_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: Option<String>,
    pub assigned_to_id: Option<i64>,
    pub due_date: Option<NaiveDate>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// NewTask
///
/// Validated insert payload handed to the repository.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub project_id: i64,
    pub task_definition_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: Option<String>,
    pub assigned_to_id: Option<i64>,
    pub due_date: Option<NaiveDate>,
}

/// CreateTaskRequest
///
/// Input payload for POST /projects/{id}/tasks.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateTaskRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
}

/// UpdateTaskRequest
///
/// Partial update for PUT /tasks/{id}. The project owner may change every field; the
/// assignee only `status` and `description`. `assigned_to_id: null` unassigns.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct UpdateTaskRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<i64>)]
    pub assigned_to_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub due_date: Option<Option<String>>,
}

// --- Evidence ---

/// Evidence
///
/// A file artifact attached to one task. `storage_key` locates the bytes in object
/// storage; `verified` only changes through PUT /evidence/{id}.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Evidence {
    pub id: i64,
    pub project_task_id: i64,
    pub uploaded_by_id: i64,
    pub file_name: String,
    pub storage_key: String,
    pub tool_type: Option<String>,
    pub notes: Option<String>,
    pub mime_type: Option<String>,
    pub verified: bool,
    #[ts(type = "string")]
    pub upload_date: DateTime<Utc>,
}

/// NewEvidence
///
/// Insert payload created after the file bytes have been stored.
#[derive(Debug, Clone)]
pub struct NewEvidence {
    pub project_task_id: i64,
    pub uploaded_by_id: i64,
    pub file_name: String,
    pub storage_key: String,
    pub tool_type: Option<String>,
    pub notes: Option<String>,
    pub mime_type: Option<String>,
}

/// UpdateEvidenceRequest
///
/// Input payload for PUT /evidence/{id}: the explicit verification action.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateEvidenceRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
}

/// EvidenceUploadForm
///
/// Documentation-only description of the multipart body for POST /tasks/{id}/evidence.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct EvidenceUploadForm {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    pub notes: Option<String>,
    pub tool_type: Option<String>,
}

// --- Baselines ---

/// Baseline
///
/// A named, reusable checklist of task definitions (e.g. "OWASP web app").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Baseline {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_by_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateBaselineRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// TaskDefinition
///
/// One template task of a baseline; applying the baseline copies it into a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct TaskDefinition {
    pub id: i64,
    pub baseline_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateTaskDefinitionRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ApplyBaselineResponse {
    pub msg: String,
    pub created: u32,
}

// --- Auth payloads ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub access_token: String,
}

/// RegisterUserRequest
///
/// Input payload for POST /auth/register. The password is hashed before it reaches
/// the repository and is never logged.
#[derive(Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RegisterUserRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for RegisterUserRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterUserRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisteredUser {
    pub id: i64,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterResponse {
    pub msg: String,
    pub user: RegisteredUser,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

/// MessageResponse
///
/// The `{"msg": ...}` body used for confirmations and for every error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MessageResponse {
    pub msg: String,
}

impl MessageResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

// --- Helpers ---

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Parses an optional ISO date. Empty strings mean "no date".
pub fn parse_date(value: Option<&str>) -> Result<Option<NaiveDate>, chrono::ParseError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d").map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_its_wire_name() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
            assert_eq!(serde_json::to_value(role).unwrap(), role.as_str());
        }
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn update_request_distinguishes_null_from_absent() {
        let req: UpdateProjectRequest =
            serde_json::from_str(r#"{"start_date": null, "name": "X"}"#).unwrap();
        assert_eq!(req.start_date, Some(None));
        assert_eq!(req.end_date, None);
        assert_eq!(req.name.as_deref(), Some("X"));
    }

    #[test]
    fn parse_date_treats_blank_as_missing() {
        assert_eq!(parse_date(None).unwrap(), None);
        assert_eq!(parse_date(Some("  ")).unwrap(), None);
        assert_eq!(
            parse_date(Some("2025-03-01")).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 1)
        );
        assert!(parse_date(Some("01/03/2025")).is_err());
    }

    #[test]
    fn profile_without_role_deserializes() {
        let p: UserProfile =
            serde_json::from_str(r#"{"id":1,"username":"a","email":"a@x"}"#).unwrap();
        assert_eq!(p.role, None);
    }
}
