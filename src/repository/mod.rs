use crate::models::{
    Baseline, CreateBaselineRequest, CreateProjectRequest, CreateTaskDefinitionRequest, Evidence,
    NewEvidence, NewTask, NewUser, Project, Role, Task, TaskDefinition, User,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

mod memory;
mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// A uniqueness constraint was hit (duplicate username, email, baseline name).
    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        RepositoryError::Database(err.to_string())
    }
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// NewProject
///
/// Validated insert payload: dates already parsed, defaults already applied.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: Option<String>,
    pub project_type: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub owner_id: i64,
}

impl NewProject {
    pub fn from_request(
        req: CreateProjectRequest,
        owner_id: i64,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            name: req.name.trim().to_string(),
            description: req.description,
            status: req
                .status
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| crate::models::DEFAULT_PROJECT_STATUS.to_string()),
            priority: Some(
                req.priority
                    .filter(|p| !p.is_empty())
                    .unwrap_or_else(|| crate::models::DEFAULT_PRIORITY.to_string()),
            ),
            project_type: req.project_type,
            start_date,
            end_date,
            owner_id,
        }
    }
}

/// Repository Trait
///
/// The persistence contract. Handlers talk to `Arc<dyn Repository>` only, so the
/// Postgres and in-memory implementations are interchangeable. Authorization is *not*
/// done here: handlers load the records and ask `policy` before acting.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn create_user(&self, user: NewUser) -> RepoResult<User>;
    async fn get_user(&self, id: i64) -> RepoResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>>;
    async fn list_users(&self) -> RepoResult<Vec<User>>;
    async fn set_user_role(&self, id: i64, role: Role) -> RepoResult<Option<User>>;

    // --- Projects ---
    async fn create_project(&self, project: NewProject) -> RepoResult<Project>;
    async fn get_project(&self, id: i64) -> RepoResult<Option<Project>>;
    async fn list_projects(&self) -> RepoResult<Vec<Project>>;
    async fn list_projects_owned_by(&self, owner_id: i64) -> RepoResult<Vec<Project>>;
    /// Writes every mutable column of `project`. Returns `None` if it no longer exists.
    async fn save_project(&self, project: &Project) -> RepoResult<Option<Project>>;
    /// Deletes the project with its tasks and evidence. Returns the storage keys of the
    /// removed evidence so the caller can clean up object storage, or `None` if absent.
    async fn delete_project(&self, id: i64) -> RepoResult<Option<Vec<String>>>;
    async fn is_assignee_in_project(&self, project_id: i64, user_id: i64) -> RepoResult<bool>;

    // --- Tasks ---
    async fn create_task(&self, task: NewTask) -> RepoResult<Task>;
    async fn get_task(&self, id: i64) -> RepoResult<Option<Task>>;
    async fn list_tasks(&self, project_id: i64) -> RepoResult<Vec<Task>>;
    /// Writes every mutable column of `task` and bumps `updated_at`.
    async fn save_task(&self, task: &Task) -> RepoResult<Option<Task>>;

    // --- Evidence ---
    async fn create_evidence(&self, evidence: NewEvidence) -> RepoResult<Evidence>;
    async fn get_evidence(&self, id: i64) -> RepoResult<Option<Evidence>>;
    async fn list_evidence(&self, task_id: i64) -> RepoResult<Vec<Evidence>>;
    async fn update_evidence(
        &self,
        id: i64,
        notes: Option<String>,
        verified: bool,
    ) -> RepoResult<Option<Evidence>>;
    async fn delete_evidence(&self, id: i64) -> RepoResult<bool>;

    // --- Baselines ---
    async fn create_baseline(
        &self,
        req: CreateBaselineRequest,
        created_by_id: i64,
    ) -> RepoResult<Baseline>;
    async fn get_baseline(&self, id: i64) -> RepoResult<Option<Baseline>>;
    async fn list_baselines(&self) -> RepoResult<Vec<Baseline>>;
    async fn add_task_definition(
        &self,
        baseline_id: i64,
        req: CreateTaskDefinitionRequest,
    ) -> RepoResult<TaskDefinition>;
    async fn list_task_definitions(&self, baseline_id: i64) -> RepoResult<Vec<TaskDefinition>>;
    /// Creates one pending task per definition of the baseline not yet applied to the
    /// project. Returns the number of tasks created.
    async fn apply_baseline(&self, project_id: i64, baseline_id: i64) -> RepoResult<u32>;
}

/// RepositoryState
///
/// The shared handle to the persistence layer inside `AppState`.
pub type RepositoryState = Arc<dyn Repository>;
