use super::{NewProject, RepoResult, Repository, RepositoryError};
use crate::models::{
    Baseline, CreateBaselineRequest, CreateTaskDefinitionRequest, Evidence, NewEvidence, NewTask,
    NewUser, Project, Role, Task, TaskDefinition, User,
};
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

const PROJECT_COLUMNS: &str =
    "id, name, description, status, priority, project_type, start_date, end_date, owner_id";
const TASK_COLUMNS: &str = "id, project_id, task_definition_id, title, description, status, \
     priority, assigned_to_id, due_date, created_at, updated_at";
const EVIDENCE_COLUMNS: &str = "id, project_task_id, uploaded_by_id, file_name, storage_key, \
     tool_type, notes, mime_type, verified, upload_date";

/// Raw `users` row; `role` is stored as text and validated on the way out.
#[derive(FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    password_hash: Option<String>,
    role: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        let role = row.role.parse().unwrap_or_else(|e| {
            // The CHECK constraint makes this unreachable unless the schema drifts.
            tracing::warn!(
                user_id = row.id,
                error = %e,
                "unknown role in database, treating as read_only"
            );
            Role::ReadOnly
        });
        User {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            role,
        }
    }
}

/// Maps unique-constraint violations to `Conflict` with a caller-facing message.
fn conflict_or(err: sqlx::Error, msg: impl FnOnce(&str) -> String) -> RepositoryError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return RepositoryError::Conflict(msg(db.constraint().unwrap_or_default()));
        }
    }
    RepositoryError::from(err)
}

/// PostgresRepository
///
/// The production implementation of `Repository`. Queries are built at runtime with
/// bound parameters only; the schema lives in `migrations/`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (username, email, password_hash, role) VALUES ($1, $2, $3, $4) \
             RETURNING id, username, email, password_hash, role",
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map(User::from)
        .map_err(|e| {
            conflict_or(e, |constraint| {
                if constraint.contains("email") {
                    "Email already exists".to_string()
                } else {
                    "Username already exists".to_string()
                }
            })
        })
    }

    async fn get_user(&self, id: i64) -> RepoResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, email, password_hash, role FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, email, password_hash, role FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn list_users(&self) -> RepoResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, email, password_hash, role FROM users ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn set_user_role(&self, id: i64, role: Role) -> RepoResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "UPDATE users SET role = $1 WHERE id = $2 \
             RETURNING id, username, email, password_hash, role",
        )
        .bind(role.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn create_project(&self, project: NewProject) -> RepoResult<Project> {
        let sql = format!(
            "INSERT INTO projects (name, description, status, priority, project_type, start_date, end_date, owner_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {PROJECT_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Project>(&sql)
            .bind(&project.name)
            .bind(&project.description)
            .bind(&project.status)
            .bind(&project.priority)
            .bind(&project.project_type)
            .bind(project.start_date)
            .bind(project.end_date)
            .bind(project.owner_id)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn get_project(&self, id: i64) -> RepoResult<Option<Project>> {
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1");
        Ok(sqlx::query_as::<_, Project>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_projects(&self) -> RepoResult<Vec<Project>> {
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY id");
        Ok(sqlx::query_as::<_, Project>(&sql).fetch_all(&self.pool).await?)
    }

    async fn list_projects_owned_by(&self, owner_id: i64) -> RepoResult<Vec<Project>> {
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE owner_id = $1 ORDER BY id");
        Ok(sqlx::query_as::<_, Project>(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn save_project(&self, project: &Project) -> RepoResult<Option<Project>> {
        let sql = format!(
            "UPDATE projects SET name = $1, description = $2, status = $3, priority = $4, \
             project_type = $5, start_date = $6, end_date = $7 WHERE id = $8 \
             RETURNING {PROJECT_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Project>(&sql)
            .bind(&project.name)
            .bind(&project.description)
            .bind(&project.status)
            .bind(&project.priority)
            .bind(&project.project_type)
            .bind(project.start_date)
            .bind(project.end_date)
            .bind(project.id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_project(&self, id: i64) -> RepoResult<Option<Vec<String>>> {
        let mut tx = self.pool.begin().await?;

        let keys: Vec<String> = sqlx::query_scalar(
            "SELECT e.storage_key FROM evidence e \
             JOIN project_tasks t ON t.id = e.project_task_id WHERE t.project_id = $1",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        // Tasks and evidence go with the project through ON DELETE CASCADE.
        let deleted = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok((deleted > 0).then_some(keys))
    }

    async fn is_assignee_in_project(&self, project_id: i64, user_id: i64) -> RepoResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM project_tasks WHERE project_id = $1 AND assigned_to_id = $2)",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn create_task(&self, task: NewTask) -> RepoResult<Task> {
        let sql = format!(
            "INSERT INTO project_tasks (project_id, task_definition_id, title, description, status, priority, assigned_to_id, due_date) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {TASK_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Task>(&sql)
            .bind(task.project_id)
            .bind(task.task_definition_id)
            .bind(&task.title)
            .bind(&task.description)
            .bind(&task.status)
            .bind(&task.priority)
            .bind(task.assigned_to_id)
            .bind(task.due_date)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn get_task(&self, id: i64) -> RepoResult<Option<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM project_tasks WHERE id = $1");
        Ok(sqlx::query_as::<_, Task>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_tasks(&self, project_id: i64) -> RepoResult<Vec<Task>> {
        let sql =
            format!("SELECT {TASK_COLUMNS} FROM project_tasks WHERE project_id = $1 ORDER BY id");
        Ok(sqlx::query_as::<_, Task>(&sql)
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn save_task(&self, task: &Task) -> RepoResult<Option<Task>> {
        let sql = format!(
            "UPDATE project_tasks SET title = $1, description = $2, status = $3, priority = $4, \
             assigned_to_id = $5, due_date = $6, updated_at = NOW() WHERE id = $7 \
             RETURNING {TASK_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Task>(&sql)
            .bind(&task.title)
            .bind(&task.description)
            .bind(&task.status)
            .bind(&task.priority)
            .bind(task.assigned_to_id)
            .bind(task.due_date)
            .bind(task.id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_evidence(&self, evidence: NewEvidence) -> RepoResult<Evidence> {
        let sql = format!(
            "INSERT INTO evidence (project_task_id, uploaded_by_id, file_name, storage_key, tool_type, notes, mime_type) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {EVIDENCE_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Evidence>(&sql)
            .bind(evidence.project_task_id)
            .bind(evidence.uploaded_by_id)
            .bind(&evidence.file_name)
            .bind(&evidence.storage_key)
            .bind(&evidence.tool_type)
            .bind(&evidence.notes)
            .bind(&evidence.mime_type)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn get_evidence(&self, id: i64) -> RepoResult<Option<Evidence>> {
        let sql = format!("SELECT {EVIDENCE_COLUMNS} FROM evidence WHERE id = $1");
        Ok(sqlx::query_as::<_, Evidence>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_evidence(&self, task_id: i64) -> RepoResult<Vec<Evidence>> {
        let sql = format!(
            "SELECT {EVIDENCE_COLUMNS} FROM evidence WHERE project_task_id = $1 ORDER BY id"
        );
        Ok(sqlx::query_as::<_, Evidence>(&sql)
            .bind(task_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_evidence(
        &self,
        id: i64,
        notes: Option<String>,
        verified: bool,
    ) -> RepoResult<Option<Evidence>> {
        let sql = format!(
            "UPDATE evidence SET notes = $1, verified = $2 WHERE id = $3 RETURNING {EVIDENCE_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Evidence>(&sql)
            .bind(notes)
            .bind(verified)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_evidence(&self, id: i64) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM evidence WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_baseline(
        &self,
        req: CreateBaselineRequest,
        created_by_id: i64,
    ) -> RepoResult<Baseline> {
        let name = req.name.clone();
        sqlx::query_as::<_, Baseline>(
            "INSERT INTO baselines (name, description, created_by_id) VALUES ($1, $2, $3) \
             RETURNING id, name, description, created_by_id",
        )
        .bind(&req.name)
        .bind(&req.description)
        .bind(created_by_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or(e, |_| format!("Baseline with name '{name}' already exists")))
    }

    async fn get_baseline(&self, id: i64) -> RepoResult<Option<Baseline>> {
        Ok(sqlx::query_as::<_, Baseline>(
            "SELECT id, name, description, created_by_id FROM baselines WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_baselines(&self) -> RepoResult<Vec<Baseline>> {
        Ok(sqlx::query_as::<_, Baseline>(
            "SELECT id, name, description, created_by_id FROM baselines ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn add_task_definition(
        &self,
        baseline_id: i64,
        req: CreateTaskDefinitionRequest,
    ) -> RepoResult<TaskDefinition> {
        Ok(sqlx::query_as::<_, TaskDefinition>(
            "INSERT INTO task_definitions (baseline_id, title, description, category) \
             VALUES ($1, $2, $3, $4) RETURNING id, baseline_id, title, description, category",
        )
        .bind(baseline_id)
        .bind(&req.title)
        .bind(&req.description)
        .bind(&req.category)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn list_task_definitions(&self, baseline_id: i64) -> RepoResult<Vec<TaskDefinition>> {
        Ok(sqlx::query_as::<_, TaskDefinition>(
            "SELECT id, baseline_id, title, description, category FROM task_definitions \
             WHERE baseline_id = $1 ORDER BY id",
        )
        .bind(baseline_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn apply_baseline(&self, project_id: i64, baseline_id: i64) -> RepoResult<u32> {
        let result = sqlx::query(
            "INSERT INTO project_tasks \
             (project_id, task_definition_id, title, description, status, priority) \
             SELECT $1, d.id, d.title, d.description, 'pending', 'Medium' FROM task_definitions d \
             WHERE d.baseline_id = $2 AND NOT EXISTS ( \
                 SELECT 1 FROM project_tasks t \
                 WHERE t.project_id = $1 AND t.task_definition_id = d.id)",
        )
        .bind(project_id)
        .bind(baseline_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as u32)
    }
}
