use super::{NewProject, RepoResult, Repository, RepositoryError};
use crate::models::{
    Baseline, CreateBaselineRequest, CreateTaskDefinitionRequest, DEFAULT_TASK_STATUS, Evidence,
    NewEvidence, NewTask, NewUser, Project, Role, Task, TaskDefinition, User,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: BTreeMap<i64, User>,
    projects: BTreeMap<i64, Project>,
    tasks: BTreeMap<i64, Task>,
    evidence: BTreeMap<i64, Evidence>,
    baselines: BTreeMap<i64, Baseline>,
    task_definitions: BTreeMap<i64, TaskDefinition>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// MemoryRepository
///
/// In-process implementation used by the test suite and by local runs without
/// `DATABASE_URL`. One lock guards all tables so multi-table operations (cascading
/// deletes, applying a baseline) are atomic, like a transaction would be.
#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let mut t = self.tables.write();
        if t.users.values().any(|u| u.username == user.username) {
            return Err(RepositoryError::Conflict("Username already exists".into()));
        }
        if t.users.values().any(|u| u.email == user.email) {
            return Err(RepositoryError::Conflict("Email already exists".into()));
        }
        let id = t.next_id();
        let record = User {
            id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
        };
        t.users.insert(id, record.clone());
        Ok(record)
    }

    async fn get_user(&self, id: i64) -> RepoResult<Option<User>> {
        Ok(self.tables.read().users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        Ok(self
            .tables
            .read()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn list_users(&self) -> RepoResult<Vec<User>> {
        Ok(self.tables.read().users.values().cloned().collect())
    }

    async fn set_user_role(&self, id: i64, role: Role) -> RepoResult<Option<User>> {
        let mut t = self.tables.write();
        Ok(t.users.get_mut(&id).map(|u| {
            u.role = role;
            u.clone()
        }))
    }

    async fn create_project(&self, project: NewProject) -> RepoResult<Project> {
        let mut t = self.tables.write();
        let id = t.next_id();
        let record = Project {
            id,
            name: project.name,
            description: project.description,
            status: project.status,
            priority: project.priority,
            project_type: project.project_type,
            start_date: project.start_date,
            end_date: project.end_date,
            owner_id: project.owner_id,
        };
        t.projects.insert(id, record.clone());
        Ok(record)
    }

    async fn get_project(&self, id: i64) -> RepoResult<Option<Project>> {
        Ok(self.tables.read().projects.get(&id).cloned())
    }

    async fn list_projects(&self) -> RepoResult<Vec<Project>> {
        Ok(self.tables.read().projects.values().cloned().collect())
    }

    async fn list_projects_owned_by(&self, owner_id: i64) -> RepoResult<Vec<Project>> {
        Ok(self
            .tables
            .read()
            .projects
            .values()
            .filter(|p| p.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn save_project(&self, project: &Project) -> RepoResult<Option<Project>> {
        let mut t = self.tables.write();
        Ok(t.projects.get_mut(&project.id).map(|stored| {
            *stored = project.clone();
            stored.clone()
        }))
    }

    async fn delete_project(&self, id: i64) -> RepoResult<Option<Vec<String>>> {
        let mut t = self.tables.write();
        if t.projects.remove(&id).is_none() {
            return Ok(None);
        }
        let task_ids: Vec<i64> = t
            .tasks
            .values()
            .filter(|task| task.project_id == id)
            .map(|task| task.id)
            .collect();
        t.tasks.retain(|_, task| task.project_id != id);

        let mut keys = Vec::new();
        t.evidence.retain(|_, e| {
            if task_ids.contains(&e.project_task_id) {
                keys.push(e.storage_key.clone());
                false
            } else {
                true
            }
        });
        Ok(Some(keys))
    }

    async fn is_assignee_in_project(&self, project_id: i64, user_id: i64) -> RepoResult<bool> {
        Ok(self
            .tables
            .read()
            .tasks
            .values()
            .any(|task| task.project_id == project_id && task.assigned_to_id == Some(user_id)))
    }

    async fn create_task(&self, task: NewTask) -> RepoResult<Task> {
        let mut t = self.tables.write();
        let id = t.next_id();
        let now = Utc::now();
        let record = Task {
            id,
            project_id: task.project_id,
            task_definition_id: task.task_definition_id,
            title: task.title,
            description: task.description,
            status: task.status,
            priority: task.priority,
            assigned_to_id: task.assigned_to_id,
            due_date: task.due_date,
            created_at: now,
            updated_at: now,
        };
        t.tasks.insert(id, record.clone());
        Ok(record)
    }

    async fn get_task(&self, id: i64) -> RepoResult<Option<Task>> {
        Ok(self.tables.read().tasks.get(&id).cloned())
    }

    async fn list_tasks(&self, project_id: i64) -> RepoResult<Vec<Task>> {
        Ok(self
            .tables
            .read()
            .tasks
            .values()
            .filter(|task| task.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn save_task(&self, task: &Task) -> RepoResult<Option<Task>> {
        let mut t = self.tables.write();
        Ok(t.tasks.get_mut(&task.id).map(|stored| {
            *stored = Task {
                updated_at: Utc::now(),
                ..task.clone()
            };
            stored.clone()
        }))
    }

    async fn create_evidence(&self, evidence: NewEvidence) -> RepoResult<Evidence> {
        let mut t = self.tables.write();
        let id = t.next_id();
        let record = Evidence {
            id,
            project_task_id: evidence.project_task_id,
            uploaded_by_id: evidence.uploaded_by_id,
            file_name: evidence.file_name,
            storage_key: evidence.storage_key,
            tool_type: evidence.tool_type,
            notes: evidence.notes,
            mime_type: evidence.mime_type,
            verified: false,
            upload_date: Utc::now(),
        };
        t.evidence.insert(id, record.clone());
        Ok(record)
    }

    async fn get_evidence(&self, id: i64) -> RepoResult<Option<Evidence>> {
        Ok(self.tables.read().evidence.get(&id).cloned())
    }

    async fn list_evidence(&self, task_id: i64) -> RepoResult<Vec<Evidence>> {
        Ok(self
            .tables
            .read()
            .evidence
            .values()
            .filter(|e| e.project_task_id == task_id)
            .cloned()
            .collect())
    }

    async fn update_evidence(
        &self,
        id: i64,
        notes: Option<String>,
        verified: bool,
    ) -> RepoResult<Option<Evidence>> {
        let mut t = self.tables.write();
        Ok(t.evidence.get_mut(&id).map(|e| {
            e.notes = notes;
            e.verified = verified;
            e.clone()
        }))
    }

    async fn delete_evidence(&self, id: i64) -> RepoResult<bool> {
        Ok(self.tables.write().evidence.remove(&id).is_some())
    }

    async fn create_baseline(
        &self,
        req: CreateBaselineRequest,
        created_by_id: i64,
    ) -> RepoResult<Baseline> {
        let mut t = self.tables.write();
        if t.baselines.values().any(|b| b.name == req.name) {
            return Err(RepositoryError::Conflict(format!(
                "Baseline with name '{}' already exists",
                req.name
            )));
        }
        let id = t.next_id();
        let record = Baseline {
            id,
            name: req.name,
            description: req.description,
            created_by_id,
        };
        t.baselines.insert(id, record.clone());
        Ok(record)
    }

    async fn get_baseline(&self, id: i64) -> RepoResult<Option<Baseline>> {
        Ok(self.tables.read().baselines.get(&id).cloned())
    }

    async fn list_baselines(&self) -> RepoResult<Vec<Baseline>> {
        Ok(self.tables.read().baselines.values().cloned().collect())
    }

    async fn add_task_definition(
        &self,
        baseline_id: i64,
        req: CreateTaskDefinitionRequest,
    ) -> RepoResult<TaskDefinition> {
        let mut t = self.tables.write();
        let id = t.next_id();
        let record = TaskDefinition {
            id,
            baseline_id,
            title: req.title,
            description: req.description,
            category: req.category,
        };
        t.task_definitions.insert(id, record.clone());
        Ok(record)
    }

    async fn list_task_definitions(&self, baseline_id: i64) -> RepoResult<Vec<TaskDefinition>> {
        Ok(self
            .tables
            .read()
            .task_definitions
            .values()
            .filter(|d| d.baseline_id == baseline_id)
            .cloned()
            .collect())
    }

    async fn apply_baseline(&self, project_id: i64, baseline_id: i64) -> RepoResult<u32> {
        let mut t = self.tables.write();
        let pending: Vec<TaskDefinition> = t
            .task_definitions
            .values()
            .filter(|d| d.baseline_id == baseline_id)
            .filter(|d| {
                !t.tasks.values().any(|task| {
                    task.project_id == project_id && task.task_definition_id == Some(d.id)
                })
            })
            .cloned()
            .collect();

        let now = Utc::now();
        let mut created = 0;
        for definition in pending {
            let id = t.next_id();
            t.tasks.insert(
                id,
                Task {
                    id,
                    project_id,
                    task_definition_id: Some(definition.id),
                    title: definition.title,
                    description: definition.description,
                    status: DEFAULT_TASK_STATUS.to_string(),
                    priority: Some(crate::models::DEFAULT_PRIORITY.to_string()),
                    assigned_to_id: None,
                    due_date: None,
                    created_at: now,
                    updated_at: now,
                },
            );
            created += 1;
        }
        Ok(created)
    }
}
