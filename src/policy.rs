//! Ownership and role rules for projects, tasks and evidence.
//!
//! These are pure functions over already-loaded records. The server calls them before
//! every read or write (the authoritative check); the client calls the same functions
//! to decide which actions to offer, which never grants anything by itself.

use crate::models::{Evidence, Project, Role, Task, UserProfile};

/// Actor
///
/// The identity a decision is made for: who is asking, and with which role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub role: Role,
}

impl Actor {
    pub fn new(id: i64, role: Role) -> Self {
        Self { id, role }
    }

    /// A profile without a role yields no actor, and therefore no permissions.
    pub fn from_profile(profile: &UserProfile) -> Option<Self> {
        profile.role.map(|role| Self::new(profile.id, role))
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    fn owns(&self, project: &Project) -> bool {
        project.owner_id == self.id
    }
}

/// Roles allowed to create projects and baselines.
pub const CREATOR_ROLES: &[Role] = &[Role::Admin, Role::Consultant];

/// Admins and read-only auditors see every project; consultants see their own.
pub fn can_list_all_projects(actor: &Actor) -> bool {
    matches!(actor.role, Role::Admin | Role::ReadOnly)
}

pub fn can_create_project(actor: &Actor) -> bool {
    CREATOR_ROLES.contains(&actor.role)
}

/// Write access to a project and everything under it: admins always, consultants only
/// on projects they own. Read-only users never, even on a project they once owned.
pub fn can_manage_project(actor: &Actor, project: &Project) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Consultant => actor.owns(project),
        Role::ReadOnly => false,
    }
}

/// `assigned_in_project` is whether the actor is assignee of any task in the project.
pub fn can_view_project(actor: &Actor, project: &Project, assigned_in_project: bool) -> bool {
    can_list_all_projects(actor) || actor.owns(project) || assigned_in_project
}

pub fn can_view_task(actor: &Actor, project: &Project, task: &Task) -> bool {
    can_list_all_projects(actor) || actor.owns(project) || is_assignee(actor, task)
}

/// Evidence may be attached by whoever works the task, never by read-only users.
pub fn can_add_evidence(actor: &Actor, project: &Project, task: &Task) -> bool {
    actor.role != Role::ReadOnly
        && (can_manage_project(actor, project) || is_assignee(actor, task))
}

pub fn can_view_evidence(
    actor: &Actor,
    project: &Project,
    task: &Task,
    evidence: &Evidence,
) -> bool {
    can_view_task(actor, project, task) || evidence.uploaded_by_id == actor.id
}

/// Verification is a reviewer action: project managers only.
pub fn can_update_evidence(actor: &Actor, project: &Project) -> bool {
    can_manage_project(actor, project)
}

pub fn can_delete_evidence(actor: &Actor, project: &Project, evidence: &Evidence) -> bool {
    can_manage_project(actor, project)
        || (actor.role != Role::ReadOnly && evidence.uploaded_by_id == actor.id)
}

/// TaskEditScope
///
/// What a given actor may change on a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEditScope {
    /// Every field, including title, assignee and due date.
    Full,
    /// Only `status` and `description`.
    StatusAndDescription,
    None,
}

pub fn task_edit_scope(actor: &Actor, project: &Project, task: &Task) -> TaskEditScope {
    if can_manage_project(actor, project) {
        TaskEditScope::Full
    } else if actor.role != Role::ReadOnly && is_assignee(actor, task) {
        TaskEditScope::StatusAndDescription
    } else {
        TaskEditScope::None
    }
}

fn is_assignee(actor: &Actor, task: &Task) -> bool {
    task.assigned_to_id == Some(actor.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn project(owner_id: i64) -> Project {
        Project {
            id: 1,
            name: "Engagement".into(),
            owner_id,
            ..Default::default()
        }
    }

    fn task(assigned_to_id: Option<i64>) -> Task {
        Task {
            id: 10,
            project_id: 1,
            task_definition_id: None,
            title: "Recon".into(),
            description: None,
            status: "pending".into(),
            priority: None,
            assigned_to_id,
            due_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn evidence(uploaded_by_id: i64) -> Evidence {
        Evidence {
            id: 100,
            project_task_id: 10,
            uploaded_by_id,
            file_name: "scan.xml".into(),
            storage_key: "k".into(),
            tool_type: None,
            notes: None,
            mime_type: None,
            verified: false,
            upload_date: Utc::now(),
        }
    }

    #[test]
    fn consultants_manage_only_their_own_projects() {
        let owner = Actor::new(1, Role::Consultant);
        let other = Actor::new(2, Role::Consultant);
        let admin = Actor::new(3, Role::Admin);
        let p = project(1);

        assert!(can_manage_project(&owner, &p));
        assert!(!can_manage_project(&other, &p));
        assert!(can_manage_project(&admin, &p));
    }

    #[test]
    fn demoted_owner_loses_write_access_but_keeps_read() {
        let demoted = Actor::new(1, Role::ReadOnly);
        let p = project(1);
        assert!(!can_manage_project(&demoted, &p));
        assert!(can_view_project(&demoted, &p, false));
        assert!(!can_add_evidence(&demoted, &p, &task(Some(1))));
    }

    #[test]
    fn assignee_gets_partial_task_scope_and_may_add_evidence() {
        let assignee = Actor::new(5, Role::Consultant);
        let p = project(1);
        let t = task(Some(5));

        assert_eq!(task_edit_scope(&assignee, &p, &t), TaskEditScope::StatusAndDescription);
        assert!(can_view_task(&assignee, &p, &t));
        assert!(can_add_evidence(&assignee, &p, &t));
        assert!(!can_update_evidence(&assignee, &p));
        assert!(!can_view_project(&assignee, &p, false));
        assert!(can_view_project(&assignee, &p, true));
    }

    #[test]
    fn uploader_can_see_and_delete_own_evidence() {
        let uploader = Actor::new(9, Role::Consultant);
        let p = project(1);
        let t = task(None);
        let e = evidence(9);

        assert!(!can_view_task(&uploader, &p, &t));
        assert!(can_view_evidence(&uploader, &p, &t, &e));
        assert!(can_delete_evidence(&uploader, &p, &e));
        assert!(!can_delete_evidence(&uploader, &p, &evidence(1)));
    }

    #[test]
    fn profile_without_role_has_no_actor() {
        let profile = UserProfile { id: 1, username: "x".into(), email: "x@y".into(), role: None };
        assert_eq!(Actor::from_profile(&profile), None);
    }
}
