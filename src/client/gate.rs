//! Render gates: whether a fragment or an action should be offered at all.
//!
//! These never grant anything. A hidden button is a convenience; the server still
//! rejects the request if the caller is not allowed.

use super::{Session, has_role};
use crate::{
    models::{Evidence, Project, Role, Task},
    policy::{self, TaskEditScope},
};

/// ShowForRole
///
/// Renders its fragment only for sessions holding one of `roles`.
#[derive(Debug, Clone, Copy)]
pub struct ShowForRole<'a> {
    roles: &'a [Role],
}

impl<'a> ShowForRole<'a> {
    pub fn new(roles: &'a [Role]) -> Self {
        Self { roles }
    }

    pub fn visible(&self, session: &Session) -> bool {
        has_role(session, self.roles)
    }

    /// Builds the fragment only when visible; otherwise renders nothing.
    pub fn render<T>(&self, session: &Session, fragment: impl FnOnce() -> T) -> Option<T> {
        self.visible(session).then(fragment)
    }
}

/// Actions offered on a project page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProjectActions {
    pub create_task: bool,
    pub edit_project: bool,
    pub delete_project: bool,
    pub apply_baseline: bool,
}

impl ProjectActions {
    /// Consultants get these only on projects they own; admins everywhere.
    pub fn for_project(session: &Session, project: &Project) -> Self {
        let Some(actor) = session.actor() else {
            return Self::default();
        };
        let manage = policy::can_manage_project(&actor, project);
        Self {
            create_task: manage,
            edit_project: manage,
            delete_project: manage,
            apply_baseline: manage,
        }
    }
}

/// Actions offered on a task page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskActions {
    pub edit_all_fields: bool,
    pub edit_status: bool,
    pub upload_evidence: bool,
}

impl TaskActions {
    pub fn for_task(session: &Session, project: &Project, task: &Task) -> Self {
        let Some(actor) = session.actor() else {
            return Self::default();
        };
        let scope = policy::task_edit_scope(&actor, project, task);
        Self {
            edit_all_fields: scope == TaskEditScope::Full,
            edit_status: scope != TaskEditScope::None,
            upload_evidence: policy::can_add_evidence(&actor, project, task),
        }
    }
}

/// Actions offered on one evidence row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EvidenceActions {
    /// The verified toggle and notes editing.
    pub verify: bool,
    pub delete: bool,
}

impl EvidenceActions {
    pub fn for_evidence(session: &Session, project: &Project, evidence: &Evidence) -> Self {
        let Some(actor) = session.actor() else {
            return Self::default();
        };
        Self {
            verify: policy::can_update_evidence(&actor, project),
            delete: policy::can_delete_evidence(&actor, project, evidence),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserProfile;

    fn session(id: i64, role: Role) -> Session {
        Session::authenticated(
            "t",
            UserProfile {
                id,
                username: format!("user{id}"),
                email: format!("user{id}@example.com"),
                role: Some(role),
            },
        )
    }

    fn project(owner_id: i64) -> Project {
        Project {
            id: 3,
            name: "Acme external".into(),
            owner_id,
            ..Default::default()
        }
    }

    #[test]
    fn create_task_follows_ownership() {
        let consultant = session(5, Role::Consultant);
        assert!(!ProjectActions::for_project(&consultant, &project(99)).create_task);
        assert!(ProjectActions::for_project(&consultant, &project(5)).create_task);
        assert!(ProjectActions::for_project(&session(1, Role::Admin), &project(99)).create_task);
        assert_eq!(
            ProjectActions::for_project(&session(5, Role::ReadOnly), &project(5)),
            ProjectActions::default()
        );
    }

    #[test]
    fn anonymous_sessions_get_no_actions() {
        assert_eq!(
            ProjectActions::for_project(&Session::anonymous(), &project(1)),
            ProjectActions::default()
        );
        assert_eq!(
            ProjectActions::for_project(&Session::loading(), &project(1)),
            ProjectActions::default()
        );
    }

    #[test]
    fn show_for_role_renders_only_when_allowed() {
        let gate = ShowForRole::new(policy::CREATOR_ROLES);
        assert_eq!(
            gate.render(&session(1, Role::Consultant), || "Create Project"),
            Some("Create Project")
        );
        assert_eq!(gate.render(&session(1, Role::ReadOnly), || "Create Project"), None);

        let mut built = false;
        let _ = ShowForRole::new(&[]).render(&session(1, Role::Admin), || built = true);
        assert!(!built);
    }
}
