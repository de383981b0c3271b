use super::Session;
use crate::models::{Role, UnknownRole};

/// has_role
///
/// Whether the session's user holds one of `required`. False while loading, without an
/// authenticated user, for a user without a role, and for an empty `required` set.
pub fn has_role(session: &Session, required: &[Role]) -> bool {
    if session.is_loading() || !session.is_authenticated() {
        return false;
    }
    let Some(role) = session.role() else {
        return false;
    };
    if required.is_empty() {
        tracing::warn!("has_role called with an empty role set; denying by default");
        return false;
    }
    required.contains(&role)
}

/// Parses role names from configuration or markup. Any unknown name is an error.
pub fn parse_roles<S: AsRef<str>>(names: &[S]) -> Result<Vec<Role>, UnknownRole> {
    names.iter().map(|name| name.as_ref().parse()).collect()
}
