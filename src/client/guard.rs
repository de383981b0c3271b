use tokio::sync::watch;

use super::Session;

pub const LOGIN_PATH: &str = "/login";

/// GuardDecision
///
/// What the host should do with a request for a protected view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session still loading: show a neutral placeholder and do not navigate.
    Loading,
    /// Render the protected view.
    Authorized,
    /// Navigate to the login view, remembering where the user was headed.
    Redirect(LoginRedirect),
}

/// LoginRedirect
///
/// A one-shot redirect to the login view. `continue_to` consumes it, so the remembered
/// location is used for a single navigation only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRedirect {
    login_path: String,
    return_to: String,
}

impl LoginRedirect {
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    pub fn return_to(&self) -> &str {
        &self.return_to
    }

    /// Where to go after a successful login. Falls back to `/` for anything that is not
    /// an in-app absolute path, and for the login view itself.
    pub fn continue_to(self) -> String {
        let target = self.return_to;
        let path = target.split(['?', '#']).next().unwrap_or_default();
        // `//host` and `/\host` are both read as protocol-relative by browsers.
        let in_app =
            target.starts_with('/') && !target.starts_with("//") && !target.starts_with("/\\");
        if !in_app || path == self.login_path {
            return "/".to_string();
        }
        target
    }
}

/// RouteGuard
///
/// Stateless: every decision is a function of the session snapshot and the requested
/// location.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    login_path: String,
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::new(LOGIN_PATH)
    }
}

impl RouteGuard {
    pub fn new(login_path: impl Into<String>) -> Self {
        Self {
            login_path: login_path.into(),
        }
    }

    pub fn evaluate(&self, session: &Session, requested: &str) -> GuardDecision {
        if session.is_loading() {
            return GuardDecision::Loading;
        }
        if session.is_authenticated() {
            return GuardDecision::Authorized;
        }
        tracing::debug!(requested, "unauthenticated visit, redirecting to login");
        GuardDecision::Redirect(LoginRedirect {
            login_path: self.login_path.clone(),
            return_to: requested.to_string(),
        })
    }

    /// Waits until the session has finished loading, then decides. If the provider is
    /// gone before that, the last snapshot decides (which may still be `Loading`).
    pub async fn resolve(
        &self,
        sessions: &mut watch::Receiver<Session>,
        requested: &str,
    ) -> GuardDecision {
        let settled = sessions
            .wait_for(|s| !s.is_loading())
            .await
            .map(|session| (*session).clone());
        let session = match settled {
            Ok(session) => session,
            Err(_) => sessions.borrow().clone(),
        };
        self.evaluate(&session, requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, UserProfile};

    fn signed_in() -> Session {
        Session::authenticated(
            "t",
            UserProfile {
                id: 1,
                username: "testuser".into(),
                email: "t@example.com".into(),
                role: Some(Role::ReadOnly),
            },
        )
    }

    #[test]
    fn three_states() {
        let guard = RouteGuard::default();
        assert_eq!(guard.evaluate(&Session::loading(), "/projects"), GuardDecision::Loading);
        assert_eq!(guard.evaluate(&signed_in(), "/projects"), GuardDecision::Authorized);

        let GuardDecision::Redirect(redirect) =
            guard.evaluate(&Session::anonymous(), "/projects/4?tab=tasks")
        else {
            panic!("expected a redirect");
        };
        assert_eq!(redirect.login_path(), "/login");
        assert_eq!(redirect.return_to(), "/projects/4?tab=tasks");
        assert_eq!(redirect.continue_to(), "/projects/4?tab=tasks");
    }

    #[test]
    fn continue_to_never_leaves_the_app_or_loops() {
        let guard = RouteGuard::default();
        let outside = [
            "/login",
            "/login?next=x",
            "https://evil.example",
            "//evil.example",
            "/\\evil.example",
            "",
        ];
        for requested in outside {
            let GuardDecision::Redirect(redirect) = guard.evaluate(&Session::anonymous(), requested)
            else {
                panic!("expected a redirect");
            };
            assert_eq!(redirect.continue_to(), "/", "{requested}");
        }
    }

    #[tokio::test]
    async fn resolve_waits_for_loading_to_finish() {
        let (tx, mut rx) = watch::channel(Session::loading());
        let guard = RouteGuard::default();

        let waiter = tokio::spawn(async move { guard.resolve(&mut rx, "/tasks/2").await });
        tx.send_replace(signed_in());
        assert_eq!(waiter.await.unwrap(), GuardDecision::Authorized);
    }

    #[tokio::test]
    async fn resolve_with_dropped_provider_stays_loading() {
        let (tx, mut rx) = watch::channel(Session::loading());
        drop(tx);
        let decision = RouteGuard::default().resolve(&mut rx, "/").await;
        assert_eq!(decision, GuardDecision::Loading);
    }
}
