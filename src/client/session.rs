use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

use super::{AuthBackend, ClientError, CredentialStore};
use crate::{
    models::{Role, UserProfile},
    policy::Actor,
};

/// Session
///
/// A snapshot of the client's authentication state. `is_authenticated` is derived, so
/// it holds exactly when loading is over and both a token and a profile are present.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Session {
    token: Option<String>,
    user: Option<UserProfile>,
    is_loading: bool,
}

impl Session {
    /// Startup state: credentials are being validated.
    pub fn loading() -> Self {
        Self {
            is_loading: true,
            ..Self::default()
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(token: impl Into<String>, user: UserProfile) -> Self {
        Self {
            token: Some(token.into()),
            user: Some(user),
            is_loading: false,
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn is_authenticated(&self) -> bool {
        !self.is_loading && self.token.is_some() && self.user.is_some()
    }

    pub fn role(&self) -> Option<Role> {
        self.user.as_ref().and_then(|u| u.role)
    }

    /// The identity to evaluate policy against, if there is a usable one.
    pub fn actor(&self) -> Option<Actor> {
        if !self.is_authenticated() {
            return None;
        }
        self.user.as_ref().and_then(Actor::from_profile)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("user", &self.user)
            .field("is_loading", &self.is_loading)
            .finish()
    }
}

/// SessionProvider
///
/// Owns the session for one client. Built explicitly and shared by `Arc`; there is no
/// global instance. Every state change is published on a watch channel.
///
/// Login, initialize, refresh and logout each start a new generation. Results are
/// committed only if their generation is still current, so a logout issued while a login
/// is in flight always wins.
pub struct SessionProvider {
    backend: Arc<dyn AuthBackend>,
    store: Arc<dyn CredentialStore>,
    state: watch::Sender<Session>,
    // Current generation. Commits hold this lock so store writes and publication are
    // never interleaved with a newer operation's.
    generation: Mutex<u64>,
}

impl SessionProvider {
    pub fn new(backend: Arc<dyn AuthBackend>, store: Arc<dyn CredentialStore>) -> Self {
        let (state, _) = watch::channel(Session::loading());
        Self {
            backend,
            store,
            state,
            generation: Mutex::new(0),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    pub fn session(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.state.borrow().token.clone()
    }

    fn next_generation(&self) -> u64 {
        let mut current = self.generation.lock();
        *current += 1;
        *current
    }

    /// Runs `apply` only if `generation` is still the latest one.
    fn commit<T>(
        &self,
        generation: u64,
        apply: impl FnOnce() -> Result<T, ClientError>,
    ) -> Result<T, ClientError> {
        let current = self.generation.lock();
        if *current != generation {
            tracing::debug!(generation, current = *current, "dropping superseded session result");
            return Err(ClientError::Superseded);
        }
        apply()
    }

    fn clear_store(&self) {
        if let Err(error) = self.store.clear() {
            tracing::warn!(%error, "failed to clear stored credentials");
        }
    }

    /// initialize
    ///
    /// Validates stored credentials once at startup. Without a stored token no request is
    /// made. With one, the profile is fetched: success authenticates, any failure clears
    /// the store. Loading is over either way.
    pub async fn initialize(&self) -> Session {
        let generation = self.next_generation();

        let token = self.store.load_token().unwrap_or_else(|error| {
            tracing::warn!(%error, "could not read stored token");
            None
        });
        let Some(token) = token else {
            let _ = self.commit(generation, || {
                self.state.send_replace(Session::anonymous());
                Ok(())
            });
            return self.session();
        };

        // Show the cached profile while it is being re-validated.
        let cached = self.store.load_user().unwrap_or_else(|error| {
            tracing::warn!(%error, "could not read stored profile");
            None
        });
        let _ = self.commit(generation, || {
            self.state.send_replace(Session {
                token: Some(token.clone()),
                user: cached,
                is_loading: true,
            });
            Ok(())
        });

        let fetched = self.backend.fetch_profile(&token).await;
        let _ = self.commit(generation, || {
            match fetched {
                Ok(profile) => {
                    if let Err(error) = self.store.save_user(&profile) {
                        tracing::warn!(%error, "failed to cache refreshed profile");
                    }
                    tracing::info!(user_id = profile.id, "stored session restored");
                    self.state.send_replace(Session::authenticated(token, profile));
                }
                Err(error) => {
                    tracing::warn!(%error, "stored token rejected, clearing credentials");
                    self.clear_store();
                    self.state.send_replace(Session::anonymous());
                }
            }
            Ok(())
        });
        self.session()
    }

    /// login
    ///
    /// Exchanges credentials for a token, stores it, fetches and stores the profile, then
    /// publishes the authenticated session. On failure nothing partial is left behind and
    /// the error goes back to the caller.
    pub async fn login(&self, username: &str, password: &str) -> Result<UserProfile, ClientError> {
        let generation = self.next_generation();
        match self.try_login(generation, username, password).await {
            Ok(profile) => Ok(profile),
            Err(ClientError::Superseded) => Err(ClientError::Superseded),
            Err(error) => {
                let _ = self.commit(generation, || {
                    self.clear_store();
                    self.state.send_replace(Session::anonymous());
                    Ok(())
                });
                tracing::warn!(%error, "login failed");
                Err(error)
            }
        }
    }

    async fn try_login(
        &self,
        generation: u64,
        username: &str,
        password: &str,
    ) -> Result<UserProfile, ClientError> {
        let token = self.backend.login(username, password).await?;
        self.commit(generation, || Ok(self.store.save_token(&token)?))?;

        let profile = self.backend.fetch_profile(&token).await?;
        self.commit(generation, || {
            self.store.save_user(&profile)?;
            tracing::info!(user_id = profile.id, "logged in");
            self.state
                .send_replace(Session::authenticated(token, profile.clone()));
            Ok(profile)
        })
    }

    /// logout
    ///
    /// Clears the stored token and profile and resets the session. Purely local: the
    /// token itself stays valid on the server until it expires.
    pub fn logout(&self) -> Result<(), ClientError> {
        let mut current = self.generation.lock();
        *current += 1;
        let cleared = self.store.clear();
        self.state.send_replace(Session::anonymous());
        drop(current);
        tracing::info!("logged out");
        Ok(cleared?)
    }

    /// refresh_profile
    ///
    /// Re-fetches the profile for the current token. A 401/403/404 means the token or the
    /// account is gone and forces a logout; transport failures leave the session as is.
    pub async fn refresh_profile(&self) -> Result<UserProfile, ClientError> {
        let Some(token) = self.token() else {
            return Err(ClientError::NotAuthenticated);
        };
        let generation = self.next_generation();

        match self.backend.fetch_profile(&token).await {
            Ok(profile) => self.commit(generation, || {
                self.store.save_user(&profile)?;
                self.state
                    .send_replace(Session::authenticated(token, profile.clone()));
                Ok(profile)
            }),
            Err(error) if error.is_auth_failure() => {
                let _ = self.commit(generation, || {
                    tracing::warn!(%error, "profile refresh rejected, logging out");
                    self.clear_store();
                    self.state.send_replace(Session::anonymous());
                    Ok(())
                });
                Err(error)
            }
            Err(error) => Err(error),
        }
    }
}
