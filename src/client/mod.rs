//! Client layer for the tracker API.
//!
//! Holds everything a front end needs to talk to the server and to decide what to
//! show: a persisted credential store, the session provider that validates it, the
//! role evaluator, the route guard and the render gate. Nothing here draws anything;
//! decisions are returned to the host application.
//!
//! The server stays the authoritative enforcement point. Every decision made here is a
//! display hint computed from the same `policy` rules the handlers enforce.

pub mod api;
pub mod config;
pub mod credentials;
pub mod gate;
pub mod guard;
pub mod request;
pub mod roles;
pub mod session;

pub use api::{ApiClient, AuthBackend, AuthorizedApi, EvidenceUpload};
pub use config::ClientConfig;
pub use credentials::{CredentialError, CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use gate::{EvidenceActions, ProjectActions, ShowForRole, TaskActions};
pub use guard::{GuardDecision, LoginRedirect, RouteGuard};
pub use request::{RequestTicket, RequestTracker};
pub use roles::has_role;
pub use session::{Session, SessionProvider};

/// ClientError
///
/// Failures surfaced to whoever started the operation. Nothing is broadcast.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The request never produced a response (connection refused, timeout, bad body).
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success status with a `{"msg"}` body.
    #[error("{msg}")]
    Api { status: u16, msg: String },

    /// Non-success status without a parseable body.
    #[error("{status} {status_text}")]
    Status { status: u16, status_text: String },

    /// A required field was blank; raised before any request is sent.
    #[error("{field} is required")]
    Validation { field: &'static str },

    #[error("not authenticated")]
    NotAuthenticated,

    #[error(transparent)]
    Credentials(#[from] CredentialError),

    /// A newer login, logout or refresh started while this one was in flight.
    #[error("superseded by a newer session change")]
    Superseded,
}

impl ClientError {
    /// HTTP status for errors that came back from the server.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } | ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the server rejected the token or no longer knows the user.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status(), Some(401 | 403 | 404))
    }
}
