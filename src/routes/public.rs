use crate::{AppState, handlers};
use axum::{Router, routing::post};

/// Public Router Module
///
/// The identity gateway. Nothing here reads or writes engagement data.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // POST /auth/login
        // Exchanges username/password for an access token. Bad credentials are 401.
        .route("/auth/login", post(handlers::login))
        // POST /auth/register
        // Creates a read_only account. Duplicate username or email is 400.
        .route("/auth/register", post(handlers::register_user))
}
