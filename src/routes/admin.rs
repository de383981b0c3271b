use crate::{AppState, handlers};
use axum::{Router, routing::put};

/// Admin Router Module
///
/// Mounted under `/admin` behind the authentication layer. Each handler additionally
/// requires `Role::Admin`, so a consultant with a valid token still gets 403.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // PUT /admin/users/{id}/role
        // Promotes or demotes a user. Effective on that user's next request.
        .route("/users/{id}/role", put(handlers::update_user_role))
}
