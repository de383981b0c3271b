//! Router assembly, split by who may reach each group of endpoints.
//!
//! Authentication is applied per module as an Axum layer in `create_router`.
//! Authorization (role and ownership) happens inside the handlers through `policy`.

/// Reachable without a token: login and registration.
pub mod public;

/// Every route here sits behind the `AuthUser` middleware layer.
pub mod authenticated;

/// Admin-only routes, nested under `/admin`. The role check runs in the handlers.
pub mod admin;
