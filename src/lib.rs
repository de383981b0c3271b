use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Server side: the authoritative enforcement of every permission.
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod policy;
pub mod repository;
pub mod storage;

// Router segregation (Public, Authenticated, Admin).
pub mod routes;

// Client side: credential persistence, session state, guards and render gates.
pub mod client;

use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::ApiError;
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{MemoryStorage, S3StorageClient, StorageState};

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and schema into the OpenAPI document
/// served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::login, handlers::auth::register_user, handlers::auth::get_me,
        handlers::users::get_users, handlers::users::update_user_role,
        handlers::projects::get_projects, handlers::projects::create_project,
        handlers::projects::get_project, handlers::projects::update_project,
        handlers::projects::delete_project, handlers::projects::get_project_tasks,
        handlers::tasks::create_task, handlers::tasks::get_task, handlers::tasks::update_task,
        handlers::evidence::get_task_evidence, handlers::evidence::add_evidence,
        handlers::evidence::get_evidence, handlers::evidence::update_evidence,
        handlers::evidence::delete_evidence, handlers::evidence::download_evidence,
        handlers::baselines::get_baselines, handlers::baselines::create_baseline,
        handlers::baselines::get_task_definitions, handlers::baselines::add_task_definition,
        handlers::baselines::apply_baseline
    ),
    components(
        schemas(
            models::Role, models::UserProfile, models::UserSummary, models::LoginRequest,
            models::LoginResponse, models::RegisterUserRequest, models::RegisteredUser,
            models::RegisterResponse, models::UpdateRoleRequest, models::MessageResponse,
            models::Project, models::CreateProjectRequest, models::UpdateProjectRequest,
            models::Task, models::CreateTaskRequest, models::UpdateTaskRequest,
            models::Evidence, models::UpdateEvidenceRequest, models::EvidenceUploadForm,
            models::Baseline, models::CreateBaselineRequest, models::TaskDefinition,
            models::CreateTaskDefinitionRequest, models::ApplyBaselineResponse,
        )
    ),
    tags(
        (name = "evidence-tracker", description = "Security engagement tracking API")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// The single shared container of services and configuration, cloned into every
/// request. Handlers pull the parts they need through `FromRef`.
#[derive(Clone)]
pub struct AppState {
    pub repo: RepositoryState,
    pub storage: StorageState,
    pub config: AppConfig,
}

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Rejects the request with 401 before any handler runs unless `AuthUser` resolves.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the whole HTTP surface: the API under `/api`, `/health` for liveness checks, the
/// Swagger UI, and the request-id, tracing and CORS layers around all of it.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name for request correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. API Router Assembly (everything under `/api`)
    let api = Router::new()
        // Public routes: register and login, no middleware applied.
        .merge(public::public_routes())
        // Authenticated routes: `auth_middleware` resolves the caller first. Ownership,
        // assignment and role checks happen inside the handlers.
        .merge(
            authenticated::authenticated_routes(state.config.max_upload_bytes).route_layer(
                middleware::from_fn_with_state(state.clone(), auth_middleware),
            ),
        )
        // Admin routes: nested under `/admin`, authenticated the same way. The admin role
        // itself is checked by the handlers.
        .nest(
            "/admin",
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        );

    // 3. Base Router: API docs, liveness and the API, sharing one state.
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(|| async { "ok" }))
        .nest("/api", api)
        .with_state(state);

    // 4. Observability and Correlation Layers (outermost, so they see every request)
    base_router
        .layer(
            ServiceBuilder::new()
                // 4a. Request ID generation: a fresh UUID per incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 4b. Request tracing: one span per request, carrying the request id
                // through `trace_span_logger`, with latency logged on response.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 4c. Request ID propagation: echoes x-request-id back to the caller.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 5. CORS Layer (applied last)
        .layer(cors)
}

/// Puts the request id next to method and URI on every log line of the request.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
