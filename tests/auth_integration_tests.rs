mod common;

use axum::{
    extract::FromRequestParts,
    http::{Request, header, request::Parts},
};
use common::{seed_user, spawn_app_with};
use evidence_tracker::{
    ApiError, AppConfig, AppState, MemoryRepository, MemoryStorage,
    auth::{AuthUser, Claims, issue_token},
    config::Env,
    models::{NewUser, Role},
    repository::RepositoryState,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use std::{sync::Arc, time::SystemTime};

// --- Helper Functions ---

const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";

fn config(env: Env) -> AppConfig {
    AppConfig {
        env,
        jwt_secret: TEST_JWT_SECRET.to_string(),
        ..AppConfig::default()
    }
}

fn create_token(user_id: i64, exp_offset: i64) -> String {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;

    let claims = Claims {
        sub: user_id.to_string(),
        iat: now as u64,
        exp: (now + exp_offset).max(0) as u64,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

async fn state_with_user(env: Env, role: Role) -> (AppState, i64) {
    let repo: RepositoryState = Arc::new(MemoryRepository::new());
    let user = repo
        .create_user(NewUser {
            username: "tester".into(),
            email: "tester@example.com".into(),
            password_hash: None,
            role,
        })
        .await
        .unwrap();
    let state = AppState {
        repo,
        storage: Arc::new(MemoryStorage::new()),
        config: config(env),
    };
    (state, user.id)
}

fn parts_with(headers: &[(&str, String)]) -> Parts {
    let mut builder = Request::builder().uri("/api/me");
    for (name, value) in headers {
        builder = builder.header(*name, value);
    }
    builder.body(()).unwrap().into_parts().0
}

// --- Extractor Tests ---

#[tokio::test]
async fn test_valid_token_resolves_user_and_role() {
    let (state, user_id) = state_with_user(Env::Production, Role::Consultant).await;
    let mut parts = parts_with(&[(
        header::AUTHORIZATION.as_str(),
        format!("Bearer {}", create_token(user_id, 3600)),
    )]);

    let user = AuthUser::from_request_parts(&mut parts, &state).await.unwrap();
    assert_eq!(user.id, user_id);
    assert_eq!(user.username, "tester");
    assert_eq!(user.role, Role::Consultant);
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let (state, user_id) = state_with_user(Env::Production, Role::Admin).await;
    let mut parts = parts_with(&[(
        header::AUTHORIZATION.as_str(),
        format!("Bearer {}", create_token(user_id, -3600)),
    )]);

    let result = AuthUser::from_request_parts(&mut parts, &state).await;
    assert!(matches!(result, Err(ApiError::Unauthorized)));
}

#[tokio::test]
async fn test_token_signed_with_another_secret_is_rejected() {
    let (state, user_id) = state_with_user(Env::Production, Role::Admin).await;
    let foreign = AppConfig {
        jwt_secret: "a-different-secret".into(),
        ..AppConfig::default()
    };
    let token = issue_token(&foreign, user_id).unwrap();
    let mut parts = parts_with(&[(header::AUTHORIZATION.as_str(), format!("Bearer {token}"))]);

    let result = AuthUser::from_request_parts(&mut parts, &state).await;
    assert!(matches!(result, Err(ApiError::Unauthorized)));
}

#[tokio::test]
async fn test_token_for_unknown_user_is_rejected() {
    let (state, _) = state_with_user(Env::Production, Role::Admin).await;
    let mut parts = parts_with(&[(
        header::AUTHORIZATION.as_str(),
        format!("Bearer {}", create_token(9_999, 3600)),
    )]);

    let result = AuthUser::from_request_parts(&mut parts, &state).await;
    assert!(matches!(result, Err(ApiError::Unauthorized)));
}

#[tokio::test]
async fn test_missing_or_malformed_header_is_rejected() {
    let (state, user_id) = state_with_user(Env::Production, Role::Admin).await;

    let mut parts = parts_with(&[]);
    assert!(AuthUser::from_request_parts(&mut parts, &state).await.is_err());

    // Wrong scheme.
    let mut parts = parts_with(&[(
        header::AUTHORIZATION.as_str(),
        format!("Token {}", create_token(user_id, 3600)),
    )]);
    assert!(AuthUser::from_request_parts(&mut parts, &state).await.is_err());
}

#[tokio::test]
async fn test_local_bypass_header() {
    let (state, user_id) = state_with_user(Env::Local, Role::ReadOnly).await;
    let mut parts = parts_with(&[("x-user-id", user_id.to_string())]);
    let user = AuthUser::from_request_parts(&mut parts, &state).await.unwrap();
    assert_eq!(user.id, user_id);

    // An unknown id falls through to token authentication.
    let mut parts = parts_with(&[("x-user-id", "424242".to_string())]);
    assert!(AuthUser::from_request_parts(&mut parts, &state).await.is_err());

    // Local without the opt-in: the header alone is not enough.
    let opted_out = AppState {
        config: AppConfig {
            dev_auth_bypass: false,
            ..state.config.clone()
        },
        ..state.clone()
    };
    let mut parts = parts_with(&[("x-user-id", user_id.to_string())]);
    let result = AuthUser::from_request_parts(&mut parts, &opted_out).await;
    assert!(matches!(result, Err(ApiError::Unauthorized)));

    let (state, user_id) = state_with_user(Env::Production, Role::Admin).await;
    let mut parts = parts_with(&[("x-user-id", user_id.to_string())]);
    let result = AuthUser::from_request_parts(&mut parts, &state).await;
    assert!(matches!(result, Err(ApiError::Unauthorized)));
}

// --- Over HTTP ---

#[tokio::test]
async fn test_production_server_ignores_bypass_header() {
    let app = spawn_app_with(config(Env::Production), MemoryStorage::new()).await;
    let admin = seed_user(&app, "admin", Role::Admin).await;
    let client = reqwest::Client::new();

    let response = client
        .get(app.api("/projects"))
        .header("x-user-id", admin.id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let token = issue_token(&app.config, admin.id).unwrap();
    let response = client
        .get(app.api("/projects"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_role_change_applies_to_existing_token() {
    let app = spawn_app_with(config(Env::Production), MemoryStorage::new()).await;
    let user = seed_user(&app, "carol", Role::ReadOnly).await;
    let token = issue_token(&app.config, user.id).unwrap();
    let client = reqwest::Client::new();

    let create = || {
        client
            .post(app.api("/projects"))
            .bearer_auth(&token)
            .json(&serde_json::json!({ "name": "Carol's" }))
            .send()
    };
    assert_eq!(create().await.unwrap().status(), 403);

    app.repo.set_user_role(user.id, Role::Consultant).await.unwrap();
    assert_eq!(create().await.unwrap().status(), 201);
}
