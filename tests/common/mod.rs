#![allow(dead_code)]

use evidence_tracker::{
    AppConfig, AppState, MemoryRepository, MemoryStorage, create_router,
    auth::hash_password,
    models::{NewUser, Role, User},
    repository::RepositoryState,
    storage::StorageState,
};
use std::sync::Arc;
use tokio::net::TcpListener;

pub const PASSWORD: &str = "password";

pub struct TestApp {
    /// Server root, e.g. `http://127.0.0.1:41234`.
    pub address: String,
    pub repo: RepositoryState,
    pub storage: MemoryStorage,
    pub config: AppConfig,
}

impl TestApp {
    pub fn api(&self, path: &str) -> String {
        format!("{}/api{}", self.address, path)
    }

    pub fn api_base(&self) -> String {
        format!("{}/api", self.address)
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(AppConfig::default(), MemoryStorage::new()).await
}

pub async fn spawn_app_with(config: AppConfig, storage: MemoryStorage) -> TestApp {
    let repo: RepositoryState = Arc::new(MemoryRepository::new());
    let state = AppState {
        repo: repo.clone(),
        storage: Arc::new(storage.clone()) as StorageState,
        config: config.clone(),
    };
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        address,
        repo,
        storage,
        config,
    }
}

/// Seeds a user without a password; reach it through the local `x-user-id` header.
pub async fn seed_user(app: &TestApp, username: &str, role: Role) -> User {
    app.repo
        .create_user(NewUser {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password_hash: None,
            role,
        })
        .await
        .unwrap()
}

/// Seeds a user who can log in with `PASSWORD`.
pub async fn seed_login_user(app: &TestApp, username: &str, role: Role) -> User {
    app.repo
        .create_user(NewUser {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password_hash: Some(hash_password(PASSWORD).unwrap()),
            role,
        })
        .await
        .unwrap()
}
