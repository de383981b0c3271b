use evidence_tracker::{
    AppState,
    auth::bootstrap_admin,
    config::{AppConfig, Env, StorageBackend},
    create_router,
    repository::{MemoryRepository, PostgresRepository, RepositoryState},
    storage::{MemoryStorage, S3StorageClient, StorageService, StorageState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, installs logging, wires the repository and storage backends
/// into `AppState`, and serves the router until the process is stopped.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "evidence_tracker=debug,tower_http=info,axum=trace".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);
    if config.dev_auth_bypass {
        tracing::warn!("AUTH_DEV_BYPASS is on: x-user-id is accepted without a token");
    }

    // Repository: Postgres when DATABASE_URL is set, otherwise an in-memory store (local only).
    let repo: RepositoryState = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
            let repo = PostgresRepository::new(pool);
            repo.migrate().await?;
            tracing::info!("connected to Postgres, migrations applied");
            Arc::new(repo)
        }
        None => {
            tracing::warn!(
                "DATABASE_URL not set, using the in-memory repository; data is lost on exit"
            );
            Arc::new(MemoryRepository::new())
        }
    };

    let storage: StorageState = match config.storage {
        StorageBackend::S3 => {
            let s3_client = S3StorageClient::new(
                &config.s3_endpoint,
                &config.s3_region,
                &config.s3_key,
                &config.s3_secret,
                &config.s3_bucket,
            )
            .await;
            // MinIO convenience: create the bucket on first run.
            if config.env == Env::Local {
                s3_client.ensure_bucket_exists().await;
            }
            Arc::new(s3_client)
        }
        StorageBackend::Memory => {
            tracing::warn!("using in-memory evidence storage; uploaded files are lost on exit");
            Arc::new(MemoryStorage::new())
        }
    };

    if let Some(admin) = &config.admin_bootstrap {
        bootstrap_admin(&repo, admin)
            .await
            .map_err(|e| format!("admin bootstrap failed: {e}"))?;
    }

    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState {
        repo,
        storage,
        config,
    });

    let listener = TcpListener::bind(&bind_addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!("Listening on {local_addr}");
    tracing::info!("API Documentation (Swagger UI) available at: http://{local_addr}/swagger-ui");

    axum::serve(listener, app).await?;
    Ok(())
}
