use std::env;

/// AppConfig
///
/// Holds the server's entire configuration. Immutable once loaded and pulled into
/// handlers through `FromRef`, so every request sees the same settings.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls the dev bypass and fail-fast rules.
    pub env: Env,
    // Postgres connection string. `None` selects the in-memory repository (local only).
    pub database_url: Option<String>,
    // HMAC secret used to sign and validate access tokens.
    pub jwt_secret: String,
    // Lifetime of an issued access token.
    pub jwt_ttl_seconds: u64,
    pub bind_addr: String,
    pub storage: StorageBackend,
    // S3-compatible storage endpoint URL (MinIO locally).
    pub s3_endpoint: String,
    pub s3_region: String,
    pub s3_key: String,
    pub s3_secret: String,
    // Bucket holding every evidence file.
    pub s3_bucket: String,
    // Upper bound for a single evidence upload body.
    pub max_upload_bytes: usize,
    // Seeds the first administrator at startup when set.
    pub admin_bootstrap: Option<AdminBootstrap>,
    // Accept the `x-user-id` header in place of a token. Opt-in, local only.
    pub dev_auth_bypass: bool,
}

/// Env
///
/// Runtime context. `Local` enables development conveniences (in-memory repository,
/// `x-user-id` bypass, MinIO defaults); `Production` demands explicit secrets.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

#[derive(Clone, PartialEq, Debug)]
pub enum StorageBackend {
    S3,
    Memory,
}

#[derive(Clone, Debug)]
pub struct AdminBootstrap {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set in production")]
    MissingInProduction(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

const LOCAL_JWT_SECRET: &str = "local-development-jwt-secret-change-me";
const DEFAULT_TTL_SECONDS: u64 = 3600;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

impl Default for AppConfig {
    /// Local values for test state scaffolding, `x-user-id` bypass included; nothing is
    /// read from the environment.
    fn default() -> Self {
        Self {
            env: Env::Local,
            database_url: None,
            jwt_secret: LOCAL_JWT_SECRET.to_string(),
            jwt_ttl_seconds: DEFAULT_TTL_SECONDS,
            bind_addr: "127.0.0.1:0".to_string(),
            storage: StorageBackend::Memory,
            s3_endpoint: "http://localhost:9000".to_string(),
            s3_region: "us-east-1".to_string(),
            s3_key: "admin".to_string(),
            s3_secret: "password".to_string(),
            s3_bucket: "evidence-test".to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            admin_bootstrap: None,
            dev_auth_bypass: true,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from environment variables. In production every secret
    /// must be present; a missing one is an error so the server never starts half-configured.
    pub fn load() -> Result<Self, ConfigError> {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let jwt_secret = match (&env, var("JWT_SECRET")) {
            (_, Some(secret)) => secret,
            (Env::Local, None) => LOCAL_JWT_SECRET.to_string(),
            (Env::Production, None) => return Err(ConfigError::MissingInProduction("JWT_SECRET")),
        };

        let database_url = var("DATABASE_URL");
        if env == Env::Production && database_url.is_none() {
            return Err(ConfigError::MissingInProduction("DATABASE_URL"));
        }

        let storage = match var("STORAGE_BACKEND").as_deref() {
            None | Some("s3") => StorageBackend::S3,
            Some("memory") if env == Env::Local => StorageBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "STORAGE_BACKEND",
                    value: other.to_string(),
                });
            }
        };

        let (s3_endpoint, s3_region, s3_key, s3_secret) = match env {
            // Local storage (MinIO) uses known default credentials.
            Env::Local => (
                var("S3_ENDPOINT").unwrap_or_else(|| "http://localhost:9000".to_string()),
                var("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                var("S3_ACCESS_KEY").unwrap_or_else(|| "admin".to_string()),
                var("S3_SECRET_KEY").unwrap_or_else(|| "password".to_string()),
            ),
            Env::Production => (
                var("S3_ENDPOINT").ok_or(ConfigError::MissingInProduction("S3_ENDPOINT"))?,
                var("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                var("S3_ACCESS_KEY").ok_or(ConfigError::MissingInProduction("S3_ACCESS_KEY"))?,
                var("S3_SECRET_KEY").ok_or(ConfigError::MissingInProduction("S3_SECRET_KEY"))?,
            ),
        };

        let dev_auth_bypass = match var("AUTH_DEV_BYPASS").as_deref() {
            None | Some("0") | Some("false") => false,
            Some("1") | Some("true") if env == Env::Local => true,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "AUTH_DEV_BYPASS",
                    value: other.to_string(),
                });
            }
        };

        let admin_bootstrap = match (
            var("ADMIN_BOOTSTRAP_USERNAME"),
            var("ADMIN_BOOTSTRAP_PASSWORD"),
        ) {
            (Some(username), Some(password)) => Some(AdminBootstrap {
                email: var("ADMIN_BOOTSTRAP_EMAIL")
                    .unwrap_or_else(|| format!("{username}@localhost")),
                username,
                password,
            }),
            _ => None,
        };

        Ok(Self {
            env,
            database_url,
            jwt_secret,
            jwt_ttl_seconds: parse_var("JWT_TTL_SECONDS", DEFAULT_TTL_SECONDS)?,
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            storage,
            s3_endpoint,
            s3_region,
            s3_key,
            s3_secret,
            s3_bucket: var("S3_BUCKET_NAME").unwrap_or_else(|| "evidence".to_string()),
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            admin_bootstrap,
            dev_auth_bypass,
        })
    }
}

/// Reads a variable, treating empty values as unset.
fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match var(name) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}
