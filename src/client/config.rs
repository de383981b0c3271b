use std::env;
use std::path::PathBuf;

pub const DEFAULT_API_URL: &str = "http://localhost:3000/api";

/// ClientConfig
///
/// Where the API lives and where credentials are persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    /// Base URL including the `/api` prefix, without a trailing slash.
    pub api_url: String,
    pub credentials_path: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            credentials_path: default_credentials_path(),
        }
    }
}

impl ClientConfig {
    /// Reads `TRACKER_API_URL` and `TRACKER_CREDENTIALS_PATH`, falling back to defaults.
    pub fn from_env() -> Self {
        let api_url = env::var("TRACKER_API_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let credentials_path = env::var_os("TRACKER_CREDENTIALS_PATH")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_credentials_path);
        Self {
            api_url,
            credentials_path,
        }
    }
}

fn default_credentials_path() -> PathBuf {
    let base = env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    base.join(".evidence-tracker").join("credentials.json")
}
