use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::models::UserProfile;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("credential store I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode credentials: {0}")]
    Encode(#[from] serde_json::Error),
}

/// CredentialStore
///
/// Persists the session token and the cached user profile. Each call reads or writes
/// the whole record at once; `clear` removes both together.
pub trait CredentialStore: Send + Sync {
    fn load_token(&self) -> Result<Option<String>, CredentialError>;

    /// The cached profile. An entry that no longer parses is removed and reported as absent.
    fn load_user(&self) -> Result<Option<UserProfile>, CredentialError>;

    fn save_token(&self, token: &str) -> Result<(), CredentialError>;

    fn save_user(&self, user: &UserProfile) -> Result<(), CredentialError>;

    fn clear(&self) -> Result<(), CredentialError>;
}

/// On-disk layout. The user entry is kept as raw JSON so a corrupt profile does not
/// take the token down with it.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<serde_json::Value>,
}

/// FileCredentialStore
///
/// A JSON file readable only by its owner (0600 on unix). Writes go to a sibling temp
/// file which is then renamed over the target, so readers never see a half-written file.
pub struct FileCredentialStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: io::Error) -> CredentialError {
        CredentialError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn read(&self) -> Result<StoredCredentials, CredentialError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(StoredCredentials::default());
            }
            Err(e) => return Err(self.io_err(e)),
        };
        if raw.trim().is_empty() {
            return Ok(StoredCredentials::default());
        }
        match serde_json::from_str(&raw) {
            Ok(stored) => Ok(stored),
            Err(error) => {
                tracing::warn!(
                    path = %self.path.display(),
                    %error,
                    "credentials file is corrupt, ignoring it"
                );
                Ok(StoredCredentials::default())
            }
        }
    }

    fn write(&self, stored: &StoredCredentials) -> Result<(), CredentialError> {
        if stored.token.is_none() && stored.user.is_none() {
            return self.remove();
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(e) = fs::set_permissions(parent, fs::Permissions::from_mode(0o700)) {
                    tracing::warn!("failed to chmod 0700 {}: {e}", parent.display());
                }
            }
        }

        let body = serde_json::to_vec_pretty(stored)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, body).map_err(|e| self.io_err(e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))
                .map_err(|e| self.io_err(e))?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))
    }

    fn remove(&self) -> Result<(), CredentialError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_err(e)),
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn load_token(&self) -> Result<Option<String>, CredentialError> {
        let _guard = self.lock.lock();
        Ok(self.read()?.token.filter(|t| !t.is_empty()))
    }

    fn load_user(&self) -> Result<Option<UserProfile>, CredentialError> {
        let _guard = self.lock.lock();
        let mut stored = self.read()?;
        let Some(raw) = stored.user.take() else {
            return Ok(None);
        };
        match serde_json::from_value(raw) {
            Ok(user) => Ok(Some(user)),
            Err(error) => {
                tracing::warn!(%error, "stored user profile is corrupt, removing it");
                self.write(&stored)?;
                Ok(None)
            }
        }
    }

    fn save_token(&self, token: &str) -> Result<(), CredentialError> {
        let _guard = self.lock.lock();
        let mut stored = self.read()?;
        stored.token = Some(token.to_string());
        self.write(&stored)
    }

    fn save_user(&self, user: &UserProfile) -> Result<(), CredentialError> {
        let _guard = self.lock.lock();
        let mut stored = self.read()?;
        stored.user = Some(serde_json::to_value(user)?);
        self.write(&stored)
    }

    fn clear(&self) -> Result<(), CredentialError> {
        let _guard = self.lock.lock();
        self.remove()
    }
}

/// MemoryCredentialStore
///
/// Process-local store for tests and for hosts that must not touch the disk.
#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<(Option<String>, Option<UserProfile>)>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds a token, as if left over from an earlier run.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new((Some(token.into()), None)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load_token(&self) -> Result<Option<String>, CredentialError> {
        Ok(self.inner.lock().0.clone())
    }

    fn load_user(&self) -> Result<Option<UserProfile>, CredentialError> {
        Ok(self.inner.lock().1.clone())
    }

    fn save_token(&self, token: &str) -> Result<(), CredentialError> {
        self.inner.lock().0 = Some(token.to_string());
        Ok(())
    }

    fn save_user(&self, user: &UserProfile) -> Result<(), CredentialError> {
        self.inner.lock().1 = Some(user.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialError> {
        *self.inner.lock() = (None, None);
        Ok(())
    }
}
