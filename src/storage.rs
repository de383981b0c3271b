use async_trait::async_trait;
use aws_sdk_s3 as s3;
use parking_lot::RwLock;
use s3::primitives::ByteStream;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Backend(String),
}

// 1. StorageService Contract
/// StorageService
///
/// Abstract contract for the object storage holding evidence files. Handlers only see
/// this trait, so the S3 client and the in-memory store are interchangeable.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Ensures the configured bucket exists. Used in `Env::Local` to provision MinIO.
    async fn ensure_bucket_exists(&self);

    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), StorageError>;

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    async fn delete_object(&self, key: &str) -> Result<(), StorageError>;
}

// 2. The Real Implementation (S3/MinIO)
/// S3StorageClient
///
/// Concrete implementation on the AWS SDK. `force_path_style(true)` keeps it compatible
/// with MinIO and other S3-compatible gateways.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
}

impl S3StorageClient {
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn ensure_bucket_exists(&self) {
        // CreateBucket on an existing bucket fails harmlessly.
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            tracing::debug!(bucket = %self.bucket_name, error = %e, "create_bucket skipped");
        }
    }

    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .set_content_type(content_type.map(str::to_string))
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                let service_error = e.into_service_error();
                return Err(if service_error.is_no_such_key() {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::Backend(service_error.to_string())
                });
            }
        };

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(data.into_bytes().to_vec())
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }
}

// 3. The In-Memory Implementation (tests and local runs without MinIO)
/// MemoryStorage
///
/// Keeps objects in a map. Optionally fails every call to exercise error paths.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    should_fail: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.should_fail {
            return Err(StorageError::Backend("simulated storage failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageService for MemoryStorage {
    async fn ensure_bucket_exists(&self) {}

    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: Option<&str>,
    ) -> Result<(), StorageError> {
        self.check()?;
        self.objects.write().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.check()?;
        self.objects
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.check()?;
        self.objects.write().remove(key);
        Ok(())
    }
}

/// StorageState
///
/// The shared handle to the storage service inside `AppState`.
pub type StorageState = Arc<dyn StorageService>;

/// evidence_key
///
/// Builds the object key for an uploaded evidence file: `evidence/task-{id}/{uuid}{.ext}`.
/// Only the extension of the client-supplied name survives, and only if it is short
/// and alphanumeric, so no path component of the original name reaches storage.
pub fn evidence_key(task_id: i64, original_name: &str) -> String {
    let ext = sanitize_file_name(original_name)
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| format!(".{ext}"))
        .unwrap_or_else(|| ".dat".to_string());
    format!("evidence/task-{task_id}/{}{ext}", Uuid::new_v4().simple())
}

/// sanitize_file_name
///
/// Reduces a client-supplied file name to its final path segment with only safe
/// characters, for storing and echoing back in `Content-Disposition`.
pub fn sanitize_file_name(name: &str) -> String {
    let last = name
        .rsplit(['/', '\\'])
        .find(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .unwrap_or("");
    let cleaned: String = last
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_directories_and_odd_characters() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\scans\\nessus report.xml"), "nessus_report.xml");
        assert_eq!(sanitize_file_name(".."), "untitled");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
    }

    #[test]
    fn evidence_key_keeps_only_a_safe_extension() {
        let key = evidence_key(7, "burp/export.XML");
        assert!(key.starts_with("evidence/task-7/"));
        assert!(key.ends_with(".xml"));

        let key = evidence_key(7, "noext");
        assert!(key.ends_with(".dat"));

        let key = evidence_key(7, "weird.e$x");
        assert!(key.ends_with(".dat"));
    }

    #[tokio::test]
    async fn memory_storage_round_trip_and_failure_mode() {
        let storage = MemoryStorage::new();
        storage.put_object("k", b"abc".to_vec(), None).await.unwrap();
        assert_eq!(storage.get_object("k").await.unwrap(), b"abc");
        storage.delete_object("k").await.unwrap();
        assert!(matches!(storage.get_object("k").await, Err(StorageError::NotFound(_))));

        let failing = MemoryStorage::new_failing();
        assert!(failing.put_object("k", vec![], None).await.is_err());
    }
}
