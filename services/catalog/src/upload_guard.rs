//! Collision-checked publishing of 3D model files.
//!
//! The guard turns an uploaded file name into a storage-safe key and refuses
//! to overwrite an existing object. Three layers close the check-then-act
//! window: an in-process lease per key, a case-insensitive scan of the
//! bucket, and a conditional put that the object store itself enforces.

use crate::error::{ApiError, ApiResult};
use crate::object_store::{ObjectStore, PutOutcome};
use axum::body::Bytes;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, instrument, warn};

/// Content type of every published model
pub const MODEL_CONTENT_TYPE: &str = "model/gltf-binary";

const DUPLICATE_MESSAGE: &str =
    "A model with that name already exists, rename it before uploading";

/// Response body of a successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub url: String,
    pub file_name: String,
}

/// Normalize an uploaded file name into an object key.
///
/// Keeps the last path component, turns each whitespace run into a single
/// `-`, drops everything outside ASCII letters, digits, `-`, `.` and `_`,
/// and lower-cases the rest. Applying it twice gives the same key.
pub fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();

    let mut key = String::with_capacity(base.len());
    let mut in_whitespace = false;
    for c in base.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                key.push('-');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;
        if c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_') {
            key.push(c.to_ascii_lowercase());
        }
    }
    key
}

/// Join the public endpoint, bucket and key into the object's URL
pub fn public_url(endpoint: &str, bucket: &str, key: &str) -> String {
    format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, key)
}

/// Keys with an upload in flight in this process
#[derive(Debug, Default)]
struct KeyLeases {
    held: Mutex<HashSet<String>>,
}

impl KeyLeases {
    fn try_acquire(self: &Arc<Self>, key: &str) -> Option<KeyLease> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(key.to_string()) {
            return None;
        }
        Some(KeyLease {
            leases: Arc::clone(self),
            key: key.to_string(),
        })
    }
}

/// Released on drop, whatever path the upload takes
struct KeyLease {
    leases: Arc<KeyLeases>,
    key: String,
}

impl Drop for KeyLease {
    fn drop(&mut self) {
        self.leases
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

pub struct UploadGuard {
    store: Arc<dyn ObjectStore>,
    bucket: Option<String>,
    public_endpoint: String,
    leases: Arc<KeyLeases>,
}

impl UploadGuard {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: Option<String>,
        public_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bucket,
            public_endpoint: public_endpoint.into(),
            leases: Arc::default(),
        }
    }

    fn bucket(&self) -> ApiResult<&str> {
        self.bucket
            .as_deref()
            .map(str::trim)
            .filter(|bucket| !bucket.is_empty())
            .ok_or_else(|| ApiError::Configuration("Bucket not configured".to_string()))
    }

    /// Publish `body` under the sanitized form of `file_name`
    #[instrument(skip(self, body), fields(size_bytes = body.len()))]
    pub async fn upload(&self, file_name: &str, body: Bytes) -> ApiResult<UploadResponse> {
        if body.is_empty() {
            return Err(ApiError::Validation("Empty file".to_string()));
        }

        let bucket = self.bucket()?;

        let key = sanitize_file_name(file_name);
        if key.is_empty() {
            return Err(ApiError::Validation(
                "File name has no usable characters".to_string(),
            ));
        }

        let Some(_lease) = self.leases.try_acquire(&key) else {
            metrics::counter!("catalog.uploads.rejected").increment(1);
            warn!(key = %key, "Upload of the same key already in progress");
            return Err(ApiError::Conflict(DUPLICATE_MESSAGE.to_string()));
        };

        // Unscoped listing: a prefix filter would miss keys differing in case
        let existing = self
            .store
            .list_keys(bucket)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to upload file: {e}")))?;

        if existing.iter().any(|k| k.eq_ignore_ascii_case(&key)) {
            metrics::counter!("catalog.uploads.rejected").increment(1);
            info!(key = %key, "Rejected upload, key already in bucket");
            return Err(ApiError::Conflict(DUPLICATE_MESSAGE.to_string()));
        }

        let outcome = self
            .store
            .put_if_absent(bucket, &key, body, MODEL_CONTENT_TYPE)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to upload file: {e}")))?;

        if outcome == PutOutcome::AlreadyExists {
            metrics::counter!("catalog.uploads.rejected").increment(1);
            info!(key = %key, "Rejected upload, store refused overwrite");
            return Err(ApiError::Conflict(DUPLICATE_MESSAGE.to_string()));
        }

        metrics::counter!("catalog.uploads.completed").increment(1);
        info!(key = %key, bucket = %bucket, "Model uploaded");

        Ok(UploadResponse {
            url: public_url(&self.public_endpoint, bucket, &key),
            file_name: key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::{MemoryObjectStore, StorageError};
    use async_trait::async_trait;

    fn guard(store: Arc<dyn ObjectStore>) -> UploadGuard {
        UploadGuard::new(store, Some("models".to_string()), "https://s3.example.com/")
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("My File (1).GLB"), "my-file-1.glb");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\models\\Bike Frame.glb"), "bike-frame.glb");
        assert_eq!(sanitize_file_name("a \t\n b.glb"), "a-b.glb");
        assert_eq!(sanitize_file_name("ruedá_v2.glb"), "rued_v2.glb");
        assert_eq!(sanitize_file_name("dir/"), "");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        for name in ["My File (1).GLB", "casco  rojo.glb", "x/y/Z_z.GLB", "plain.glb"] {
            let once = sanitize_file_name(name);
            assert_eq!(sanitize_file_name(&once), once);
            assert!(once
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "-._".contains(c)));
        }
    }

    #[test]
    fn test_public_url() {
        assert_eq!(
            public_url("https://s3.example.com/", "models", "bike.glb"),
            "https://s3.example.com/models/bike.glb"
        );
    }

    #[tokio::test]
    async fn test_upload_stores_under_sanitized_key() {
        let store = MemoryObjectStore::new();
        let response = guard(Arc::new(store.clone()))
            .upload("Bike Frame.GLB", Bytes::from_static(b"glTF"))
            .await
            .unwrap();

        assert_eq!(response.file_name, "bike-frame.glb");
        assert_eq!(response.url, "https://s3.example.com/models/bike-frame.glb");
        let stored = store.get("models", "bike-frame.glb").await.unwrap();
        assert_eq!(stored.content_type, MODEL_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn test_case_insensitive_collision_is_rejected() {
        let store = MemoryObjectStore::new();
        store
            .insert("models", "Bike-Frame.glb", Bytes::from_static(b"old"))
            .await;

        let err = guard(Arc::new(store.clone()))
            .upload("bike frame.glb", Bytes::from_static(b"new"))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Conflict(_)));
        assert!(store.get("models", "bike-frame.glb").await.is_none());
    }

    #[tokio::test]
    async fn test_missing_bucket_is_configuration_error() {
        let guard = UploadGuard::new(
            Arc::new(MemoryObjectStore::new()),
            Some("  ".to_string()),
            "https://s3.example.com",
        );
        let err = guard
            .upload("bike.glb", Bytes::from_static(b"glTF"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_empty_body_is_validation_error() {
        let err = guard(Arc::new(MemoryObjectStore::new()))
            .upload("bike.glb", Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn test_concurrent_uploads_single_winner() {
        let store = MemoryObjectStore::new();
        let guard = Arc::new(guard(Arc::new(store.clone())));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let guard = Arc::clone(&guard);
                tokio::spawn(async move {
                    guard
                        .upload("Same Name.glb", Bytes::from(format!("body-{i}")))
                        .await
                })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(err) => assert!(matches!(err, ApiError::Conflict(_))),
            }
        }
        assert_eq!(successes, 1);
    }

    /// Bucket listing that never shows the key, as a stale or racing listing would
    struct BlindListing(MemoryObjectStore);

    #[async_trait]
    impl ObjectStore for BlindListing {
        async fn list_keys(&self, _bucket: &str) -> Result<Vec<String>, StorageError> {
            Ok(Vec::new())
        }

        async fn put_if_absent(
            &self,
            bucket: &str,
            key: &str,
            body: Bytes,
            content_type: &str,
        ) -> Result<PutOutcome, StorageError> {
            self.0.put_if_absent(bucket, key, body, content_type).await
        }
    }

    #[tokio::test]
    async fn test_conditional_put_catches_missed_collision() {
        let inner = MemoryObjectStore::new();
        inner
            .insert("models", "bike.glb", Bytes::from_static(b"old"))
            .await;

        let err = guard(Arc::new(BlindListing(inner.clone())))
            .upload("bike.glb", Bytes::from_static(b"new"))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Conflict(_)));
        let stored = inner.get("models", "bike.glb").await.unwrap();
        assert_eq!(stored.body, Bytes::from_static(b"old"));
    }

    struct FailingStore;

    #[async_trait]
    impl ObjectStore for FailingStore {
        async fn list_keys(&self, _bucket: &str) -> Result<Vec<String>, StorageError> {
            Err(StorageError::Transport("connection refused".to_string()))
        }

        async fn put_if_absent(
            &self,
            _bucket: &str,
            _key: &str,
            _body: Bytes,
            _content_type: &str,
        ) -> Result<PutOutcome, StorageError> {
            unreachable!("listing fails first")
        }
    }

    #[tokio::test]
    async fn test_storage_failure_is_internal_error_with_message() {
        let err = guard(Arc::new(FailingStore))
            .upload("bike.glb", Bytes::from_static(b"glTF"))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Internal(_)));
        assert!(err.to_string().contains("connection refused"));
    }
}
