//! Object storage seam used by the upload guard.

use async_trait::async_trait;
use axum::body::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0}")]
    Transport(String),
}

/// Result of a put that must not overwrite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    /// The store already held the key and refused the write
    AlreadyExists,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Every key in the bucket, across all listing pages
    async fn list_keys(&self, bucket: &str) -> Result<Vec<String>, StorageError>;

    /// Store `body` under `key` unless the key already exists
    async fn put_if_absent(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<PutOutcome, StorageError>;
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: String,
}

/// Bucket contents held in process, for tests and local development
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    buckets: Arc<RwLock<HashMap<String, HashMap<String, StoredObject>>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.buckets
            .read()
            .await
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
    }

    /// Seed an object, bypassing the overwrite check
    pub async fn insert(&self, bucket: &str, key: &str, body: Bytes) {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default()
            .insert(
                key.to_string(),
                StoredObject {
                    body,
                    content_type: "application/octet-stream".to_string(),
                },
            );
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list_keys(&self, bucket: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .buckets
            .read()
            .await
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn put_if_absent(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<PutOutcome, StorageError> {
        let mut buckets = self.buckets.write().await;
        let objects = buckets.entry(bucket.to_string()).or_default();
        if objects.contains_key(key) {
            return Ok(PutOutcome::AlreadyExists);
        }

        objects.insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: content_type.to_string(),
            },
        );
        Ok(PutOutcome::Created)
    }
}
