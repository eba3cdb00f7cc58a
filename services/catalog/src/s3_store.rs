use crate::config::S3Config;
use crate::object_store::{ObjectStore, PutOutcome, StorageError};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Credentials};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client as S3Client;
use aws_types::region::Region;
use axum::body::Bytes;
use tracing::{debug, info, instrument, warn};

/// Any key will do for a conditional put that must not overwrite
const IF_NONE_MATCH_ANY: &str = "*";

/// S3-compatible object store (Backblaze B2, MinIO, AWS)
pub struct S3ObjectStore {
    client: S3Client,
    multipart_threshold_bytes: usize,
    part_size_bytes: usize,
}

impl S3ObjectStore {
    /// Build the long-lived client shared by every request
    pub async fn new(config: &S3Config) -> anyhow::Result<Self> {
        let credentials = Credentials::new(
            config.key_id.clone(),
            config.application_key.clone(),
            None,
            None,
            "catalog-config",
        );

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .endpoint_url(&config.endpoint)
            .load()
            .await;

        let s3_config = S3ConfigBuilder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();
        let client = S3Client::from_conf(s3_config);

        info!(
            endpoint = %config.endpoint,
            region = %config.region,
            "S3 client initialized"
        );

        Ok(Self {
            client,
            multipart_threshold_bytes: config.multipart_threshold_bytes,
            part_size_bytes: config.part_size_bytes.max(1),
        })
    }

    /// Single-part conditional upload for small bodies
    async fn simple_upload(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<PutOutcome, StorageError> {
        let result = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .if_none_match(IF_NONE_MATCH_ANY)
            .send()
            .await;

        match result {
            Ok(_) => Ok(PutOutcome::Created),
            Err(err) if is_precondition_failed(&err) => Ok(PutOutcome::AlreadyExists),
            Err(err) => Err(transport_error(err)),
        }
    }

    /// Multipart upload for large bodies; the condition is checked on completion
    async fn multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<PutOutcome, StorageError> {
        let create_response = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(transport_error)?;

        let upload_id = create_response
            .upload_id()
            .ok_or_else(|| StorageError::Transport("No upload ID in response".to_string()))?
            .to_string();

        let outcome = self.upload_parts(bucket, key, &upload_id, body).await;

        if !matches!(outcome, Ok(PutOutcome::Created)) {
            // Leave no orphaned parts behind
            if let Err(err) = self
                .client
                .abort_multipart_upload()
                .bucket(bucket)
                .key(key)
                .upload_id(&upload_id)
                .send()
                .await
            {
                warn!(key = %key, error = %DisplayErrorContext(&err), "Failed to abort multipart upload");
            }
        }

        outcome
    }

    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        body: Bytes,
    ) -> Result<PutOutcome, StorageError> {
        let mut completed_parts = Vec::new();
        let mut part_number = 1;
        let mut offset = 0;

        while offset < body.len() {
            let end = (offset + self.part_size_bytes).min(body.len());
            let chunk = body.slice(offset..end);

            let upload_part_response = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .map_err(transport_error)?;

            completed_parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(upload_part_response.e_tag().unwrap_or_default())
                    .build(),
            );

            part_number += 1;
            offset = end;
        }

        let completed_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        let result = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_upload)
            .if_none_match(IF_NONE_MATCH_ANY)
            .send()
            .await;

        match result {
            Ok(_) => Ok(PutOutcome::Created),
            Err(err) if is_precondition_failed(&err) => Ok(PutOutcome::AlreadyExists),
            Err(err) => Err(transport_error(err)),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self))]
    async fn list_keys(&self, bucket: &str) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(transport_error)?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(String::from)),
            );
        }

        debug!(bucket = %bucket, key_count = keys.len(), "Listed bucket");
        Ok(keys)
    }

    #[instrument(skip(self, body), fields(size_bytes = body.len()))]
    async fn put_if_absent(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<PutOutcome, StorageError> {
        if body.len() > self.multipart_threshold_bytes {
            self.multipart_upload(bucket, key, body, content_type).await
        } else {
            self.simple_upload(bucket, key, body, content_type).await
        }
    }
}

/// Whether the store rejected a write because of `If-None-Match`
fn is_precondition_failed<E, R>(err: &SdkError<E, R>) -> bool
where
    E: ProvideErrorMetadata,
{
    err.as_service_error()
        .and_then(|service_error| service_error.code())
        .map_or(false, |code| {
            code == "PreconditionFailed" || code == "ConditionalRequestConflict"
        })
}

fn transport_error<E, R>(err: SdkError<E, R>) -> StorageError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    StorageError::Transport(DisplayErrorContext(&err).to_string())
}
