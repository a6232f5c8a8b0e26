use crate::traits::{ByteStream, ObjectBody, PartRef, Storage, StorageError, StorageResult};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::retry::{RetryConfig, RetryMode};
use aws_config::BehaviorVersion;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use futures::StreamExt;

/// Buffer size for spooling unbounded `put` streams through the S3 multipart
/// API. Memory per upload stays bounded at roughly this size regardless of
/// object size. S3 requires parts of at least 5 MiB (except the last).
const STREAM_PART_SIZE: usize = 8 * 1024 * 1024;

/// S3 storage implementation
///
/// Works against AWS S3 and S3-compatible providers (MinIO, DigitalOcean
/// Spaces) via an optional custom endpoint, which switches the client to
/// path-style addressing.
///
/// S3 signs uploads over a known content length, so an incoming stream of
/// unknown size cannot go out as one `PutObject`. Small objects are buffered
/// up to [`STREAM_PART_SIZE`] and sent whole; anything larger is spooled
/// through the multipart API part by part, keeping memory bounded.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL
    ///   (e.g. "http://localhost:9000" for MinIO)
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
    ) -> StorageResult<Self> {
        let region_provider = RegionProviderChain::first_try(aws_config::Region::new(region));

        let retry_config = RetryConfig::standard()
            .with_max_attempts(5)
            .with_retry_mode(RetryMode::Adaptive);

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .retry_config(retry_config)
            .load()
            .await;

        let client = match endpoint_url {
            Some(endpoint) => {
                let conf = aws_sdk_s3::config::Builder::from(&sdk_config)
                    .endpoint_url(endpoint)
                    .force_path_style(true)
                    .build();
                Client::from_conf(conf)
            }
            None => Client::new(&sdk_config),
        };

        Ok(S3Storage { client, bucket })
    }

    /// Upload one already-materialized part body.
    async fn upload_part_bytes(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> StorageResult<String> {
        let size = data.len() as u64;

        let resp = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(aws_sdk_s3::primitives::ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    part_number,
                    "S3 upload part failed"
                );
                StorageError::Backend(e.to_string())
            })?;

        let etag = resp
            .e_tag()
            .ok_or_else(|| {
                StorageError::Backend(format!("No ETag returned for part {}", part_number))
            })?
            .trim_matches('"')
            .to_string();

        tracing::debug!(
            bucket = %self.bucket,
            key = %key,
            part_number,
            size_bytes = size,
            "S3 part uploaded"
        );

        Ok(etag)
    }

    /// Spool the remainder of an oversized `put` stream through the multipart
    /// API. `first` already holds one part's worth of data.
    async fn spool_multipart(
        &self,
        key: &str,
        upload_id: &str,
        first: Vec<u8>,
        data: &mut ByteStream<'_>,
    ) -> StorageResult<u64> {
        let mut parts: Vec<PartRef> = Vec::new();
        let mut part_number: i32 = 1;
        let mut written: u64 = 0;
        let mut buf = first;
        let mut exhausted = false;

        loop {
            while !exhausted && buf.len() < STREAM_PART_SIZE {
                match data.next().await.transpose()? {
                    Some(chunk) => buf.extend_from_slice(&chunk),
                    None => exhausted = true,
                }
            }
            if buf.is_empty() {
                break;
            }

            let body = Bytes::from(std::mem::take(&mut buf));
            written += body.len() as u64;
            let etag = self
                .upload_part_bytes(key, upload_id, part_number, body)
                .await?;
            parts.push(PartRef { part_number, etag });
            part_number += 1;

            if exhausted {
                break;
            }
        }

        self.multipart_complete(key, upload_id, &parts).await?;
        Ok(written)
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn put(&self, key: &str, mut data: ByteStream<'_>) -> StorageResult<u64> {
        let start = std::time::Instant::now();

        // Pull up to one part's worth; most objects fit and go out whole.
        let mut buf: Vec<u8> = Vec::new();
        let mut exhausted = false;
        while !exhausted && buf.len() < STREAM_PART_SIZE {
            match data.next().await.transpose()? {
                Some(chunk) => buf.extend_from_slice(&chunk),
                None => exhausted = true,
            }
        }

        if exhausted {
            let written = buf.len() as u64;
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .body(aws_sdk_s3::primitives::ByteStream::from(Bytes::from(buf)))
                .send()
                .await
                .map_err(|e| {
                    tracing::error!(
                        error = %e,
                        bucket = %self.bucket,
                        key = %key,
                        size_bytes = written,
                        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                        "S3 put failed"
                    );
                    StorageError::Backend(e.to_string())
                })?;

            tracing::debug!(
                bucket = %self.bucket,
                key = %key,
                size_bytes = written,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 put successful"
            );
            return Ok(written);
        }

        // Larger than one buffer: stream through the multipart API.
        let upload_id = self.multipart_create(key).await?;
        match self.spool_multipart(key, &upload_id, buf, &mut data).await {
            Ok(written) => {
                tracing::debug!(
                    bucket = %self.bucket,
                    key = %key,
                    size_bytes = written,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 streaming put successful"
                );
                Ok(written)
            }
            Err(e) => {
                let _ = self.multipart_abort(key, &upload_id).await;
                Err(e)
            }
        }
    }

    async fn get(&self, key: &str) -> StorageResult<ObjectBody> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|se| se.is_no_such_key()) == Some(true) {
                    StorageError::NotFound(key.to_string())
                } else {
                    tracing::error!(error = %e, bucket = %self.bucket, key = %key, "S3 get failed");
                    StorageError::Backend(e.to_string())
                }
            })?;

        let content_length = resp.content_length().unwrap_or_default().max(0) as u64;

        let stream = futures::stream::try_unfold(resp.body, |mut body| async move {
            match body.try_next().await {
                Ok(Some(chunk)) => Ok(Some((chunk, body))),
                Ok(None) => Ok(None),
                Err(e) => Err(StorageError::Backend(e.to_string())),
            }
        });

        Ok(ObjectBody {
            stream: Box::pin(stream),
            content_length,
        })
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, bucket = %self.bucket, key = %key, "S3 delete failed");
                StorageError::Backend(e.to_string())
            })?;

        tracing::debug!(bucket = %self.bucket, key = %key, "S3 delete successful");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, bucket = %self.bucket, prefix = %prefix, "S3 list failed");
                    StorageError::Backend(e.to_string())
                })?;

            for object in resp.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }

            match resp.next_continuation_token() {
                Some(token) => continuation_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(keys)
    }

    async fn multipart_create(&self, key: &str) -> StorageResult<String> {
        let resp = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, bucket = %self.bucket, key = %key, "S3 create multipart failed");
                StorageError::Backend(e.to_string())
            })?;

        let upload_id = resp
            .upload_id()
            .ok_or_else(|| StorageError::Backend("No upload ID returned from S3".to_string()))?
            .to_string();

        tracing::debug!(bucket = %self.bucket, key = %key, upload_id = %upload_id, "S3 multipart created");
        Ok(upload_id)
    }

    async fn multipart_put_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        mut data: ByteStream<'_>,
    ) -> StorageResult<String> {
        // UploadPart signs over a known content length, so the part has to be
        // drained before the request goes out. Part size is client-chosen and
        // bounded by the request body cap, unlike whole objects.
        let mut buf = Vec::new();
        while let Some(chunk) = data.next().await {
            buf.extend_from_slice(&chunk?);
        }

        self.upload_part_bytes(key, upload_id, part_number, Bytes::from(buf))
            .await
    }

    async fn multipart_complete(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartRef],
    ) -> StorageResult<()> {
        let completed_parts: Vec<CompletedPart> = parts
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(&p.etag)
                    .build()
            })
            .collect();

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    parts = parts.len(),
                    "S3 complete multipart failed"
                );
                StorageError::Backend(e.to_string())
            })?;

        tracing::debug!(
            bucket = %self.bucket,
            key = %key,
            parts = parts.len(),
            "S3 multipart assembled"
        );

        Ok(())
    }

    async fn multipart_abort(&self, key: &str, upload_id: &str) -> StorageResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, bucket = %self.bucket, key = %key, "S3 abort multipart failed");
                StorageError::Backend(e.to_string())
            })?;

        tracing::debug!(bucket = %self.bucket, key = %key, "S3 multipart aborted");
        Ok(())
    }

    async fn multipart_list(&self, prefix: &str) -> StorageResult<Vec<(String, String)>> {
        let resp = self
            .client
            .list_multipart_uploads()
            .bucket(&self.bucket)
            .prefix(prefix)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, bucket = %self.bucket, prefix = %prefix, "S3 list multipart uploads failed");
                StorageError::Backend(e.to_string())
            })?;

        let uploads = resp
            .uploads()
            .iter()
            .filter_map(|u| match (u.key(), u.upload_id()) {
                (Some(key), Some(upload_id)) => Some((key.to_string(), upload_id.to_string())),
                _ => None,
            })
            .collect();

        Ok(uploads)
    }
}
