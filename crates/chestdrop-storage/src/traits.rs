//! Storage abstraction trait
//!
//! All blob-store backends implement [`Storage`]. The trait mirrors what the
//! chest lifecycle needs: whole-object put/get/delete/list plus a resumable
//! multipart protocol (create, put part, complete, abort, and an enumeration
//! of in-flight uploads for the reaper).
//!
//! Object bodies cross the trait as byte streams in both directions, so
//! neither the handlers nor the backends hold a whole file in memory.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use sha2::{Digest, Sha256};
use std::pin::Pin;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Invalid multipart upload: {0}")]
    InvalidUpload(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A streamed object body. Uploads borrow the request they are read from;
/// downloads are `'static`.
pub type ByteStream<'a> = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send + 'a>>;

/// Wrap an in-memory buffer as a one-chunk [`ByteStream`]. For small bodies
/// (text items, tests) that are already materialized.
pub fn bytes_stream(data: Bytes) -> ByteStream<'static> {
    Box::pin(futures::stream::once(async move { Ok(data) }))
}

/// Streamed object content with its total length.
pub struct ObjectBody {
    pub stream: ByteStream<'static>,
    pub content_length: u64,
}

impl ObjectBody {
    /// Drain the stream into one buffer. Test helper; production paths stream.
    pub async fn collect(self) -> StorageResult<Bytes> {
        use futures::StreamExt;
        let mut buf = Vec::with_capacity(self.content_length as usize);
        let mut stream = self.stream;
        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(buf))
    }
}

/// A client-acknowledged part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRef {
    pub part_number: i32,
    pub etag: String,
}

/// Incremental content-derived etag used by the local and in-memory backends
/// (S3 supplies its own). Feeding chunks as they stream past avoids holding
/// the part body for hashing.
pub struct EtagBuilder {
    hasher: Sha256,
}

impl EtagBuilder {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    pub fn finish(self) -> String {
        let digest = self.hasher.finalize();
        hex::encode(&digest[..16])
    }
}

impl Default for EtagBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot etag for an already-materialized buffer.
pub fn content_etag(data: &[u8]) -> String {
    let mut etag = EtagBuilder::new();
    etag.update(data);
    etag.finish()
}

/// Blob store abstraction.
///
/// **Key format:** `{session_id}/{file_id}`; see the [`crate::keys`] module.
/// Keys must not contain `..` or a leading `/`.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store an object from a byte stream. Durable on success; returns the
    /// number of bytes written.
    async fn put(&self, key: &str, data: ByteStream<'_>) -> StorageResult<u64>;

    /// Fetch an object as a byte stream with a known length.
    async fn get(&self, key: &str) -> StorageResult<ObjectBody>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// List object keys under a prefix.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Begin a multipart upload at `key`; returns the backend's upload id.
    async fn multipart_create(&self, key: &str) -> StorageResult<String>;

    /// Stream one part in. Re-sending a part number replaces the prior body
    /// (last writer wins). Returns the part's etag.
    async fn multipart_put_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: ByteStream<'_>,
    ) -> StorageResult<String>;

    /// Assemble the object from `parts`, in the supplied order.
    async fn multipart_complete(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartRef],
    ) -> StorageResult<()>;

    /// Drop an in-flight multipart upload and its stored parts.
    async fn multipart_abort(&self, key: &str, upload_id: &str) -> StorageResult<()>;

    /// Enumerate in-flight multipart uploads whose key starts with `prefix`,
    /// as `(key, upload_id)` pairs. Used by the reaper to abort uploads of
    /// abandoned chests.
    async fn multipart_list(&self, prefix: &str) -> StorageResult<Vec<(String, String)>>;
}
