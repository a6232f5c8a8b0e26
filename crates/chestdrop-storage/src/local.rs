use crate::traits::{
    ByteStream, EtagBuilder, ObjectBody, PartRef, Storage, StorageError, StorageResult,
};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

/// Directory under the base path holding staged multipart uploads. Excluded
/// from `list` so half-done uploads never masquerade as objects.
const MULTIPART_DIR: &str = ".multipart";

/// Marker file inside each staging directory recording the destination key.
const KEY_MARKER: &str = "key";

/// Local filesystem storage implementation
///
/// Objects are plain files under `base/{key}`, written chunk by chunk as the
/// body streams in. Multipart uploads stage their parts under
/// `base/.multipart/{upload_id}/` and are concatenated into the final key on
/// complete.
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// # Arguments
    /// * `base_path` - Root directory for blob storage (created if missing)
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::Config(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage { base_path })
    }

    /// Converts a storage key to a filesystem path, rejecting traversal.
    fn key_to_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty()
            || key.starts_with('/')
            || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
        {
            return Err(StorageError::InvalidKey(format!(
                "Storage key contains invalid segments: {}",
                key
            )));
        }
        Ok(self.base_path.join(key))
    }

    fn staging_dir(&self, upload_id: &str) -> StorageResult<PathBuf> {
        if upload_id.is_empty() || upload_id.contains('/') || upload_id.contains("..") {
            return Err(StorageError::InvalidUpload(format!(
                "Malformed upload id: {}",
                upload_id
            )));
        }
        Ok(self.base_path.join(MULTIPART_DIR).join(upload_id))
    }

    fn part_path(staging: &Path, part_number: i32) -> PathBuf {
        staging.join(format!("part-{:05}", part_number))
    }

    /// Verify the staging dir exists and was created for `key`.
    async fn checked_staging_dir(&self, key: &str, upload_id: &str) -> StorageResult<PathBuf> {
        let staging = self.staging_dir(upload_id)?;
        let marker = fs::read_to_string(staging.join(KEY_MARKER))
            .await
            .map_err(|_| StorageError::InvalidUpload(format!("Unknown upload id: {}", upload_id)))?;
        if marker != key {
            return Err(StorageError::InvalidUpload(format!(
                "Upload {} does not belong to key {}",
                upload_id, key
            )));
        }
        Ok(staging)
    }

    async fn ensure_parent_dir(path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Drain `data` into `file`, hashing as it goes. Returns bytes written.
    async fn write_stream(
        file: &mut fs::File,
        data: &mut ByteStream<'_>,
        etag: &mut EtagBuilder,
    ) -> StorageResult<u64> {
        let mut written: u64 = 0;
        while let Some(chunk) = data.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            etag.update(&chunk);
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }

    /// Recursively collect relative object keys under `dir`.
    async fn collect_keys(
        &self,
        dir: PathBuf,
        prefix: &str,
        keys: &mut Vec<String>,
    ) -> StorageResult<()> {
        let mut stack = vec![dir];
        while let Some(current) = stack.pop() {
            let mut entries = match fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    if path.file_name().map(|n| n == MULTIPART_DIR).unwrap_or(false)
                        && current == self.base_path
                    {
                        continue;
                    }
                    stack.push(path);
                } else if let Ok(rel) = path.strip_prefix(&self.base_path) {
                    let key = rel.to_string_lossy().replace('\\', "/");
                    if key.starts_with(prefix) {
                        keys.push(key);
                    }
                }
            }
        }
        keys.sort();
        Ok(())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn put(&self, key: &str, mut data: ByteStream<'_>) -> StorageResult<u64> {
        let path = self.key_to_path(key)?;
        Self::ensure_parent_dir(&path).await?;

        let mut file = fs::File::create(&path).await?;
        let mut etag = EtagBuilder::new();
        match Self::write_stream(&mut file, &mut data, &mut etag).await {
            Ok(written) => {
                tracing::debug!(key = %key, size_bytes = written, "Local put successful");
                Ok(written)
            }
            Err(e) => {
                // Don't leave a half-written object behind.
                drop(file);
                let _ = fs::remove_file(&path).await;
                Err(e)
            }
        }
    }

    async fn get(&self, key: &str) -> StorageResult<ObjectBody> {
        let path = self.key_to_path(key)?;

        let file = fs::File::open(&path)
            .await
            .map_err(|_| StorageError::NotFound(key.to_string()))?;
        let content_length = file.metadata().await?.len();

        let stream = ReaderStream::new(file).map(|chunk| chunk.map_err(StorageError::from));

        Ok(ObjectBody {
            stream: Box::pin(stream),
            content_length,
        })
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        self.collect_keys(self.base_path.clone(), prefix, &mut keys)
            .await?;
        Ok(keys)
    }

    async fn multipart_create(&self, key: &str) -> StorageResult<String> {
        // Validate the destination before staging anything.
        self.key_to_path(key)?;

        let upload_id = Uuid::new_v4().simple().to_string();
        let staging = self.staging_dir(&upload_id)?;
        fs::create_dir_all(&staging).await?;
        fs::write(staging.join(KEY_MARKER), key).await?;

        tracing::debug!(key = %key, upload_id = %upload_id, "Local multipart created");
        Ok(upload_id)
    }

    async fn multipart_put_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        mut data: ByteStream<'_>,
    ) -> StorageResult<String> {
        let staging = self.checked_staging_dir(key, upload_id).await?;
        let path = Self::part_path(&staging, part_number);

        let mut file = fs::File::create(&path).await?;
        let mut etag = EtagBuilder::new();
        match Self::write_stream(&mut file, &mut data, &mut etag).await {
            Ok(_written) => Ok(etag.finish()),
            Err(e) => {
                drop(file);
                let _ = fs::remove_file(&path).await;
                Err(e)
            }
        }
    }

    async fn multipart_complete(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartRef],
    ) -> StorageResult<()> {
        let staging = self.checked_staging_dir(key, upload_id).await?;

        let final_path = self.key_to_path(key)?;
        Self::ensure_parent_dir(&final_path).await?;

        let mut out = fs::File::create(&final_path).await?;
        for part in parts {
            let mut part_file = fs::File::open(Self::part_path(&staging, part.part_number))
                .await
                .map_err(|_| {
                    StorageError::InvalidUpload(format!(
                        "Part {} was never uploaded for upload {}",
                        part.part_number, upload_id
                    ))
                })?;
            tokio::io::copy(&mut part_file, &mut out).await?;
        }
        out.flush().await?;

        fs::remove_dir_all(&staging).await?;

        tracing::debug!(key = %key, parts = parts.len(), "Local multipart assembled");
        Ok(())
    }

    async fn multipart_abort(&self, key: &str, upload_id: &str) -> StorageResult<()> {
        let staging = self.checked_staging_dir(key, upload_id).await?;
        fs::remove_dir_all(&staging).await?;
        tracing::debug!(key = %key, upload_id = %upload_id, "Local multipart aborted");
        Ok(())
    }

    async fn multipart_list(&self, prefix: &str) -> StorageResult<Vec<(String, String)>> {
        let multipart_root = self.base_path.join(MULTIPART_DIR);
        let mut uploads = Vec::new();

        let mut entries = match fs::read_dir(&multipart_root).await {
            Ok(entries) => entries,
            Err(_) => return Ok(uploads),
        };
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let upload_id = entry.file_name().to_string_lossy().to_string();
            if let Ok(key) = fs::read_to_string(entry.path().join(KEY_MARKER)).await {
                if key.starts_with(prefix) {
                    uploads.push((key, upload_id));
                }
            }
        }

        Ok(uploads)
    }
}
