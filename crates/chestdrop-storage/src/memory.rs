use crate::traits::{
    content_etag, ByteStream, ObjectBody, PartRef, Storage, StorageError, StorageResult,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// An in-flight multipart upload: destination key plus parts by number.
#[derive(Debug, Default, Clone)]
struct PendingUpload {
    key: String,
    parts: BTreeMap<i32, Bytes>,
}

/// In-memory storage implementation
///
/// Backs tests and `STORAGE_BACKEND=memory` deployments where blobs are as
/// ephemeral as the process. Incoming streams are drained into the maps —
/// holding whole objects is this backend's entire job. Cheap clones share
/// the same underlying maps.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    objects: Arc<Mutex<HashMap<String, Bytes>>>,
    uploads: Arc<Mutex<HashMap<String, PendingUpload>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects. Test helper.
    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }
}

async fn drain(mut data: ByteStream<'_>) -> StorageResult<Bytes> {
    let mut buf = Vec::new();
    while let Some(chunk) = data.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(Bytes::from(buf))
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn put(&self, key: &str, data: ByteStream<'_>) -> StorageResult<u64> {
        let data = drain(data).await?;
        let written = data.len() as u64;
        self.objects.lock().await.insert(key.to_string(), data);
        Ok(written)
    }

    async fn get(&self, key: &str) -> StorageResult<ObjectBody> {
        let objects = self.objects.lock().await;
        let data = objects
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;

        let content_length = data.len() as u64;
        Ok(ObjectBody {
            stream: Box::pin(futures::stream::once(async move { Ok(data) })),
            content_length,
        })
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.objects.lock().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let objects = self.objects.lock().await;
        let mut keys: Vec<String> = objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn multipart_create(&self, key: &str) -> StorageResult<String> {
        let upload_id = Uuid::new_v4().simple().to_string();
        self.uploads.lock().await.insert(
            upload_id.clone(),
            PendingUpload {
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn multipart_put_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: ByteStream<'_>,
    ) -> StorageResult<String> {
        let data = drain(data).await?;

        let mut uploads = self.uploads.lock().await;
        let upload = uploads
            .get_mut(upload_id)
            .ok_or_else(|| StorageError::InvalidUpload(format!("Unknown upload id: {}", upload_id)))?;
        if upload.key != key {
            return Err(StorageError::InvalidUpload(format!(
                "Upload {} does not belong to key {}",
                upload_id, key
            )));
        }

        let etag = content_etag(&data);
        upload.parts.insert(part_number, data);
        Ok(etag)
    }

    async fn multipart_complete(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartRef],
    ) -> StorageResult<()> {
        let mut uploads = self.uploads.lock().await;
        let upload = uploads
            .get(upload_id)
            .ok_or_else(|| StorageError::InvalidUpload(format!("Unknown upload id: {}", upload_id)))?;
        if upload.key != key {
            return Err(StorageError::InvalidUpload(format!(
                "Upload {} does not belong to key {}",
                upload_id, key
            )));
        }

        let mut assembled = Vec::new();
        for part in parts {
            let data = upload.parts.get(&part.part_number).ok_or_else(|| {
                StorageError::InvalidUpload(format!(
                    "Part {} was never uploaded for upload {}",
                    part.part_number, upload_id
                ))
            })?;
            assembled.extend_from_slice(data);
        }

        uploads.remove(upload_id);
        drop(uploads);

        self.objects
            .lock()
            .await
            .insert(key.to_string(), Bytes::from(assembled));
        Ok(())
    }

    async fn multipart_abort(&self, key: &str, upload_id: &str) -> StorageResult<()> {
        let mut uploads = self.uploads.lock().await;
        match uploads.get(upload_id) {
            Some(upload) if upload.key == key => {
                uploads.remove(upload_id);
                Ok(())
            }
            Some(_) => Err(StorageError::InvalidUpload(format!(
                "Upload {} does not belong to key {}",
                upload_id, key
            ))),
            None => Err(StorageError::InvalidUpload(format!(
                "Unknown upload id: {}",
                upload_id
            ))),
        }
    }

    async fn multipart_list(&self, prefix: &str) -> StorageResult<Vec<(String, String)>> {
        let uploads = self.uploads.lock().await;
        let mut pending: Vec<(String, String)> = uploads
            .iter()
            .filter(|(_, upload)| upload.key.starts_with(prefix))
            .map(|(upload_id, upload)| (upload.key.clone(), upload_id.clone()))
            .collect();
        pending.sort();
        Ok(pending)
    }
}
