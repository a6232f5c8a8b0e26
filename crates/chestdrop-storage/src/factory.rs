//! Storage backend factory.

use std::sync::Arc;

use chestdrop_core::config::{Config, StorageBackend};

use crate::local::LocalStorage;
use crate::memory::MemoryStorage;
use crate::s3::S3Storage;
use crate::traits::Storage;

/// Construct the configured storage backend.
pub async fn create_storage(config: &Config) -> Result<Arc<dyn Storage>, anyhow::Error> {
    match config.storage_backend {
        StorageBackend::S3 => {
            let bucket = config
                .s3_bucket
                .clone()
                .ok_or_else(|| anyhow::anyhow!("S3_BUCKET is required for the s3 backend"))?;
            let region = config
                .s3_region
                .clone()
                .ok_or_else(|| anyhow::anyhow!("S3_REGION is required for the s3 backend"))?;

            tracing::info!(bucket = %bucket, region = %region, endpoint = ?config.s3_endpoint, "Using S3 storage backend");
            let storage = S3Storage::new(bucket, region, config.s3_endpoint.clone()).await?;
            Ok(Arc::new(storage))
        }
        StorageBackend::Local => {
            tracing::info!(path = %config.local_storage_path, "Using local storage backend");
            let storage = LocalStorage::new(config.local_storage_path.clone()).await?;
            Ok(Arc::new(storage))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage backend; blobs will not survive a restart");
            Ok(Arc::new(MemoryStorage::new()))
        }
    }
}
