//! Chestdrop storage library
//!
//! Blob store abstraction and implementations. Objects live under
//! `{session_id}/{file_id}` keys; chunked uploads go through the backend's
//! multipart API, identified by an opaque `upload_id` the caller carries
//! (chestdrop embeds it in the multipart bearer token rather than a table).
//!
//! Backends: S3 (and S3-compatible endpoints), local filesystem, and an
//! in-memory store for tests and throwaway deployments.

pub mod factory;
pub mod keys;
pub mod local;
pub mod memory;
pub mod s3;
pub mod traits;

pub use factory::create_storage;
pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use s3::S3Storage;
pub use traits::{
    bytes_stream, ByteStream, ObjectBody, PartRef, Storage, StorageError, StorageResult,
};
