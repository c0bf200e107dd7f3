//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Blob store abstraction.
///
/// Keys are `/`-separated paths as produced by `shutter_core::keys`.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get an object's content.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Put an object atomically.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Delete every object under a prefix. Returns the number deleted.
    async fn delete_prefix(&self, prefix: &str) -> StorageResult<u64>;

    /// List object keys with a prefix.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Produce a time-limited read URL for an object.
    ///
    /// Backends without URL signing return `PresignUnsupported`; callers
    /// fall back to `permanent_url` or to serving the bytes themselves.
    async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String>;

    /// A permanent public URL for an object, if the backend has one.
    fn permanent_url(&self, key: &str) -> Option<String>;

    /// Get the name of this storage backend, for logs.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// Called during server startup so misconfiguration surfaces before
    /// the first request.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
