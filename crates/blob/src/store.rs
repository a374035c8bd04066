use async_trait::async_trait;
use bytes::Bytes;

use crate::error::BlobError;

/// Pluggable binary storage for book files, keyed by storage key.
///
/// Implementors provide the actual storage mechanism (e.g. S3, filesystem).
/// Blob writes are never covered by a relational transaction; callers
/// sequence them against the metadata rows that reference them.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a blob under `key`, overwriting any previous content.
    async fn put(&self, key: &str, data: Bytes) -> Result<(), BlobError>;

    /// Retrieve a blob. Returns `None` if no blob exists under `key`.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, BlobError>;

    /// Delete a blob. Returns `true` if a blob existed under `key`.
    async fn delete(&self, key: &str) -> Result<bool, BlobError>;
}
