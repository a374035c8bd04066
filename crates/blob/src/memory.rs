use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use crate::error::BlobError;
use crate::store::BlobStore;

/// In-memory [`BlobStore`] backed by a [`DashMap`]. Suitable for
/// development and testing.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<String, Bytes>,
    max_size: Option<u64>,
}

impl MemoryBlobStore {
    /// Create a new, empty in-memory blob store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject blobs larger than `limit` bytes.
    pub fn with_max_size(mut self, limit: u64) -> Self {
        self.max_size = Some(limit);
        self
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), BlobError> {
        if let Some(limit) = self.max_size {
            let size = data.len() as u64;
            if size > limit {
                return Err(BlobError::TooLarge { size, limit });
            }
        }
        self.blobs.insert(key.to_owned(), data);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, BlobError> {
        Ok(self.blobs.get(key).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, key: &str) -> Result<bool, BlobError> {
        Ok(self.blobs.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete_round_trip() {
        let store = MemoryBlobStore::new();
        store
            .put("books/1/cover", Bytes::from_static(b"png"))
            .await
            .unwrap();
        assert_eq!(
            store.get("books/1/cover").await.unwrap(),
            Some(Bytes::from_static(b"png"))
        );
        assert!(store.delete("books/1/cover").await.unwrap());
        assert!(!store.delete("books/1/cover").await.unwrap());
        assert_eq!(store.get("books/1/cover").await.unwrap(), None);
    }

    #[tokio::test]
    async fn oversized_blob_is_rejected() {
        let store = MemoryBlobStore::new().with_max_size(4);
        let err = store
            .put("too-big", Bytes::from_static(b"12345"))
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::TooLarge { size: 5, limit: 4 }));
        assert!(store.is_empty());
    }
}
