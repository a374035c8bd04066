use bytes::Bytes;
use tracing::warn;
use uuid::Uuid;

use librarium_blob::BlobStore;
use librarium_model::{BookFile, NewBookFile};

use crate::entity::BookFiles;
use crate::error::RepoError;
use crate::repository::Repository;

/// Sequences blob writes against the metadata rows that reference them.
///
/// The blob store is an independently concurrent resource outside the
/// relational transaction, so ordering is the only guarantee available:
/// a blob is written before the row naming it, and a row is removed before
/// its blob. A failed row write after a successful blob write triggers a
/// compensating blob delete so no orphan survives the unit of work.
pub struct FileService<B> {
    blob: B,
}

impl<B: BlobStore> FileService<B> {
    pub fn new(blob: B) -> Self {
        Self { blob }
    }

    pub fn blob(&self) -> &B {
        &self.blob
    }

    /// Store the bytes, then record the [`BookFile`] row inside `uow`.
    ///
    /// The input is validated up front so an invalid row never leaves a
    /// blob behind in the first place.
    pub async fn store<U>(
        &self,
        uow: &mut U,
        input: NewBookFile,
        data: Bytes,
    ) -> Result<BookFile, RepoError>
    where
        U: Repository<BookFiles> + Send,
    {
        input.validate()?;
        let key = input.storage_key.clone();
        self.blob.put(&key, data).await?;

        match Repository::<BookFiles>::create(uow, input).await {
            Ok(file) => Ok(file),
            Err(err) => {
                if let Err(blob_err) = self.blob.delete(&key).await {
                    warn!(%key, error = %blob_err, "could not remove blob after failed row write");
                }
                Err(err)
            }
        }
    }

    /// Fetch the bytes behind a recorded file.
    pub async fn fetch(&self, file: &BookFile) -> Result<Option<Bytes>, RepoError> {
        Ok(self.blob.get(&file.storage_key).await?)
    }

    /// Delete the metadata row inside `uow`, then the blob.
    ///
    /// Returns `false` when no such row exists. The blob delete happens
    /// after the row delete; if the unit of work is later rolled back the
    /// bytes are gone but the row returns, which the caller accepts by
    /// committing promptly after this call.
    pub async fn remove<U>(&self, uow: &mut U, id: Uuid) -> Result<bool, RepoError>
    where
        U: Repository<BookFiles> + Send,
    {
        let Some(file) = Repository::<BookFiles>::get_by_id(uow, id).await? else {
            return Ok(false);
        };
        Repository::<BookFiles>::delete(uow, id).await?;
        self.blob.delete(&file.storage_key).await?;
        Ok(true)
    }
}
