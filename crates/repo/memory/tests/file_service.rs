use bytes::Bytes;
use uuid::Uuid;

use librarium_blob::{BlobStore, MemoryBlobStore};
use librarium_model::{FileType, NewAuthor, NewBook, NewBookFile};
use librarium_repo::{
    Authors, BookFileRepository, BookFiles, Books, Catalogue, FileService, RepoError, Repository,
    UnitOfWork,
};
use librarium_repo_memory::MemoryCatalogue;

async fn seed_book(catalogue: &MemoryCatalogue) -> Uuid {
    let mut uow = catalogue.begin().await.unwrap();
    let author = Repository::<Authors>::create(
        &mut uow,
        NewAuthor {
            name: "Ursula K. Le Guin".to_owned(),
            bio: None,
        },
    )
    .await
    .unwrap();
    let book = Repository::<Books>::create(
        &mut uow,
        NewBook {
            title: "The Dispossessed".to_owned(),
            description: None,
            author_id: Some(author.id),
            genre_id: None,
            year: 1974,
            is_published: true,
        },
    )
    .await
    .unwrap();
    uow.commit().await.unwrap();
    book.id
}

fn cover_input(book_id: Uuid, key: &str) -> NewBookFile {
    NewBookFile {
        book_id,
        storage_key: key.to_owned(),
        file_type: FileType::Cover,
        original_name: "cover.png".to_owned(),
        size_bytes: 4,
        mime_type: "image/png".to_owned(),
    }
}

#[tokio::test]
async fn stored_file_round_trips_through_blob_and_row() {
    let catalogue = MemoryCatalogue::new();
    let book_id = seed_book(&catalogue).await;
    let files = FileService::new(MemoryBlobStore::new());

    let mut uow = catalogue.begin().await.unwrap();
    let file = files
        .store(
            &mut uow,
            cover_input(book_id, "covers/dispossessed.png"),
            Bytes::from_static(b"\x89PNG"),
        )
        .await
        .unwrap();
    uow.commit().await.unwrap();

    let fetched = files.fetch(&file).await.unwrap();
    assert_eq!(fetched, Some(Bytes::from_static(b"\x89PNG")));

    let mut uow = catalogue.begin().await.unwrap();
    let found = uow
        .get_by_storage_key("covers/dispossessed.png")
        .await
        .unwrap();
    assert_eq!(found.as_ref().map(|f| f.id), Some(file.id));
}

#[tokio::test]
async fn failed_row_write_removes_the_blob() {
    let catalogue = MemoryCatalogue::new();
    seed_book(&catalogue).await;
    let files = FileService::new(MemoryBlobStore::new());

    let mut uow = catalogue.begin().await.unwrap();
    let err = files
        .store(
            &mut uow,
            cover_input(Uuid::new_v4(), "covers/orphan.png"),
            Bytes::from_static(b"\x89PNG"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Constraint(_)));

    assert!(files.blob().get("covers/orphan.png").await.unwrap().is_none());
}

#[tokio::test]
async fn remove_deletes_row_then_blob_and_is_idempotent() {
    let catalogue = MemoryCatalogue::new();
    let book_id = seed_book(&catalogue).await;
    let files = FileService::new(MemoryBlobStore::new());

    let mut uow = catalogue.begin().await.unwrap();
    let file = files
        .store(
            &mut uow,
            cover_input(book_id, "pdf/dispossessed.pdf"),
            Bytes::from_static(b"%PDF"),
        )
        .await
        .unwrap();
    uow.commit().await.unwrap();

    let mut uow = catalogue.begin().await.unwrap();
    assert!(files.remove(&mut uow, file.id).await.unwrap());
    uow.commit().await.unwrap();

    assert!(files.blob().get("pdf/dispossessed.pdf").await.unwrap().is_none());

    let mut uow = catalogue.begin().await.unwrap();
    assert!(!files.remove(&mut uow, file.id).await.unwrap());
    let row = Repository::<BookFiles>::get_by_id(&mut uow, file.id)
        .await
        .unwrap();
    assert!(row.is_none());
}
