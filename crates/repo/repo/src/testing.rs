//! Repository conformance test suite.
//!
//! Call [`run_repository_conformance_tests`] from a backend's test module
//! with a fresh catalogue instance. Every backend must pass the whole suite
//! so callers can swap backends without behavioral drift.

use uuid::Uuid;

use librarium_model::{
    AuthorFilter, AuthorPatch, BookFilter, HistoryAction, NewAuthor, NewBook, NewBookFile,
    NewHistoryEntry, NewUser, UserRole,
};
use librarium_model::{BookPatch, FileType};

use crate::entity::{Authors, BookFiles, Books, History, HistoryNoUpdate, Users};
use crate::error::RepoError;
use crate::query::Page;
use crate::repository::{
    AuthorRepository, BookFileRepository, Catalogue, HistoryRepository, Repository, UnitOfWork,
};

fn unique(prefix: &str) -> String {
    format!("{prefix} {}", Uuid::new_v4())
}

fn sample_book(title: String) -> NewBook {
    NewBook {
        title,
        description: Some("A desert planet, a noble house.".to_owned()),
        author_id: None,
        genre_id: None,
        year: 1965,
        is_published: true,
    }
}

fn sample_user() -> NewUser {
    NewUser {
        username: unique("reader"),
        email: format!("{}@example.com", Uuid::new_v4()),
        hashed_password: "argon2id$stub".to_owned(),
        full_name: None,
        roles: vec![UserRole::Editor],
        is_active: true,
    }
}

/// Run the full repository conformance test suite.
///
/// # Errors
///
/// Returns an error if any conformance test fails.
pub async fn run_repository_conformance_tests<C: Catalogue>(
    catalogue: &C,
) -> Result<(), RepoError> {
    test_author_round_trip(catalogue).await?;
    test_book_round_trip(catalogue).await?;
    test_user_round_trip(catalogue).await?;
    test_book_file_round_trip(catalogue).await?;
    test_partial_update_touches_only_named_fields(catalogue).await?;
    test_empty_patch_returns_current_row(catalogue).await?;
    test_update_of_absent_row_is_none(catalogue).await?;
    test_update_of_absent_row_ignores_conflicting_patch(catalogue).await?;
    test_idempotent_delete(catalogue).await?;
    test_unique_constraints(catalogue).await?;
    test_exists_without_materializing(catalogue).await?;
    test_substring_search_is_case_insensitive(catalogue).await?;
    test_pagination_is_deterministic(catalogue).await?;
    test_page_past_the_end_is_empty(catalogue).await?;
    test_unknown_order_by_is_rejected(catalogue).await?;
    test_history_is_append_only(catalogue).await?;
    test_rollback_discards_writes(catalogue).await?;
    Ok(())
}

async fn test_author_round_trip<C: Catalogue>(catalogue: &C) -> Result<(), RepoError> {
    let mut uow = catalogue.begin().await?;
    let input = NewAuthor {
        name: unique("Frank Herbert"),
        bio: Some("Science fiction novelist".to_owned()),
    };
    let created = Repository::<Authors>::create(&mut uow, input.clone()).await?;
    assert_eq!(created.name, input.name);
    assert_eq!(created.bio, input.bio);
    uow.commit().await?;

    let mut uow = catalogue.begin().await?;
    let fetched = Repository::<Authors>::get_by_id(&mut uow, created.id).await?;
    assert_eq!(fetched.as_ref(), Some(&created), "round trip must preserve every supplied field");

    let by_name = AuthorRepository::get_by_name(&mut uow, &created.name).await?;
    assert_eq!(by_name, Some(created));
    uow.rollback().await
}

async fn test_book_round_trip<C: Catalogue>(catalogue: &C) -> Result<(), RepoError> {
    let mut uow = catalogue.begin().await?;
    let input = sample_book(unique("Dune"));
    let created = Repository::<Books>::create(&mut uow, input.clone()).await?;
    assert_eq!(created.title, input.title);
    assert_eq!(created.description, input.description);
    assert_eq!(created.year, input.year);
    assert!(created.is_published);
    uow.commit().await?;

    let mut uow = catalogue.begin().await?;
    let fetched = Repository::<Books>::get_by_id(&mut uow, created.id).await?;
    assert_eq!(fetched, Some(created));
    uow.rollback().await
}

async fn test_user_round_trip<C: Catalogue>(catalogue: &C) -> Result<(), RepoError> {
    let mut uow = catalogue.begin().await?;
    let input = sample_user();
    let created = Repository::<Users>::create(&mut uow, input.clone()).await?;
    assert_eq!(created.username, input.username);
    assert_eq!(created.email, input.email);
    assert_eq!(created.roles, input.roles);
    uow.commit().await?;

    let mut uow = catalogue.begin().await?;
    let fetched = Repository::<Users>::get_by_id(&mut uow, created.id).await?;
    assert_eq!(fetched, Some(created));
    uow.rollback().await
}

async fn test_book_file_round_trip<C: Catalogue>(catalogue: &C) -> Result<(), RepoError> {
    let mut uow = catalogue.begin().await?;
    let book = Repository::<Books>::create(&mut uow, sample_book(unique("Dune"))).await?;
    let input = NewBookFile {
        book_id: book.id,
        storage_key: format!("books/{}/cover", book.id),
        file_type: FileType::Cover,
        original_name: "cover.png".to_owned(),
        size_bytes: 2048,
        mime_type: "image/png".to_owned(),
    };
    let created = Repository::<BookFiles>::create(&mut uow, input.clone()).await?;
    assert_eq!(created.storage_key, input.storage_key);
    uow.commit().await?;

    let mut uow = catalogue.begin().await?;
    let by_key = BookFileRepository::get_by_storage_key(&mut uow, &created.storage_key).await?;
    assert_eq!(by_key, Some(created.clone()));
    let by_book = BookFileRepository::get_by_book(&mut uow, book.id).await?;
    assert_eq!(by_book, vec![created]);
    uow.rollback().await
}

async fn test_partial_update_touches_only_named_fields<C: Catalogue>(
    catalogue: &C,
) -> Result<(), RepoError> {
    let mut uow = catalogue.begin().await?;
    let book = Repository::<Books>::create(&mut uow, sample_book(unique("Dune"))).await?;
    let patch = BookPatch {
        year: Some(1966),
        ..BookPatch::default()
    };
    let updated = Repository::<Books>::update(&mut uow, book.id, patch)
        .await?
        .expect("row exists");
    assert_eq!(updated.year, 1966);
    assert_eq!(updated.title, book.title);
    assert_eq!(updated.description, book.description);
    assert_eq!(updated.created_at, book.created_at, "created_at is immutable");
    uow.commit().await
}

async fn test_empty_patch_returns_current_row<C: Catalogue>(
    catalogue: &C,
) -> Result<(), RepoError> {
    let mut uow = catalogue.begin().await?;
    let book = Repository::<Books>::create(&mut uow, sample_book(unique("Dune"))).await?;
    let updated = Repository::<Books>::update(&mut uow, book.id, BookPatch::default()).await?;
    assert_eq!(updated, Some(book));
    uow.rollback().await
}

async fn test_update_of_absent_row_is_none<C: Catalogue>(catalogue: &C) -> Result<(), RepoError> {
    let mut uow = catalogue.begin().await?;
    let patch = BookPatch {
        year: Some(2000),
        ..BookPatch::default()
    };
    let updated = Repository::<Books>::update(&mut uow, Uuid::new_v4(), patch).await?;
    assert!(updated.is_none(), "updating an absent row is not an error");
    uow.rollback().await
}

async fn test_update_of_absent_row_ignores_conflicting_patch<C: Catalogue>(
    catalogue: &C,
) -> Result<(), RepoError> {
    let name = unique("Stanislaw Lem");
    let mut uow = catalogue.begin().await?;
    Repository::<Authors>::create(
        &mut uow,
        NewAuthor {
            name: name.clone(),
            bio: None,
        },
    )
    .await?;
    uow.commit().await?;

    // The absent id must win over the duplicate name the patch carries.
    let mut uow = catalogue.begin().await?;
    let patch = AuthorPatch {
        name: Some(name),
        ..AuthorPatch::default()
    };
    let updated = Repository::<Authors>::update(&mut uow, Uuid::new_v4(), patch).await?;
    assert!(updated.is_none(), "absent row yields None, not a constraint error");
    uow.rollback().await
}

async fn test_idempotent_delete<C: Catalogue>(catalogue: &C) -> Result<(), RepoError> {
    let mut uow = catalogue.begin().await?;
    let book = Repository::<Books>::create(&mut uow, sample_book(unique("Dune"))).await?;
    uow.commit().await?;

    let mut uow = catalogue.begin().await?;
    assert!(Repository::<Books>::delete(&mut uow, book.id).await?);
    assert!(Repository::<Books>::get_by_id(&mut uow, book.id).await?.is_none());
    assert!(!Repository::<Books>::delete(&mut uow, book.id).await?);
    assert!(Repository::<Books>::get_by_id(&mut uow, book.id).await?.is_none());
    uow.commit().await
}

async fn test_unique_constraints<C: Catalogue>(catalogue: &C) -> Result<(), RepoError> {
    let name = unique("Ursula K. Le Guin");
    let mut uow = catalogue.begin().await?;
    Repository::<Authors>::create(
        &mut uow,
        NewAuthor {
            name: name.clone(),
            bio: None,
        },
    )
    .await?;
    uow.commit().await?;

    let mut uow = catalogue.begin().await?;
    let err = Repository::<Authors>::create(
        &mut uow,
        NewAuthor {
            name,
            bio: None,
        },
    )
    .await
    .expect_err("duplicate author name must be rejected");
    assert!(matches!(err, RepoError::Constraint(_)), "got {err}");
    drop(uow);

    let mut uow = catalogue.begin().await?;
    let err = Repository::<Authors>::create(
        &mut uow,
        NewAuthor {
            name: String::new(),
            bio: None,
        },
    )
    .await
    .expect_err("empty required field must be rejected");
    assert!(matches!(err, RepoError::Constraint(_)), "got {err}");
    drop(uow);
    Ok(())
}

async fn test_exists_without_materializing<C: Catalogue>(catalogue: &C) -> Result<(), RepoError> {
    let name = unique("Octavia Butler");
    let mut uow = catalogue.begin().await?;
    Repository::<Authors>::create(
        &mut uow,
        NewAuthor {
            name: name.clone(),
            bio: None,
        },
    )
    .await?;

    let hit = AuthorFilter {
        name: Some(name),
        ..AuthorFilter::default()
    };
    assert!(Repository::<Authors>::exists(&mut uow, &hit).await?);

    let miss = AuthorFilter {
        name: Some(unique("nobody")),
        ..AuthorFilter::default()
    };
    assert!(!Repository::<Authors>::exists(&mut uow, &miss).await?);
    uow.rollback().await
}

async fn test_substring_search_is_case_insensitive<C: Catalogue>(
    catalogue: &C,
) -> Result<(), RepoError> {
    let marker = Uuid::new_v4().simple().to_string();
    let mut uow = catalogue.begin().await?;
    let author = Repository::<Authors>::create(
        &mut uow,
        NewAuthor {
            name: unique("Gene Wolfe"),
            bio: Some(format!("Collector of {marker} first editions")),
        },
    )
    .await?;

    let found = AuthorRepository::search_in_bio(&mut uow, &marker.to_uppercase()).await?;
    assert_eq!(found, vec![author]);
    uow.rollback().await
}

async fn test_pagination_is_deterministic<C: Catalogue>(catalogue: &C) -> Result<(), RepoError> {
    let marker = Uuid::new_v4().simple().to_string();
    let mut uow = catalogue.begin().await?;
    for year in [1971, 1965, 1984, 1969, 1977, 1990, 1982] {
        let mut book = sample_book(format!("{marker} {year}"));
        book.year = year;
        Repository::<Books>::create(&mut uow, book).await?;
    }

    let filter = BookFilter {
        title_contains: Some(marker),
        ..BookFilter::default()
    };
    let first = Repository::<Books>::list(
        &mut uow,
        &filter,
        &Page::new(3, 0).ordered_by("year"),
    )
    .await?;
    let second = Repository::<Books>::list(
        &mut uow,
        &filter,
        &Page::new(3, 3).ordered_by("year"),
    )
    .await?;
    let both = Repository::<Books>::list(
        &mut uow,
        &filter,
        &Page::new(6, 0).ordered_by("year"),
    )
    .await?;

    let paged: Vec<Uuid> = first.iter().chain(&second).map(|b| b.id).collect();
    let all: Vec<Uuid> = both.iter().map(|b| b.id).collect();
    assert_eq!(paged, all, "adjacent pages must concatenate to one larger page");

    let years: Vec<i32> = both.iter().map(|b| b.year).collect();
    assert_eq!(years, vec![1965, 1969, 1971, 1977, 1982, 1984]);
    uow.rollback().await
}

async fn test_page_past_the_end_is_empty<C: Catalogue>(catalogue: &C) -> Result<(), RepoError> {
    let mut uow = catalogue.begin().await?;
    let filter = BookFilter {
        title: Some(unique("unwritten")),
        ..BookFilter::default()
    };
    let rows = Repository::<Books>::list(&mut uow, &filter, &Page::new(50, 10_000)).await?;
    assert!(rows.is_empty(), "a window past the end is empty, not an error");
    uow.rollback().await
}

async fn test_unknown_order_by_is_rejected<C: Catalogue>(catalogue: &C) -> Result<(), RepoError> {
    let mut uow = catalogue.begin().await?;
    let page = Page::default().ordered_by("shoe_size");
    let err = Repository::<Books>::list(&mut uow, &BookFilter::default(), &page)
        .await
        .expect_err("unknown order_by must not silently fall back");
    assert!(matches!(err, RepoError::Validation(_)), "got {err}");
    drop(uow);
    Ok(())
}

async fn test_history_is_append_only<C: Catalogue>(catalogue: &C) -> Result<(), RepoError> {
    let mut uow = catalogue.begin().await?;
    let user = Repository::<Users>::create(&mut uow, sample_user()).await?;
    let book = Repository::<Books>::create(&mut uow, sample_book(unique("Dune"))).await?;

    let mut new_values = serde_json::Map::new();
    new_values.insert("title".to_owned(), book.title.clone().into());
    let entry = Repository::<History>::create(
        &mut uow,
        NewHistoryEntry {
            book_id: book.id,
            user_id: user.id,
            action: HistoryAction::Create,
            old_values: None,
            new_values: Some(new_values),
        },
    )
    .await?;

    let by_book = HistoryRepository::get_by_book(&mut uow, book.id).await?;
    assert_eq!(by_book.len(), 1);
    assert_eq!(by_book[0].id, entry.id);

    let err = Repository::<History>::update(&mut uow, entry.id, HistoryNoUpdate)
        .await
        .expect_err("history rows must never be updated");
    assert!(matches!(err, RepoError::Constraint(_)), "got {err}");

    let err = Repository::<History>::delete(&mut uow, entry.id)
        .await
        .expect_err("history rows must never be deleted");
    assert!(matches!(err, RepoError::Constraint(_)), "got {err}");
    drop(uow);
    Ok(())
}

async fn test_rollback_discards_writes<C: Catalogue>(catalogue: &C) -> Result<(), RepoError> {
    let name = unique("Roger Zelazny");
    let mut uow = catalogue.begin().await?;
    Repository::<Authors>::create(
        &mut uow,
        NewAuthor {
            name: name.clone(),
            bio: None,
        },
    )
    .await?;
    uow.rollback().await?;

    let mut uow = catalogue.begin().await?;
    let gone = AuthorRepository::get_by_name(&mut uow, &name).await?;
    assert!(gone.is_none(), "rolled-back writes must not be observable");
    uow.rollback().await
}
