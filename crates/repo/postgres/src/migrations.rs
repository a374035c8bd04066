use sqlx::PgPool;

use crate::config::PostgresConfig;

/// Run database migrations, creating required tables if they do not exist.
///
/// Length bounds mirror the input validators, so a row that passes
/// validation always fits its columns. `book_history` deliberately carries
/// no foreign keys: the audit trail must outlive the rows it describes.
///
/// # Errors
///
/// Returns a [`sqlx::Error`] if any DDL statement fails.
pub async fn run_migrations(pool: &PgPool, config: &PostgresConfig) -> Result<(), sqlx::Error> {
    let tables = config.tables();
    let prefix = &config.table_prefix;

    let create_authors = format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id UUID PRIMARY KEY,
            name VARCHAR(100) NOT NULL UNIQUE,
            bio TEXT
        )",
        tables.authors
    );

    let create_genres = format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id UUID PRIMARY KEY,
            name VARCHAR(50) NOT NULL UNIQUE,
            description TEXT
        )",
        tables.genres
    );

    let create_books = format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id UUID PRIMARY KEY,
            title VARCHAR(200) NOT NULL,
            description TEXT,
            author_id UUID REFERENCES {} (id),
            genre_id UUID REFERENCES {} (id),
            year INTEGER NOT NULL,
            is_published BOOLEAN NOT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )",
        tables.books, tables.authors, tables.genres
    );

    let create_book_files = format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id UUID PRIMARY KEY,
            book_id UUID NOT NULL REFERENCES {} (id),
            storage_key VARCHAR(255) NOT NULL UNIQUE,
            file_type TEXT NOT NULL,
            original_name VARCHAR(100) NOT NULL,
            size_bytes BIGINT NOT NULL,
            mime_type VARCHAR(50) NOT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )",
        tables.book_files, tables.books
    );

    let create_users = format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id UUID PRIMARY KEY,
            username VARCHAR(50) NOT NULL UNIQUE,
            email VARCHAR(100) NOT NULL UNIQUE,
            hashed_password VARCHAR(255) NOT NULL,
            full_name VARCHAR(100),
            roles TEXT[] NOT NULL,
            is_active BOOLEAN NOT NULL
        )",
        tables.users
    );

    let create_history = format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id UUID PRIMARY KEY,
            book_id UUID NOT NULL,
            user_id UUID NOT NULL,
            action TEXT NOT NULL,
            changed_at TIMESTAMPTZ NOT NULL,
            old_values JSONB,
            new_values JSONB
        )",
        tables.book_history
    );

    let indexes = [
        format!(
            "CREATE INDEX IF NOT EXISTS {prefix}books_author_id_idx ON {} (author_id)",
            tables.books
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {prefix}books_genre_id_idx ON {} (genre_id)",
            tables.books
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {prefix}book_files_book_id_idx ON {} (book_id)",
            tables.book_files
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {prefix}book_history_book_id_idx ON {} (book_id)",
            tables.book_history
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {prefix}book_history_user_id_idx ON {} (user_id)",
            tables.book_history
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {prefix}book_history_changed_at_idx ON {} (changed_at)",
            tables.book_history
        ),
    ];

    sqlx::query(&create_authors).execute(pool).await?;
    sqlx::query(&create_genres).execute(pool).await?;
    sqlx::query(&create_books).execute(pool).await?;
    sqlx::query(&create_book_files).execute(pool).await?;
    sqlx::query(&create_users).execute(pool).await?;
    sqlx::query(&create_history).execute(pool).await?;
    for index in &indexes {
        sqlx::query(index).execute(pool).await?;
    }

    Ok(())
}
