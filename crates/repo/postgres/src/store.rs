use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use librarium_model::{
    Author, AuthorFilter, AuthorPatch, Book, BookFile, BookFileFilter, BookFilePatch, BookFilter,
    BookHistory, BookPatch, FileType, Genre, GenreFilter, GenrePatch, HistoryAction, HistoryFilter,
    NewAuthor, NewBook, NewBookFile, NewGenre, NewHistoryEntry, NewUser, User, UserFilter,
    UserPatch, UserRole,
};
use librarium_repo::{
    Authors, BookFiles, Books, Catalogue, Entity, Genres, History, HistoryNoUpdate, Page,
    Predicate, RepoError, Repository, ScalarValue, SortDirection, UnitOfWork, Users, compile,
};

use crate::config::{PostgresConfig, TableNames};
use crate::migrations;

/// Classify a database error into the repository taxonomy.
///
/// Constraint breaches surface as [`RepoError::Constraint`] so both
/// backends fail identically; serialization failures and deadlocks become
/// [`RepoError::Conflict`] and are safe to retry in a fresh unit of work.
fn map_sqlx(err: sqlx::Error) -> RepoError {
    if let sqlx::Error::Database(db) = &err {
        match db.kind() {
            sqlx::error::ErrorKind::UniqueViolation
            | sqlx::error::ErrorKind::ForeignKeyViolation
            | sqlx::error::ErrorKind::NotNullViolation
            | sqlx::error::ErrorKind::CheckViolation => {
                return RepoError::Constraint(db.message().to_owned());
            }
            _ => {}
        }
        if matches!(db.code().as_deref(), Some("40001" | "40P01")) {
            return RepoError::Conflict(db.message().to_owned());
        }
    }
    RepoError::Unavailable(err.to_string())
}

fn corrupt(what: &str, value: &str) -> RepoError {
    RepoError::Unavailable(format!("corrupt row: unknown {what} `{value}`"))
}

/// An owned bind value for a dynamically built statement.
enum SqlParam {
    Uuid(Uuid),
    OptUuid(Option<Uuid>),
    Text(String),
    OptText(Option<String>),
    Int4(i32),
    Int8(i64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    TextArray(Vec<String>),
    Json(Option<Value>),
}

impl From<ScalarValue> for SqlParam {
    fn from(value: ScalarValue) -> Self {
        match value {
            ScalarValue::Uuid(v) => Self::Uuid(v),
            ScalarValue::Text(v) => Self::Text(v),
            ScalarValue::Int(v) => Self::Int8(v),
            ScalarValue::Bool(v) => Self::Bool(v),
            ScalarValue::Timestamp(v) => Self::Timestamp(v),
        }
    }
}

/// Attach a parameter list to a query, query-as or query-scalar builder.
macro_rules! bind_params {
    ($query:expr, $params:expr) => {{
        let mut query = $query;
        for param in $params {
            query = match param {
                SqlParam::Uuid(v) => query.bind(v),
                SqlParam::OptUuid(v) => query.bind(v),
                SqlParam::Text(v) => query.bind(v),
                SqlParam::OptText(v) => query.bind(v),
                SqlParam::Int4(v) => query.bind(v),
                SqlParam::Int8(v) => query.bind(v),
                SqlParam::Bool(v) => query.bind(v),
                SqlParam::Timestamp(v) => query.bind(v),
                SqlParam::TextArray(v) => query.bind(v),
                SqlParam::Json(v) => query.bind(v),
            };
        }
        query
    }};
}

fn escape_like(needle: &str) -> String {
    needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Render compiled predicates as a WHERE clause with numbered binds.
///
/// Field names come from the compiler, never from the caller, so
/// interpolating them is safe; every value travels as a bind.
fn where_clause(predicates: &[Predicate]) -> (String, Vec<SqlParam>) {
    let mut conditions = Vec::new();
    let mut params: Vec<SqlParam> = Vec::new();
    for predicate in predicates {
        let idx = params.len() + 1;
        match predicate {
            Predicate::Eq { field, value } => {
                conditions.push(format!("{field} = ${idx}"));
                params.push(SqlParam::from(value.clone()));
            }
            Predicate::Contains { field, needle } => {
                conditions.push(format!("{field} ILIKE ${idx}"));
                params.push(SqlParam::Text(format!("%{}%", escape_like(needle))));
            }
            Predicate::Ge { field, value } => {
                conditions.push(format!("{field} >= ${idx}"));
                params.push(SqlParam::from(value.clone()));
            }
            Predicate::Le { field, value } => {
                conditions.push(format!("{field} <= ${idx}"));
                params.push(SqlParam::from(value.clone()));
            }
        }
    }
    let clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    (clause, params)
}

fn object(value: Option<Value>) -> Option<serde_json::Map<String, Value>> {
    match value {
        Some(Value::Object(map)) => Some(map),
        _ => None,
    }
}

#[derive(sqlx::FromRow)]
struct AuthorRow {
    id: Uuid,
    name: String,
    bio: Option<String>,
}

impl From<AuthorRow> for Author {
    fn from(row: AuthorRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            bio: row.bio,
        }
    }
}

#[derive(sqlx::FromRow)]
struct GenreRow {
    id: Uuid,
    name: String,
    description: Option<String>,
}

impl From<GenreRow> for Genre {
    fn from(row: GenreRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BookRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    author_id: Option<Uuid>,
    genre_id: Option<Uuid>,
    year: i32,
    is_published: bool,
    created_at: DateTime<Utc>,
}

impl From<BookRow> for Book {
    fn from(row: BookRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            author_id: row.author_id,
            genre_id: row.genre_id,
            year: row.year,
            is_published: row.is_published,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BookFileRow {
    id: Uuid,
    book_id: Uuid,
    storage_key: String,
    file_type: String,
    original_name: String,
    size_bytes: i64,
    mime_type: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<BookFileRow> for BookFile {
    type Error = RepoError;

    fn try_from(row: BookFileRow) -> Result<Self, RepoError> {
        let file_type =
            FileType::parse(&row.file_type).ok_or_else(|| corrupt("file_type", &row.file_type))?;
        Ok(Self {
            id: row.id,
            book_id: row.book_id,
            storage_key: row.storage_key,
            file_type,
            original_name: row.original_name,
            size_bytes: row.size_bytes,
            mime_type: row.mime_type,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    hashed_password: String,
    full_name: Option<String>,
    roles: Vec<String>,
    is_active: bool,
}

impl TryFrom<UserRow> for User {
    type Error = RepoError;

    fn try_from(row: UserRow) -> Result<Self, RepoError> {
        let roles = row
            .roles
            .iter()
            .map(|role| UserRole::parse(role).ok_or_else(|| corrupt("role", role)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            id: row.id,
            username: row.username,
            email: row.email,
            hashed_password: row.hashed_password,
            full_name: row.full_name,
            roles,
            is_active: row.is_active,
        })
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: Uuid,
    book_id: Uuid,
    user_id: Uuid,
    action: String,
    changed_at: DateTime<Utc>,
    old_values: Option<Value>,
    new_values: Option<Value>,
}

impl TryFrom<HistoryRow> for BookHistory {
    type Error = RepoError;

    fn try_from(row: HistoryRow) -> Result<Self, RepoError> {
        let action =
            HistoryAction::parse(&row.action).ok_or_else(|| corrupt("action", &row.action))?;
        Ok(Self {
            id: row.id,
            book_id: row.book_id,
            user_id: row.user_id,
            action,
            changed_at: row.changed_at,
            old_values: object(row.old_values),
            new_values: object(row.new_values),
        })
    }
}

/// PostgreSQL-backed [`Catalogue`] using `sqlx` runtime queries.
///
/// Uniqueness and referential invariants are enforced by the schema, not
/// by pre-flight reads; violations come back from the database and are
/// classified by [`map_sqlx`].
pub struct PgCatalogue {
    pool: PgPool,
    tables: Arc<TableNames>,
}

impl PgCatalogue {
    /// Connect to `PostgreSQL`, build the connection pool and run
    /// migrations.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::Unavailable`] if the pool cannot be created or
    /// migrations fail.
    pub async fn new(config: PostgresConfig) -> Result<Self, RepoError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .connect(&config.url)
            .await
            .map_err(|e| RepoError::Unavailable(e.to_string()))?;
        Self::from_pool(pool, config).await
    }

    /// Create a catalogue from an existing pool. Runs migrations on
    /// creation.
    pub async fn from_pool(pool: PgPool, config: PostgresConfig) -> Result<Self, RepoError> {
        migrations::run_migrations(&pool, &config)
            .await
            .map_err(map_sqlx)?;
        Ok(Self {
            pool,
            tables: Arc::new(config.tables()),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Catalogue for PgCatalogue {
    type Uow = PgUow;

    async fn begin(&self) -> Result<PgUow, RepoError> {
        let tx = self.pool.begin().await.map_err(map_sqlx)?;
        Ok(PgUow {
            tx,
            tables: Arc::clone(&self.tables),
        })
    }
}

/// One database transaction. Dropping it without committing rolls back.
pub struct PgUow {
    tx: Transaction<'static, Postgres>,
    tables: Arc<TableNames>,
}

#[async_trait]
impl UnitOfWork for PgUow {
    async fn commit(self) -> Result<(), RepoError> {
        self.tx.commit().await.map_err(map_sqlx)
    }

    async fn rollback(self) -> Result<(), RepoError> {
        self.tx.rollback().await.map_err(map_sqlx)
    }
}

impl PgUow {
    async fn insert_row<R>(&mut self, sql: &str, params: Vec<SqlParam>) -> Result<R, RepoError>
    where
        R: for<'r> sqlx::FromRow<'r, PgRow> + Send + Unpin,
    {
        bind_params!(sqlx::query_as::<_, R>(sql), params)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_sqlx)
    }

    async fn fetch_by_id<R>(&mut self, table: &str, id: Uuid) -> Result<Option<R>, RepoError>
    where
        R: for<'r> sqlx::FromRow<'r, PgRow> + Send + Unpin,
    {
        let sql = format!("SELECT * FROM {table} WHERE id = $1");
        sqlx::query_as::<_, R>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)
    }

    /// Apply a dynamic `SET` list. An empty patch degenerates to a plain
    /// read so callers still get the current row back.
    async fn update_row<R>(
        &mut self,
        table: &str,
        id: Uuid,
        sets: Vec<(&'static str, SqlParam)>,
    ) -> Result<Option<R>, RepoError>
    where
        R: for<'r> sqlx::FromRow<'r, PgRow> + Send + Unpin,
    {
        if sets.is_empty() {
            return self.fetch_by_id(table, id).await;
        }
        let (columns, params): (Vec<_>, Vec<_>) = sets.into_iter().unzip();
        let assignments = columns
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{column} = ${}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let id_idx = params.len() + 1;
        let sql = format!("UPDATE {table} SET {assignments} WHERE id = ${id_idx} RETURNING *");
        bind_params!(sqlx::query_as::<_, R>(&sql), params)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)
    }

    async fn delete_by_id(&mut self, table: &str, id: Uuid) -> Result<bool, RepoError> {
        let sql = format!("DELETE FROM {table} WHERE id = $1");
        let done = sqlx::query(&sql)
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        Ok(done.rows_affected() > 0)
    }

    async fn row_exists<E: Entity>(
        &mut self,
        table: &str,
        filter: &E::Filter,
    ) -> Result<bool, RepoError> {
        let query = compile::<E>(filter, &Page::single())?;
        let (clause, params) = where_clause(&query.predicates);
        let sql = format!("SELECT EXISTS (SELECT 1 FROM {table} {clause})");
        bind_params!(sqlx::query_scalar::<_, bool>(&sql), params)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_sqlx)
    }

    async fn fetch_page<E, R>(
        &mut self,
        table: &str,
        filter: &E::Filter,
        page: &Page,
    ) -> Result<Vec<R>, RepoError>
    where
        E: Entity,
        R: for<'r> sqlx::FromRow<'r, PgRow> + Send + Unpin,
    {
        let query = compile::<E>(filter, page)?;
        let (clause, params) = where_clause(&query.predicates);
        let direction = match query.direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        let limit_idx = params.len() + 1;
        let offset_idx = params.len() + 2;
        let sql = format!(
            "SELECT * FROM {table} {clause} ORDER BY {} {direction}, id ASC \
             LIMIT ${limit_idx} OFFSET ${offset_idx}",
            query.order_field
        );
        bind_params!(sqlx::query_as::<_, R>(&sql), params)
            .bind(i64::from(query.limit))
            .bind(i64::from(query.offset))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_sqlx)
    }
}

#[async_trait]
impl Repository<Authors> for PgUow {
    async fn create(&mut self, data: NewAuthor) -> Result<Author, RepoError> {
        data.validate()?;
        let tables = Arc::clone(&self.tables);
        let id = Uuid::new_v4();
        debug!(%id, entity = "author", "insert");
        let sql = format!(
            "INSERT INTO {} (id, name, bio) VALUES ($1, $2, $3) RETURNING *",
            tables.authors
        );
        let row: AuthorRow = self
            .insert_row(
                &sql,
                vec![
                    SqlParam::Uuid(id),
                    SqlParam::Text(data.name),
                    SqlParam::OptText(data.bio),
                ],
            )
            .await?;
        Ok(row.into())
    }

    async fn get_by_id(&mut self, id: Uuid) -> Result<Option<Author>, RepoError> {
        let tables = Arc::clone(&self.tables);
        Ok(self
            .fetch_by_id::<AuthorRow>(&tables.authors, id)
            .await?
            .map(Author::from))
    }

    async fn update(&mut self, id: Uuid, patch: AuthorPatch) -> Result<Option<Author>, RepoError> {
        patch.validate()?;
        let mut sets = Vec::new();
        if let Some(name) = patch.name {
            sets.push(("name", SqlParam::Text(name)));
        }
        if let Some(bio) = patch.bio {
            sets.push(("bio", SqlParam::OptText(Some(bio))));
        }
        let tables = Arc::clone(&self.tables);
        Ok(self
            .update_row::<AuthorRow>(&tables.authors, id, sets)
            .await?
            .map(Author::from))
    }

    async fn delete(&mut self, id: Uuid) -> Result<bool, RepoError> {
        let tables = Arc::clone(&self.tables);
        debug!(%id, entity = "author", "delete");
        self.delete_by_id(&tables.authors, id).await
    }

    async fn exists(&mut self, filter: &AuthorFilter) -> Result<bool, RepoError> {
        let tables = Arc::clone(&self.tables);
        self.row_exists::<Authors>(&tables.authors, filter).await
    }

    async fn list(
        &mut self,
        filter: &AuthorFilter,
        page: &Page,
    ) -> Result<Vec<Author>, RepoError> {
        let tables = Arc::clone(&self.tables);
        let rows = self
            .fetch_page::<Authors, AuthorRow>(&tables.authors, filter, page)
            .await?;
        Ok(rows.into_iter().map(Author::from).collect())
    }
}

#[async_trait]
impl Repository<Genres> for PgUow {
    async fn create(&mut self, data: NewGenre) -> Result<Genre, RepoError> {
        data.validate()?;
        let tables = Arc::clone(&self.tables);
        let id = Uuid::new_v4();
        debug!(%id, entity = "genre", "insert");
        let sql = format!(
            "INSERT INTO {} (id, name, description) VALUES ($1, $2, $3) RETURNING *",
            tables.genres
        );
        let row: GenreRow = self
            .insert_row(
                &sql,
                vec![
                    SqlParam::Uuid(id),
                    SqlParam::Text(data.name),
                    SqlParam::OptText(data.description),
                ],
            )
            .await?;
        Ok(row.into())
    }

    async fn get_by_id(&mut self, id: Uuid) -> Result<Option<Genre>, RepoError> {
        let tables = Arc::clone(&self.tables);
        Ok(self
            .fetch_by_id::<GenreRow>(&tables.genres, id)
            .await?
            .map(Genre::from))
    }

    async fn update(&mut self, id: Uuid, patch: GenrePatch) -> Result<Option<Genre>, RepoError> {
        patch.validate()?;
        let mut sets = Vec::new();
        if let Some(name) = patch.name {
            sets.push(("name", SqlParam::Text(name)));
        }
        if let Some(description) = patch.description {
            sets.push(("description", SqlParam::OptText(Some(description))));
        }
        let tables = Arc::clone(&self.tables);
        Ok(self
            .update_row::<GenreRow>(&tables.genres, id, sets)
            .await?
            .map(Genre::from))
    }

    async fn delete(&mut self, id: Uuid) -> Result<bool, RepoError> {
        let tables = Arc::clone(&self.tables);
        debug!(%id, entity = "genre", "delete");
        self.delete_by_id(&tables.genres, id).await
    }

    async fn exists(&mut self, filter: &GenreFilter) -> Result<bool, RepoError> {
        let tables = Arc::clone(&self.tables);
        self.row_exists::<Genres>(&tables.genres, filter).await
    }

    async fn list(&mut self, filter: &GenreFilter, page: &Page) -> Result<Vec<Genre>, RepoError> {
        let tables = Arc::clone(&self.tables);
        let rows = self
            .fetch_page::<Genres, GenreRow>(&tables.genres, filter, page)
            .await?;
        Ok(rows.into_iter().map(Genre::from).collect())
    }
}

#[async_trait]
impl Repository<Books> for PgUow {
    async fn create(&mut self, data: NewBook) -> Result<Book, RepoError> {
        data.validate()?;
        let tables = Arc::clone(&self.tables);
        let id = Uuid::new_v4();
        debug!(%id, entity = "book", "insert");
        let sql = format!(
            "INSERT INTO {} (id, title, description, author_id, genre_id, year, is_published, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, clock_timestamp()) RETURNING *",
            tables.books
        );
        let row: BookRow = self
            .insert_row(
                &sql,
                vec![
                    SqlParam::Uuid(id),
                    SqlParam::Text(data.title),
                    SqlParam::OptText(data.description),
                    SqlParam::OptUuid(data.author_id),
                    SqlParam::OptUuid(data.genre_id),
                    SqlParam::Int4(data.year),
                    SqlParam::Bool(data.is_published),
                ],
            )
            .await?;
        Ok(row.into())
    }

    async fn get_by_id(&mut self, id: Uuid) -> Result<Option<Book>, RepoError> {
        let tables = Arc::clone(&self.tables);
        Ok(self
            .fetch_by_id::<BookRow>(&tables.books, id)
            .await?
            .map(Book::from))
    }

    async fn update(&mut self, id: Uuid, patch: BookPatch) -> Result<Option<Book>, RepoError> {
        patch.validate()?;
        let mut sets = Vec::new();
        if let Some(title) = patch.title {
            sets.push(("title", SqlParam::Text(title)));
        }
        if let Some(description) = patch.description {
            sets.push(("description", SqlParam::OptText(Some(description))));
        }
        if let Some(author_id) = patch.author_id {
            sets.push(("author_id", SqlParam::OptUuid(Some(author_id))));
        }
        if let Some(genre_id) = patch.genre_id {
            sets.push(("genre_id", SqlParam::OptUuid(Some(genre_id))));
        }
        if let Some(year) = patch.year {
            sets.push(("year", SqlParam::Int4(year)));
        }
        if let Some(is_published) = patch.is_published {
            sets.push(("is_published", SqlParam::Bool(is_published)));
        }
        let tables = Arc::clone(&self.tables);
        Ok(self
            .update_row::<BookRow>(&tables.books, id, sets)
            .await?
            .map(Book::from))
    }

    async fn delete(&mut self, id: Uuid) -> Result<bool, RepoError> {
        let tables = Arc::clone(&self.tables);
        debug!(%id, entity = "book", "delete");
        self.delete_by_id(&tables.books, id).await
    }

    async fn exists(&mut self, filter: &BookFilter) -> Result<bool, RepoError> {
        let tables = Arc::clone(&self.tables);
        self.row_exists::<Books>(&tables.books, filter).await
    }

    async fn list(&mut self, filter: &BookFilter, page: &Page) -> Result<Vec<Book>, RepoError> {
        let tables = Arc::clone(&self.tables);
        let rows = self
            .fetch_page::<Books, BookRow>(&tables.books, filter, page)
            .await?;
        Ok(rows.into_iter().map(Book::from).collect())
    }
}

#[async_trait]
impl Repository<BookFiles> for PgUow {
    async fn create(&mut self, data: NewBookFile) -> Result<BookFile, RepoError> {
        data.validate()?;
        let tables = Arc::clone(&self.tables);
        let id = Uuid::new_v4();
        debug!(%id, entity = "book_file", "insert");
        let sql = format!(
            "INSERT INTO {} (id, book_id, storage_key, file_type, original_name, size_bytes, mime_type, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, clock_timestamp()) RETURNING *",
            tables.book_files
        );
        let row: BookFileRow = self
            .insert_row(
                &sql,
                vec![
                    SqlParam::Uuid(id),
                    SqlParam::Uuid(data.book_id),
                    SqlParam::Text(data.storage_key),
                    SqlParam::Text(data.file_type.as_str().to_owned()),
                    SqlParam::Text(data.original_name),
                    SqlParam::Int8(data.size_bytes),
                    SqlParam::Text(data.mime_type),
                ],
            )
            .await?;
        row.try_into()
    }

    async fn get_by_id(&mut self, id: Uuid) -> Result<Option<BookFile>, RepoError> {
        let tables = Arc::clone(&self.tables);
        self.fetch_by_id::<BookFileRow>(&tables.book_files, id)
            .await?
            .map(TryInto::try_into)
            .transpose()
    }

    async fn update(
        &mut self,
        id: Uuid,
        patch: BookFilePatch,
    ) -> Result<Option<BookFile>, RepoError> {
        patch.validate()?;
        let mut sets = Vec::new();
        if let Some(original_name) = patch.original_name {
            sets.push(("original_name", SqlParam::Text(original_name)));
        }
        if let Some(mime_type) = patch.mime_type {
            sets.push(("mime_type", SqlParam::Text(mime_type)));
        }
        let tables = Arc::clone(&self.tables);
        self.update_row::<BookFileRow>(&tables.book_files, id, sets)
            .await?
            .map(TryInto::try_into)
            .transpose()
    }

    async fn delete(&mut self, id: Uuid) -> Result<bool, RepoError> {
        let tables = Arc::clone(&self.tables);
        debug!(%id, entity = "book_file", "delete");
        self.delete_by_id(&tables.book_files, id).await
    }

    async fn exists(&mut self, filter: &BookFileFilter) -> Result<bool, RepoError> {
        let tables = Arc::clone(&self.tables);
        self.row_exists::<BookFiles>(&tables.book_files, filter)
            .await
    }

    async fn list(
        &mut self,
        filter: &BookFileFilter,
        page: &Page,
    ) -> Result<Vec<BookFile>, RepoError> {
        let tables = Arc::clone(&self.tables);
        let rows = self
            .fetch_page::<BookFiles, BookFileRow>(&tables.book_files, filter, page)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[async_trait]
impl Repository<Users> for PgUow {
    async fn create(&mut self, data: NewUser) -> Result<User, RepoError> {
        data.validate()?;
        let tables = Arc::clone(&self.tables);
        let id = Uuid::new_v4();
        debug!(%id, entity = "user", "insert");
        let roles = data
            .roles
            .iter()
            .map(|role| role.as_str().to_owned())
            .collect();
        let sql = format!(
            "INSERT INTO {} (id, username, email, hashed_password, full_name, roles, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
            tables.users
        );
        let row: UserRow = self
            .insert_row(
                &sql,
                vec![
                    SqlParam::Uuid(id),
                    SqlParam::Text(data.username),
                    SqlParam::Text(data.email),
                    SqlParam::Text(data.hashed_password),
                    SqlParam::OptText(data.full_name),
                    SqlParam::TextArray(roles),
                    SqlParam::Bool(data.is_active),
                ],
            )
            .await?;
        row.try_into()
    }

    async fn get_by_id(&mut self, id: Uuid) -> Result<Option<User>, RepoError> {
        let tables = Arc::clone(&self.tables);
        self.fetch_by_id::<UserRow>(&tables.users, id)
            .await?
            .map(TryInto::try_into)
            .transpose()
    }

    async fn update(&mut self, id: Uuid, patch: UserPatch) -> Result<Option<User>, RepoError> {
        patch.validate()?;
        let mut sets = Vec::new();
        if let Some(username) = patch.username {
            sets.push(("username", SqlParam::Text(username)));
        }
        if let Some(email) = patch.email {
            sets.push(("email", SqlParam::Text(email)));
        }
        if let Some(hashed_password) = patch.hashed_password {
            sets.push(("hashed_password", SqlParam::Text(hashed_password)));
        }
        if let Some(full_name) = patch.full_name {
            sets.push(("full_name", SqlParam::OptText(Some(full_name))));
        }
        if let Some(roles) = patch.roles {
            let roles = roles.iter().map(|role| role.as_str().to_owned()).collect();
            sets.push(("roles", SqlParam::TextArray(roles)));
        }
        if let Some(is_active) = patch.is_active {
            sets.push(("is_active", SqlParam::Bool(is_active)));
        }
        let tables = Arc::clone(&self.tables);
        self.update_row::<UserRow>(&tables.users, id, sets)
            .await?
            .map(TryInto::try_into)
            .transpose()
    }

    async fn delete(&mut self, id: Uuid) -> Result<bool, RepoError> {
        let tables = Arc::clone(&self.tables);
        debug!(%id, entity = "user", "delete");
        self.delete_by_id(&tables.users, id).await
    }

    async fn exists(&mut self, filter: &UserFilter) -> Result<bool, RepoError> {
        let tables = Arc::clone(&self.tables);
        self.row_exists::<Users>(&tables.users, filter).await
    }

    async fn list(&mut self, filter: &UserFilter, page: &Page) -> Result<Vec<User>, RepoError> {
        let tables = Arc::clone(&self.tables);
        let rows = self
            .fetch_page::<Users, UserRow>(&tables.users, filter, page)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[async_trait]
impl Repository<History> for PgUow {
    async fn create(&mut self, data: NewHistoryEntry) -> Result<BookHistory, RepoError> {
        let tables = Arc::clone(&self.tables);
        let id = Uuid::new_v4();
        debug!(%id, entity = "book_history", action = data.action.as_str(), "append");
        let sql = format!(
            "INSERT INTO {} (id, book_id, user_id, action, changed_at, old_values, new_values) \
             VALUES ($1, $2, $3, $4, clock_timestamp(), $5, $6) RETURNING *",
            tables.book_history
        );
        let row: HistoryRow = self
            .insert_row(
                &sql,
                vec![
                    SqlParam::Uuid(id),
                    SqlParam::Uuid(data.book_id),
                    SqlParam::Uuid(data.user_id),
                    SqlParam::Text(data.action.as_str().to_owned()),
                    SqlParam::Json(data.old_values.map(Value::Object)),
                    SqlParam::Json(data.new_values.map(Value::Object)),
                ],
            )
            .await?;
        row.try_into()
    }

    async fn get_by_id(&mut self, id: Uuid) -> Result<Option<BookHistory>, RepoError> {
        let tables = Arc::clone(&self.tables);
        self.fetch_by_id::<HistoryRow>(&tables.book_history, id)
            .await?
            .map(TryInto::try_into)
            .transpose()
    }

    async fn update(
        &mut self,
        _id: Uuid,
        _patch: HistoryNoUpdate,
    ) -> Result<Option<BookHistory>, RepoError> {
        Err(RepoError::Constraint("book_history is append-only".to_owned()))
    }

    async fn delete(&mut self, _id: Uuid) -> Result<bool, RepoError> {
        Err(RepoError::Constraint("book_history is append-only".to_owned()))
    }

    async fn exists(&mut self, filter: &HistoryFilter) -> Result<bool, RepoError> {
        let tables = Arc::clone(&self.tables);
        self.row_exists::<History>(&tables.book_history, filter)
            .await
    }

    async fn list(
        &mut self,
        filter: &HistoryFilter,
        page: &Page,
    ) -> Result<Vec<BookHistory>, RepoError> {
        let tables = Arc::clone(&self.tables);
        let rows = self
            .fetch_page::<History, HistoryRow>(&tables.book_history, filter, page)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[cfg(all(test, feature = "integration"))]
mod integration {
    use super::*;

    async fn scratch_catalogue() -> PgCatalogue {
        let url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must point at a scratch database");
        let config = PostgresConfig {
            url,
            table_prefix: format!("conf_{}_", Uuid::new_v4().simple()),
            ..PostgresConfig::default()
        };
        PgCatalogue::new(config).await.expect("connect")
    }

    #[tokio::test]
    async fn catalogue_conformance() {
        let catalogue = scratch_catalogue().await;
        librarium_repo::testing::run_repository_conformance_tests(&catalogue)
            .await
            .expect("conformance tests should pass");
    }

    #[tokio::test]
    async fn deleting_a_referenced_author_is_rejected() {
        let catalogue = scratch_catalogue().await;
        let mut uow = catalogue.begin().await.unwrap();
        let author = Repository::<Authors>::create(
            &mut uow,
            NewAuthor {
                name: "Gene Wolfe".to_owned(),
                bio: None,
            },
        )
        .await
        .unwrap();
        Repository::<Books>::create(
            &mut uow,
            NewBook {
                title: "The Shadow of the Torturer".to_owned(),
                description: None,
                author_id: Some(author.id),
                genre_id: None,
                year: 1980,
                is_published: true,
            },
        )
        .await
        .unwrap();

        let err = Repository::<Authors>::delete(&mut uow, author.id)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Constraint(_)));
    }
}
