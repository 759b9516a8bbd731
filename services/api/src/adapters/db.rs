//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapters: the concrete implementations
//! of the `BookRepository`, `FavoriteRepository` and `UserRepository` ports
//! from the `core` crate. They handle all interactions with the PostgreSQL
//! database using `sqlx`.

use async_trait::async_trait;
use book_discovery_core::domain::{
    AuthSession, Book, BookDraft, BookSort, Favorite, FavoritedBook, SortOrder, User,
    UserCredentials,
};
use book_discovery_core::ports::{
    BookRepository, FavoriteRepository, PortError, PortResult, UserRepository,
};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A helper function to run database migrations at startup.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct BookRecord {
    id: i64,
    source_id: String,
    title: String,
    authors: Vec<String>,
    description: Option<String>,
    publisher: Option<String>,
    published_date: Option<String>,
    page_count: Option<i32>,
    categories: Vec<String>,
    language: Option<String>,
    isbn_10: Option<String>,
    isbn_13: Option<String>,
    thumbnail: Option<String>,
    small_thumbnail: Option<String>,
    average_rating: Option<f64>,
    ratings_count: Option<i32>,
    preview_link: Option<String>,
    info_link: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BookRecord {
    fn to_domain(self) -> Book {
        Book {
            id: self.id,
            source_id: self.source_id,
            title: self.title,
            authors: self.authors,
            description: self.description,
            publisher: self.publisher,
            published_date: self.published_date,
            page_count: self.page_count,
            categories: self.categories,
            language: self.language,
            isbn_10: self.isbn_10,
            isbn_13: self.isbn_13,
            thumbnail: self.thumbnail,
            small_thumbnail: self.small_thumbnail,
            average_rating: self.average_rating,
            ratings_count: self.ratings_count,
            preview_link: self.preview_link,
            info_link: self.info_link,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct FavoritedBookRecord {
    #[sqlx(flatten)]
    book: BookRecord,
    favorited_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
}

impl UserRecord {
    fn to_domain(self) -> User {
        User {
            user_id: self.id,
            email: Some(self.email),
        }
    }
}

#[derive(FromRow)]
struct UserCredentialsRecord {
    id: Uuid,
    email: String,
    hashed_password: String,
}

impl UserCredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.id,
            email: self.email,
            hashed_password: self.hashed_password,
        }
    }
}

//=========================================================================================
// `BookRepository` Adapter
//=========================================================================================

/// A database adapter that implements the `BookRepository` port.
#[derive(Clone)]
pub struct PgBookRepository {
    pool: PgPool,
}

impl PgBookRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const UPSERT_BOOK: &str = r#"
INSERT INTO books (
    source_id, title, authors, description, publisher, published_date,
    page_count, categories, language, isbn_10, isbn_13, thumbnail,
    small_thumbnail, average_rating, ratings_count, preview_link, info_link
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
ON CONFLICT (source_id) DO UPDATE SET
    title = EXCLUDED.title,
    authors = EXCLUDED.authors,
    description = EXCLUDED.description,
    publisher = EXCLUDED.publisher,
    published_date = EXCLUDED.published_date,
    page_count = EXCLUDED.page_count,
    categories = EXCLUDED.categories,
    language = EXCLUDED.language,
    isbn_10 = EXCLUDED.isbn_10,
    isbn_13 = EXCLUDED.isbn_13,
    thumbnail = EXCLUDED.thumbnail,
    small_thumbnail = EXCLUDED.small_thumbnail,
    average_rating = EXCLUDED.average_rating,
    ratings_count = EXCLUDED.ratings_count,
    preview_link = EXCLUDED.preview_link,
    info_link = EXCLUDED.info_link,
    updated_at = now()
RETURNING *
"#;

#[async_trait]
impl BookRepository for PgBookRepository {
    async fn upsert(&self, draft: &BookDraft) -> PortResult<Book> {
        let record = sqlx::query_as::<_, BookRecord>(UPSERT_BOOK)
            .bind(&draft.source_id)
            .bind(&draft.title)
            .bind(&draft.authors)
            .bind(&draft.description)
            .bind(&draft.publisher)
            .bind(&draft.published_date)
            .bind(draft.page_count)
            .bind(&draft.categories)
            .bind(&draft.language)
            .bind(&draft.isbn_10)
            .bind(&draft.isbn_13)
            .bind(&draft.thumbnail)
            .bind(&draft.small_thumbnail)
            .bind(draft.average_rating)
            .bind(draft.ratings_count)
            .bind(&draft.preview_link)
            .bind(&draft.info_link)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(record.to_domain())
    }

    async fn get_by_source_id(&self, source_id: &str) -> PortResult<Option<Book>> {
        let record =
            sqlx::query_as::<_, BookRecord>("SELECT * FROM books WHERE source_id = $1")
                .bind(source_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(record.map(BookRecord::to_domain))
    }

    async fn get_by_id(&self, id: i64) -> PortResult<Option<Book>> {
        let record = sqlx::query_as::<_, BookRecord>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(record.map(BookRecord::to_domain))
    }

    async fn list(
        &self,
        page: u32,
        per_page: u32,
        sort: BookSort,
        order: SortOrder,
    ) -> PortResult<(Vec<Book>, u64)> {
        // Sort column and direction come from closed enums, never from
        // raw user input, so interpolation is safe here.
        let column = sort.as_str();
        let direction = match order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        let sql = format!(
            "SELECT * FROM books ORDER BY {column} {direction} NULLS LAST, id ASC LIMIT $1 OFFSET $2"
        );

        let offset = (page.max(1) - 1) as i64 * per_page as i64;
        let records = sqlx::query_as::<_, BookRecord>(&sql)
            .bind(per_page as i64)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let books = records.into_iter().map(BookRecord::to_domain).collect();
        Ok((books, total as u64))
    }

    async fn delete(&self, id: i64) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Book {id} not found")));
        }
        Ok(())
    }

    async fn find_title_matches(&self, fragment: &str, limit: usize) -> PortResult<Vec<String>> {
        let titles = sqlx::query_scalar::<_, String>(
            "SELECT title FROM books WHERE title ILIKE $1 ORDER BY title ASC LIMIT $2",
        )
        .bind(format!("%{fragment}%"))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(titles)
    }
}

//=========================================================================================
// `FavoriteRepository` Adapter
//=========================================================================================

/// A database adapter that implements the `FavoriteRepository` port.
#[derive(Clone)]
pub struct PgFavoriteRepository {
    pool: PgPool,
}

impl PgFavoriteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FavoriteRepository for PgFavoriteRepository {
    async fn add(&self, user_id: Uuid, book_id: i64) -> PortResult<Favorite> {
        // ON CONFLICT DO NOTHING + RETURNING yields no row for an existing
        // pair, which is exactly the conflict signal.
        let created_at: Option<DateTime<Utc>> = sqlx::query_scalar(
            "INSERT INTO favorites (user_id, book_id) VALUES ($1, $2)
             ON CONFLICT (user_id, book_id) DO NOTHING
             RETURNING created_at",
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        match created_at {
            Some(created_at) => Ok(Favorite {
                user_id,
                book_id,
                created_at,
            }),
            None => Err(PortError::Conflict(format!(
                "Book {book_id} is already a favorite"
            ))),
        }
    }

    async fn remove(&self, user_id: Uuid, book_id: i64) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND book_id = $2")
            .bind(user_id)
            .bind(book_id)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Book {book_id} is not a favorite"
            )));
        }
        Ok(())
    }

    async fn exists(&self, user_id: Uuid, book_id: i64) -> PortResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM favorites WHERE user_id = $1 AND book_id = $2)",
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(exists)
    }

    async fn list_for_user(&self, user_id: Uuid) -> PortResult<Vec<FavoritedBook>> {
        let records = sqlx::query_as::<_, FavoritedBookRecord>(
            "SELECT b.*, f.created_at AS favorited_at
             FROM favorites f
             JOIN books b ON b.id = f.book_id
             WHERE f.user_id = $1
             ORDER BY f.created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(records
            .into_iter()
            .map(|r| FavoritedBook {
                book: r.book.to_domain(),
                favorited_at: r.favorited_at,
            })
            .collect())
    }
}

//=========================================================================================
// `UserRepository` Adapter
//=========================================================================================

/// A database adapter that implements the `UserRepository` port.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (id, email, hashed_password) VALUES ($1, $2, $3)
             RETURNING id, email",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                PortError::Conflict(format!("{email} is already registered"))
            }
            _ => PortError::Unexpected(e.to_string()),
        })?;
        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, UserCredentialsRecord>(
            "SELECT id, email, hashed_password FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("No account for {email}"))
            }
            _ => PortError::Unexpected(e.to_string()),
        })?;
        Ok(record.to_domain())
    }

    async fn create_auth_session(&self, session: &AuthSession) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO auth_sessions (token, user_id, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(&session.token)
        .bind(session.user_id)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }

    async fn validate_auth_session(&self, token: &str) -> PortResult<Uuid> {
        let user_id: Uuid = sqlx::query_scalar(
            "SELECT user_id FROM auth_sessions WHERE token = $1 AND expires_at > now()",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::Unauthorized,
            _ => PortError::Unexpected(e.to_string()),
        })?;
        Ok(user_id)
    }

    async fn delete_auth_session(&self, token: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }

    async fn delete_user(&self, user_id: Uuid) -> PortResult<()> {
        // Sessions and favorites go with the account via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {user_id} not found")));
        }
        Ok(())
    }
}
