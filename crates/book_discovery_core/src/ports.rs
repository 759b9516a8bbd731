//! crates/book_discovery_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{
    AuthSession, Book, BookDraft, BookSort, Favorite, FavoritedBook, IndexPage, IndexQuery,
    SortOrder, SourcePage, User, UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Persistence Ports (Traits)
//=========================================================================================

/// The local book store. Upsert is keyed on the external source id, so
/// concurrent writers never need a lock: last writer wins per record and
/// re-ingesting a known id updates in place, never duplicates.
#[async_trait]
pub trait BookRepository: Send + Sync {
    /// Insert-or-update keyed on `draft.source_id`, returning the stored row.
    async fn upsert(&self, draft: &BookDraft) -> PortResult<Book>;

    async fn get_by_source_id(&self, source_id: &str) -> PortResult<Option<Book>>;

    async fn get_by_id(&self, id: i64) -> PortResult<Option<Book>>;

    /// Paginated browse listing. Returns the page plus the total row count.
    async fn list(
        &self,
        page: u32,
        per_page: u32,
        sort: BookSort,
        order: SortOrder,
    ) -> PortResult<(Vec<Book>, u64)>;

    /// Explicit administrative delete; favorites cascade in the store.
    async fn delete(&self, id: i64) -> PortResult<()>;

    /// Case-insensitive title substring match, the last rung of the
    /// suggestion fallback ladder.
    async fn find_title_matches(&self, fragment: &str, limit: usize) -> PortResult<Vec<String>>;
}

#[async_trait]
pub trait FavoriteRepository: Send + Sync {
    /// Adds the (user, book) pair. `Conflict` when it already exists.
    async fn add(&self, user_id: Uuid, book_id: i64) -> PortResult<Favorite>;

    /// Removes the pair. `NotFound` when it wasn't there.
    async fn remove(&self, user_id: Uuid, book_id: i64) -> PortResult<()>;

    async fn exists(&self, user_id: Uuid, book_id: i64) -> PortResult<bool>;

    async fn list_for_user(&self, user_id: Uuid) -> PortResult<Vec<FavoritedBook>>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn create_auth_session(&self, session: &AuthSession) -> PortResult<()>;

    async fn validate_auth_session(&self, token: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, token: &str) -> PortResult<()>;

    /// Deletes the account and everything hanging off it. The one mutation
    /// that surfaces hard errors to the caller.
    async fn delete_user(&self, user_id: Uuid) -> PortResult<()>;
}

//=========================================================================================
// External Service Ports (Traits)
//=========================================================================================

/// The external book catalog, treated as authoritative for metadata.
///
/// Adapters surface transport and parse failures as `Unavailable` so the
/// orchestrator can label its fallback path; the "reads never hard-fail"
/// contract is enforced one layer up.
#[async_trait]
pub trait BookSourceService: Send + Sync {
    async fn search(
        &self,
        query: &str,
        max_results: u32,
        start_index: u32,
    ) -> PortResult<SourcePage>;

    /// `Ok(None)` when the source reports not-found.
    async fn get_detail(&self, source_id: &str) -> PortResult<Option<BookDraft>>;

    /// Narrow title/author search, capped at `limit` unique matches.
    async fn get_suggestions(&self, prefix: &str, limit: usize) -> PortResult<Vec<String>>;
}

/// The hosted search index: a fast but possibly stale accelerator in
/// front of the external catalog. Failures are logged by adapters and
/// re-raised, so callers know when the index is unusable.
#[async_trait]
pub trait SearchIndexService: Send + Sync {
    /// Idempotent settings push: searchable fields, facets, custom ranking.
    async fn configure(&self) -> PortResult<()>;

    async fn upsert(&self, book: &Book) -> PortResult<()>;

    /// Batch write; returns the number of records actually submitted.
    async fn upsert_batch(&self, books: &[Book]) -> PortResult<usize>;

    async fn delete(&self, book_id: i64) -> PortResult<()>;

    async fn query(&self, query: &IndexQuery) -> PortResult<IndexPage>;

    /// Administrative and destructive; confirmation is the controller's job.
    async fn clear_all(&self) -> PortResult<()>;
}

//=========================================================================================
// Response Cache Port
//=========================================================================================

/// Best-effort memoization with per-entry TTL. Every operation is
/// infallible: adapters swallow and log their own failures, a broken
/// cache degrades latency but never correctness.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// `None` if the key is unknown or its TTL elapsed.
    async fn get(&self, key: &str) -> Option<Value>;

    /// Overwrites any existing entry unconditionally.
    async fn set(&self, key: &str, value: Value, ttl: Duration);

    async fn invalidate(&self, key: &str);

    async fn invalidate_prefix(&self, prefix: &str);

    /// Drops everything. Administrative/test resets only.
    async fn clear(&self);
}
