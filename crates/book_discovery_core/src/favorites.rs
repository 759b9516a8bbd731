//! crates/book_discovery_core/src/favorites.rs
//!
//! The favorites join between users and books. Add is strict (duplicate
//! is a conflict), toggle is idempotent by design. Toggle is plain
//! read-modify-write; a concurrent double toggle on the same pair is a
//! benign last-write-wins race, not a correctness problem.

use std::sync::Arc;

use uuid::Uuid;

use crate::cache;
use crate::domain::{Book, Favorite, FavoritedBook};
use crate::ports::{BookRepository, FavoriteRepository, PortError, PortResult, ResponseCache};

pub struct Favorites {
    favorites: Arc<dyn FavoriteRepository>,
    books: Arc<dyn BookRepository>,
    cache: Arc<dyn ResponseCache>,
}

impl Favorites {
    pub fn new(
        favorites: Arc<dyn FavoriteRepository>,
        books: Arc<dyn BookRepository>,
        cache: Arc<dyn ResponseCache>,
    ) -> Self {
        Self {
            favorites,
            books,
            cache,
        }
    }

    /// Adds a favorite. `Conflict` when the pair already exists — the
    /// strict counterpart to `toggle`.
    pub async fn add(&self, user_id: Uuid, book_id: i64) -> PortResult<Favorite> {
        let book = self.require_book(book_id).await?;
        let favorite = self.favorites.add(user_id, book_id).await?;
        self.evict_viewer_detail(&book.source_id, user_id).await;
        Ok(favorite)
    }

    /// Removes a favorite. `NotFound` when the pair wasn't there.
    pub async fn remove(&self, user_id: Uuid, book_id: i64) -> PortResult<()> {
        let book = self.require_book(book_id).await?;
        self.favorites.remove(user_id, book_id).await?;
        self.evict_viewer_detail(&book.source_id, user_id).await;
        Ok(())
    }

    /// Check existence, then insert or delete; returns the resulting
    /// favorited state.
    pub async fn toggle(&self, user_id: Uuid, book_id: i64) -> PortResult<bool> {
        let book = self.require_book(book_id).await?;
        let favorited = if self.favorites.exists(user_id, book_id).await? {
            self.favorites.remove(user_id, book_id).await?;
            false
        } else {
            self.favorites.add(user_id, book_id).await?;
            true
        };
        self.evict_viewer_detail(&book.source_id, user_id).await;
        Ok(favorited)
    }

    pub async fn list(&self, user_id: Uuid) -> PortResult<Vec<FavoritedBook>> {
        self.favorites.list_for_user(user_id).await
    }

    async fn require_book(&self, book_id: i64) -> PortResult<Book> {
        self.books
            .get_by_id(book_id)
            .await?
            .ok_or_else(|| PortError::NotFound(format!("Book {book_id} not found")))
    }

    /// The detail page embeds this viewer's favorite state, so their
    /// cached copy is stale the moment the join changes.
    async fn evict_viewer_detail(&self, source_id: &str, user_id: Uuid) {
        let key = cache::detail_key(source_id, Some(user_id));
        self.cache.invalidate(&key).await;
    }
}
