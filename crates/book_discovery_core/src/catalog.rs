//! crates/book_discovery_core/src/catalog.rs
//!
//! Browse/detail reads over the local store, and the explicit write path
//! for book records. Every create/update/delete propagates to the search
//! index and evicts related cache entries; that propagation is
//! fire-and-forget — failures are logged, never block the primary write.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::cache::{self, CacheTtls};
use crate::domain::{Book, BookDetail, BookDraft, BookListing, BookSort, SortOrder};
use crate::ports::{
    BookRepository, BookSourceService, FavoriteRepository, PortError, PortResult, ResponseCache,
    SearchIndexService,
};

pub struct Catalog {
    books: Arc<dyn BookRepository>,
    favorites: Arc<dyn FavoriteRepository>,
    index: Arc<dyn SearchIndexService>,
    source: Arc<dyn BookSourceService>,
    cache: Arc<dyn ResponseCache>,
    ttls: CacheTtls,
}

impl Catalog {
    pub fn new(
        books: Arc<dyn BookRepository>,
        favorites: Arc<dyn FavoriteRepository>,
        index: Arc<dyn SearchIndexService>,
        source: Arc<dyn BookSourceService>,
        cache: Arc<dyn ResponseCache>,
        ttls: CacheTtls,
    ) -> Self {
        Self {
            books,
            favorites,
            index,
            source,
            cache,
            ttls,
        }
    }

    /// Cached browse listing. The second tuple element tells the caller
    /// whether the response came from the cache.
    pub async fn list(
        &self,
        page: u32,
        per_page: u32,
        sort: BookSort,
        order: SortOrder,
    ) -> PortResult<(BookListing, bool)> {
        let page = page.max(1);
        let per_page = per_page.max(1);
        let key = cache::listing_key(page, per_page, sort, order);
        if let Some(cached) = cache::get_json::<BookListing>(self.cache.as_ref(), &key).await {
            return Ok((cached, true));
        }

        let (books, total_count) = self.books.list(page, per_page, sort, order).await?;
        let listing = BookListing {
            books,
            total_count,
            page,
            per_page,
            total_pages: total_count.div_ceil(per_page as u64) as u32,
        };
        cache::put_json(self.cache.as_ref(), &key, &listing, self.ttls.listing).await;
        Ok((listing, false))
    }

    /// Detail lookup: local store first, then the external source with
    /// persist + index on a miss. `None` means absent everywhere.
    /// Cached per (book, viewer-or-guest) since the payload embeds the
    /// viewer's favorite state.
    pub async fn detail(&self, source_id: &str, viewer: Option<Uuid>) -> Option<BookDetail> {
        let key = cache::detail_key(source_id, viewer);
        if let Some(cached) = cache::get_json::<BookDetail>(self.cache.as_ref(), &key).await {
            return Some(cached);
        }

        let local = match self.books.get_by_source_id(source_id).await {
            Ok(found) => found,
            Err(error) => {
                warn!(%source_id, %error, "book store lookup failed, falling back to the external source");
                None
            }
        };

        let book = match local {
            Some(book) => book,
            None => {
                let draft = match self.source.get_detail(source_id).await {
                    Ok(Some(draft)) => draft,
                    Ok(None) => return None,
                    Err(error) => {
                        warn!(%source_id, %error, "external detail fetch failed");
                        return None;
                    }
                };
                self.ingest(&draft).await
            }
        };

        let is_favorite = match viewer {
            // A record that never made it into the store can't be joined.
            Some(user_id) if book.id != 0 => {
                match self.favorites.exists(user_id, book.id).await {
                    Ok(state) => Some(state),
                    Err(error) => {
                        warn!(%source_id, %error, "favorite lookup failed");
                        None
                    }
                }
            }
            Some(_) => Some(false),
            None => None,
        };

        let detail = BookDetail { book, is_favorite };
        cache::put_json(self.cache.as_ref(), &key, &detail, self.ttls.detail).await;
        Some(detail)
    }

    /// Persists a freshly fetched draft and propagates. On a store
    /// failure the unpersisted payload is still served: persistence is an
    /// optimization here, not the source of truth for this response.
    async fn ingest(&self, draft: &BookDraft) -> Book {
        match self.books.upsert(draft).await {
            Ok(book) => {
                if let Err(error) = self.index.upsert(&book).await {
                    warn!(source_id = %book.source_id, %error, "failed to index fetched book");
                }
                self.evict_book_caches(&book.source_id).await;
                book
            }
            Err(error) => {
                warn!(source_id = %draft.source_id, %error, "failed to persist fetched book, serving unpersisted payload");
                Book::from_draft(draft, 0, Utc::now())
            }
        }
    }

    /// Explicit administrative delete. The store cascades favorites; the
    /// index delete and cache eviction follow fire-and-forget.
    pub async fn delete(&self, book_id: i64) -> PortResult<()> {
        let book = self
            .books
            .get_by_id(book_id)
            .await?
            .ok_or_else(|| PortError::NotFound(format!("Book {book_id} not found")))?;
        self.books.delete(book_id).await?;
        if let Err(error) = self.index.delete(book_id).await {
            warn!(book_id, %error, "failed to delete book from the search index");
        }
        self.evict_book_caches(&book.source_id).await;
        Ok(())
    }

    /// Evicts every cached response that may embed this book.
    async fn evict_book_caches(&self, source_id: &str) {
        self.cache.invalidate_prefix("books:list").await;
        self.cache.invalidate_prefix("search:").await;
        self.cache.invalidate_prefix("suggest:").await;
        self.cache
            .invalidate_prefix(&cache::detail_prefix(source_id))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        draft, InMemoryBooks, InMemoryFavorites, RecordingCache, ScriptedIndex, ScriptedSource,
    };
    use std::sync::atomic::Ordering;

    struct Harness {
        catalog: Catalog,
        books: Arc<InMemoryBooks>,
        favorites: Arc<InMemoryFavorites>,
        index: Arc<ScriptedIndex>,
        source: Arc<ScriptedSource>,
        cache: Arc<RecordingCache>,
    }

    fn harness() -> Harness {
        let books = Arc::new(InMemoryBooks::new());
        let favorites = Arc::new(InMemoryFavorites::with_books(books.clone()));
        let index = Arc::new(ScriptedIndex::new());
        let source = Arc::new(ScriptedSource::new());
        let cache = Arc::new(RecordingCache::new());
        let catalog = Catalog::new(
            books.clone(),
            favorites.clone(),
            index.clone(),
            source.clone(),
            cache.clone(),
            CacheTtls::default(),
        );
        Harness {
            catalog,
            books,
            favorites,
            index,
            source,
            cache,
        }
    }

    #[tokio::test]
    async fn listing_is_cached_with_a_hit_flag() {
        let h = harness();
        h.books.seed(&[draft("a", "Alpha"), draft("b", "Beta")]);

        let (first, hit) = h
            .catalog
            .list(1, 20, BookSort::Title, SortOrder::Asc)
            .await
            .unwrap();
        assert!(!hit);
        assert_eq!(first.total_count, 2);
        assert_eq!(first.total_pages, 1);

        let (_, hit) = h
            .catalog
            .list(1, 20, BookSort::Title, SortOrder::Asc)
            .await
            .unwrap();
        assert!(hit);

        // A different sort order is a different key, so a fresh read.
        let (_, hit) = h
            .catalog
            .list(1, 20, BookSort::Title, SortOrder::Desc)
            .await
            .unwrap();
        assert!(!hit);
    }

    #[tokio::test]
    async fn detail_prefers_the_local_store() {
        let h = harness();
        h.books.seed(&[draft("local-1", "Local Book")]);

        let detail = h.catalog.detail("local-1", None).await.unwrap();
        assert_eq!(detail.book.title, "Local Book");
        assert_eq!(detail.is_favorite, None);
        assert_eq!(h.source.detail_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn detail_miss_fetches_persists_and_indexes() {
        let h = harness();
        h.source
            .details
            .lock()
            .unwrap()
            .insert("ext-1".to_string(), draft("ext-1", "Fetched Book"));

        let detail = h.catalog.detail("ext-1", None).await.unwrap();
        assert_eq!(detail.book.title, "Fetched Book");
        assert_eq!(h.books.len(), 1);
        assert_eq!(h.index.upserted.lock().unwrap().len(), 1);

        // Second read comes from the cache: no further source calls.
        let calls = h.source.detail_calls.load(Ordering::SeqCst);
        h.catalog.detail("ext-1", None).await.unwrap();
        assert_eq!(h.source.detail_calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn detail_absent_everywhere_is_none() {
        let h = harness();
        assert!(h.catalog.detail("ghost", None).await.is_none());

        h.source.fail_detail.store(true, Ordering::SeqCst);
        assert!(h.catalog.detail("ghost", None).await.is_none());
    }

    #[tokio::test]
    async fn detail_survives_a_store_write_failure() {
        let h = harness();
        h.books.fail_writes.store(true, Ordering::SeqCst);
        h.source
            .details
            .lock()
            .unwrap()
            .insert("ext-2".to_string(), draft("ext-2", "Unpersisted"));

        let detail = h.catalog.detail("ext-2", None).await.unwrap();
        assert_eq!(detail.book.title, "Unpersisted");
        assert_eq!(detail.book.id, 0);
        assert_eq!(h.books.len(), 0);
    }

    #[tokio::test]
    async fn detail_reports_the_viewers_favorite_state() {
        let h = harness();
        let seeded = h.books.seed(&[draft("fav-1", "Favorited")]);
        let viewer = Uuid::new_v4();
        h.favorites.add(viewer, seeded[0].id).await.unwrap();

        let detail = h.catalog.detail("fav-1", Some(viewer)).await.unwrap();
        assert_eq!(detail.is_favorite, Some(true));

        let other_viewer = Uuid::new_v4();
        let detail = h.catalog.detail("fav-1", Some(other_viewer)).await.unwrap();
        assert_eq!(detail.is_favorite, Some(false));
    }

    #[tokio::test]
    async fn delete_cascades_to_index_and_caches() {
        let h = harness();
        let seeded = h.books.seed(&[draft("gone-1", "Doomed")]);
        let (_, _) = h
            .catalog
            .list(1, 20, BookSort::Title, SortOrder::Asc)
            .await
            .unwrap();
        h.catalog.detail("gone-1", None).await.unwrap();
        assert!(h.cache.len() >= 2);

        h.catalog.delete(seeded[0].id).await.unwrap();

        assert_eq!(h.books.len(), 0);
        assert_eq!(h.index.deleted.lock().unwrap()[..], [seeded[0].id]);
        assert!(!h.cache.contains(&cache::detail_key("gone-1", None)));
        assert!(!h
            .cache
            .contains(&cache::listing_key(1, 20, BookSort::Title, SortOrder::Asc)));

        assert!(matches!(
            h.catalog.delete(seeded[0].id).await,
            Err(PortError::NotFound(_))
        ));
    }
}
