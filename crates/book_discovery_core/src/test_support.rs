//! crates/book_discovery_core/src/test_support.rs
//!
//! In-memory port implementations with call counters, shared by the
//! service unit tests. No database, network, or clock is involved.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{
    Book, BookDraft, BookSort, Favorite, FavoritedBook, IndexPage, IndexQuery, SortOrder,
    SourcePage,
};
use crate::ports::{
    BookRepository, BookSourceService, FavoriteRepository, PortError, PortResult, ResponseCache,
    SearchIndexService,
};

pub fn draft(source_id: &str, title: &str) -> BookDraft {
    BookDraft {
        source_id: source_id.to_string(),
        title: title.to_string(),
        ..Default::default()
    }
}

//=========================================================================================
// Book Store
//=========================================================================================

#[derive(Default)]
pub struct InMemoryBooks {
    rows: Mutex<HashMap<String, Book>>,
    next_id: AtomicI64,
    pub upsert_calls: AtomicUsize,
    pub fail_writes: AtomicBool,
}

impl InMemoryBooks {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Default::default()
        }
    }

    pub fn seed(&self, drafts: &[BookDraft]) -> Vec<Book> {
        drafts
            .iter()
            .map(|d| {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                let book = Book::from_draft(d, id, Utc::now());
                self.rows
                    .lock()
                    .unwrap()
                    .insert(book.source_id.clone(), book.clone());
                book
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl BookRepository for InMemoryBooks {
    async fn upsert(&self, draft: &BookDraft) -> PortResult<Book> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("book store write failed".into()));
        }
        let mut rows = self.rows.lock().unwrap();
        let now = Utc::now();
        let book = match rows.get(&draft.source_id) {
            Some(existing) => {
                let mut updated = Book::from_draft(draft, existing.id, now);
                updated.created_at = existing.created_at;
                updated
            }
            None => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                Book::from_draft(draft, id, now)
            }
        };
        rows.insert(book.source_id.clone(), book.clone());
        Ok(book)
    }

    async fn get_by_source_id(&self, source_id: &str) -> PortResult<Option<Book>> {
        Ok(self.rows.lock().unwrap().get(source_id).cloned())
    }

    async fn get_by_id(&self, id: i64) -> PortResult<Option<Book>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|b| b.id == id)
            .cloned())
    }

    async fn list(
        &self,
        page: u32,
        per_page: u32,
        sort: BookSort,
        order: SortOrder,
    ) -> PortResult<(Vec<Book>, u64)> {
        let mut books: Vec<Book> = self.rows.lock().unwrap().values().cloned().collect();
        books.sort_by(|a, b| {
            let ordering = match sort {
                BookSort::CreatedAt => a.created_at.cmp(&b.created_at),
                BookSort::Title => a.title.cmp(&b.title),
                BookSort::AverageRating => a
                    .average_rating
                    .partial_cmp(&b.average_rating)
                    .unwrap_or(std::cmp::Ordering::Equal),
            };
            match order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });
        let total = books.len() as u64;
        let start = ((page.max(1) - 1) * per_page) as usize;
        let page_rows = books.into_iter().skip(start).take(per_page as usize).collect();
        Ok((page_rows, total))
    }

    async fn delete(&self, id: i64) -> PortResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let source_id = rows
            .values()
            .find(|b| b.id == id)
            .map(|b| b.source_id.clone())
            .ok_or_else(|| PortError::NotFound(format!("Book {id} not found")))?;
        rows.remove(&source_id);
        Ok(())
    }

    async fn find_title_matches(&self, fragment: &str, limit: usize) -> PortResult<Vec<String>> {
        let needle = fragment.to_lowercase();
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|b| b.title.to_lowercase().contains(&needle))
            .map(|b| b.title.clone())
            .take(limit)
            .collect())
    }
}

//=========================================================================================
// External Source
//=========================================================================================

/// Replays a scripted queue of search responses; an exhausted queue
/// yields empty pages.
pub struct ScriptedSource {
    pub search_results: Mutex<VecDeque<Result<SourcePage, String>>>,
    pub search_calls: AtomicUsize,
    pub suggestion_result: Mutex<Result<Vec<String>, String>>,
    pub suggestion_calls: AtomicUsize,
    pub details: Mutex<HashMap<String, BookDraft>>,
    pub detail_calls: AtomicUsize,
    pub fail_detail: AtomicBool,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            search_results: Mutex::new(VecDeque::new()),
            search_calls: AtomicUsize::new(0),
            suggestion_result: Mutex::new(Ok(Vec::new())),
            suggestion_calls: AtomicUsize::new(0),
            details: Mutex::new(HashMap::new()),
            detail_calls: AtomicUsize::new(0),
            fail_detail: AtomicBool::new(false),
        }
    }

    pub fn push_page(&self, items: Vec<BookDraft>, total_items: u64) {
        self.search_results
            .lock()
            .unwrap()
            .push_back(Ok(SourcePage { items, total_items }));
    }

    pub fn push_failure(&self, message: &str) {
        self.search_results
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }
}

#[async_trait]
impl BookSourceService for ScriptedSource {
    async fn search(
        &self,
        _query: &str,
        _max_results: u32,
        _start_index: u32,
    ) -> PortResult<SourcePage> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        match self.search_results.lock().unwrap().pop_front() {
            Some(Ok(page)) => Ok(page),
            Some(Err(message)) => Err(PortError::Unavailable(message)),
            None => Ok(SourcePage::default()),
        }
    }

    async fn get_detail(&self, source_id: &str) -> PortResult<Option<BookDraft>> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_detail.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable("source detail failed".into()));
        }
        Ok(self.details.lock().unwrap().get(source_id).cloned())
    }

    async fn get_suggestions(&self, _prefix: &str, _limit: usize) -> PortResult<Vec<String>> {
        self.suggestion_calls.fetch_add(1, Ordering::SeqCst);
        match &*self.suggestion_result.lock().unwrap() {
            Ok(suggestions) => Ok(suggestions.clone()),
            Err(message) => Err(PortError::Unavailable(message.clone())),
        }
    }
}

//=========================================================================================
// Search Index
//=========================================================================================

pub struct ScriptedIndex {
    pub query_result: Mutex<Result<IndexPage, String>>,
    pub query_calls: AtomicUsize,
    pub upserted: Mutex<Vec<i64>>,
    pub batch_calls: AtomicUsize,
    pub deleted: Mutex<Vec<i64>>,
    pub fail_writes: AtomicBool,
}

impl ScriptedIndex {
    pub fn new() -> Self {
        Self {
            query_result: Mutex::new(Ok(IndexPage::default())),
            query_calls: AtomicUsize::new(0),
            upserted: Mutex::new(Vec::new()),
            batch_calls: AtomicUsize::new(0),
            deleted: Mutex::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn with_hits(hits: Vec<crate::domain::IndexedBook>) -> Self {
        let index = Self::new();
        let total_hits = hits.len() as u64;
        *index.query_result.lock().unwrap() = Ok(IndexPage {
            hits,
            total_hits,
            page: 1,
            total_pages: 1,
            ..Default::default()
        });
        index
    }

    pub fn fail_queries(message: &str) -> Self {
        let index = Self::new();
        *index.query_result.lock().unwrap() = Err(message.to_string());
        index
    }
}

#[async_trait]
impl SearchIndexService for ScriptedIndex {
    async fn configure(&self) -> PortResult<()> {
        Ok(())
    }

    async fn upsert(&self, book: &Book) -> PortResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable("index write failed".into()));
        }
        self.upserted.lock().unwrap().push(book.id);
        Ok(())
    }

    async fn upsert_batch(&self, books: &[Book]) -> PortResult<usize> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable("index write failed".into()));
        }
        self.upserted
            .lock()
            .unwrap()
            .extend(books.iter().map(|b| b.id));
        Ok(books.len())
    }

    async fn delete(&self, book_id: i64) -> PortResult<()> {
        self.deleted.lock().unwrap().push(book_id);
        Ok(())
    }

    async fn query(&self, _query: &IndexQuery) -> PortResult<IndexPage> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        match &*self.query_result.lock().unwrap() {
            Ok(page) => Ok(page.clone()),
            Err(message) => Err(PortError::Unavailable(message.clone())),
        }
    }

    async fn clear_all(&self) -> PortResult<()> {
        self.upserted.lock().unwrap().clear();
        Ok(())
    }
}

//=========================================================================================
// Response Cache
//=========================================================================================

/// Stores entries with their TTL but never expires them on its own, so
/// tests can assert on TTLs and simulate expiry deterministically.
#[derive(Default)]
pub struct RecordingCache {
    pub entries: Mutex<HashMap<String, (Value, Duration)>>,
}

impl RecordingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        self.entries.lock().unwrap().get(key).map(|(_, ttl)| *ttl)
    }

    /// Simulates TTL expiry of a single entry.
    pub fn expire(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl ResponseCache for RecordingCache {
    async fn get(&self, key: &str) -> Option<Value> {
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .map(|(value, _)| value.clone())
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value, ttl));
    }

    async fn invalidate(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }

    async fn invalidate_prefix(&self, prefix: &str) {
        self.entries
            .lock()
            .unwrap()
            .retain(|key, _| !key.starts_with(prefix));
    }

    async fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

//=========================================================================================
// Favorites and Users
//=========================================================================================

#[derive(Default)]
pub struct InMemoryFavorites {
    rows: Mutex<Vec<Favorite>>,
    books: Option<std::sync::Arc<InMemoryBooks>>,
}

impl InMemoryFavorites {
    /// Joins `list_for_user` against the given book store.
    pub fn with_books(books: std::sync::Arc<InMemoryBooks>) -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            books: Some(books),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl FavoriteRepository for InMemoryFavorites {
    async fn add(&self, user_id: Uuid, book_id: i64) -> PortResult<Favorite> {
        let mut rows = self.rows.lock().unwrap();
        if rows
            .iter()
            .any(|f| f.user_id == user_id && f.book_id == book_id)
        {
            return Err(PortError::Conflict(format!(
                "Book {book_id} is already a favorite"
            )));
        }
        let favorite = Favorite {
            user_id,
            book_id,
            created_at: Utc::now(),
        };
        rows.push(favorite.clone());
        Ok(favorite)
    }

    async fn remove(&self, user_id: Uuid, book_id: i64) -> PortResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|f| !(f.user_id == user_id && f.book_id == book_id));
        if rows.len() == before {
            return Err(PortError::NotFound(format!(
                "Book {book_id} is not a favorite"
            )));
        }
        Ok(())
    }

    async fn exists(&self, user_id: Uuid, book_id: i64) -> PortResult<bool> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .any(|f| f.user_id == user_id && f.book_id == book_id))
    }

    async fn list_for_user(&self, user_id: Uuid) -> PortResult<Vec<FavoritedBook>> {
        let favorites: Vec<Favorite> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect();
        let Some(books) = &self.books else {
            return Ok(Vec::new());
        };
        let mut joined = Vec::with_capacity(favorites.len());
        for favorite in favorites {
            if let Some(book) = books.get_by_id(favorite.book_id).await? {
                joined.push(FavoritedBook {
                    book,
                    favorited_at: favorite.created_at,
                });
            }
        }
        Ok(joined)
    }
}
