//! crates/book_discovery_core/src/search.rs
//!
//! The hybrid search orchestrator: one `search()` over the search index,
//! the external catalog, and the local store, with read-through caching
//! and de-duplication. Also owns the suggestion fallback ladder.
//!
//! The index is a fast but possibly stale accelerator; the external
//! source is authoritative and complete. Every non-cached search fetches
//! from the source even when the index already returned a full page —
//! that is what keeps newly published records flowing into the store.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::cache::{self, CacheTtls};
use crate::domain::{
    BookDraft, Book, HybridSearchPage, IndexQuery, SourceLabel, SuggestionSource, Suggestions,
};
use crate::ports::{BookRepository, BookSourceService, ResponseCache, SearchIndexService};

/// How many consecutive `page_size` windows to pull from the external
/// source per search: the requested page plus one look-ahead window.
const SOURCE_WINDOWS: u32 = 2;

pub struct HybridSearch {
    index: Arc<dyn SearchIndexService>,
    source: Arc<dyn BookSourceService>,
    books: Arc<dyn BookRepository>,
    cache: Arc<dyn ResponseCache>,
    ttls: CacheTtls,
}

impl HybridSearch {
    pub fn new(
        index: Arc<dyn SearchIndexService>,
        source: Arc<dyn BookSourceService>,
        books: Arc<dyn BookRepository>,
        cache: Arc<dyn ResponseCache>,
        ttls: CacheTtls,
    ) -> Self {
        Self {
            index,
            source,
            books,
            cache,
            ttls,
        }
    }

    /// Runs one hybrid search. Never raises: every failure degrades to a
    /// smaller result set and a telling `source` label.
    pub async fn search(&self, query: &str, page: u32, page_size: u32) -> HybridSearchPage {
        let page = page.max(1);
        let page_size = page_size.max(1);

        let key = cache::search_key(query, page, page_size);
        if let Some(cached) =
            cache::get_json::<HybridSearchPage>(self.cache.as_ref(), &key).await
        {
            return cached;
        }

        // Step 1: the index, a non-fatal accelerator.
        let index_query = IndexQuery::new(query, page, page_size);
        let (index_hits, index_ok) = match self.index.query(&index_query).await {
            Ok(result) => (result.hits, true),
            Err(error) => {
                warn!(%query, %error, "search index query failed, continuing with the external source");
                (Vec::new(), false)
            }
        };

        // Step 2: the authoritative source, fetched unconditionally.
        let (source_items, source_total, source_ok) =
            self.fetch_source_windows(query, page, page_size).await;

        // Step 3: reconcile each discovered item against the local store.
        let mut ingested: Vec<Book> = Vec::new();
        let mut new_books: Vec<Book> = Vec::new();
        let mut seen_sources: HashSet<String> = HashSet::new();
        for draft in &source_items {
            if !seen_sources.insert(draft.source_id.clone()) {
                continue;
            }
            let existing = match self.books.get_by_source_id(&draft.source_id).await {
                Ok(existing) => existing,
                Err(error) => {
                    warn!(source_id = %draft.source_id, %error, "book store lookup failed, treating as absent");
                    None
                }
            };
            match existing {
                Some(book) => ingested.push(book),
                None => match self.books.upsert(draft).await {
                    Ok(book) => {
                        new_books.push(book.clone());
                        ingested.push(book);
                    }
                    Err(error) => {
                        warn!(source_id = %draft.source_id, %error, "failed to persist discovered book, dropping it from this page");
                    }
                },
            }
        }

        // Steps 4-5: batch-index the discoveries, then drop the stale
        // cached index query so a repeated identical search sees them.
        let new_books_indexed = if new_books.is_empty() {
            0
        } else {
            match self.index.upsert_batch(&new_books).await {
                Ok(count) => count,
                Err(error) => {
                    warn!(%query, %error, "failed to index newly discovered books");
                    0
                }
            }
        };
        if new_books_indexed > 0 {
            self.cache
                .invalidate(&cache::index_query_key(&index_query))
                .await;
            self.cache.invalidate_prefix("books:list").await;
        }

        // Step 6: merge, index hits first (already ranked), de-duplicated
        // on the external id. The index copy wins over the source copy.
        let now = Utc::now();
        let mut merged: Vec<Book> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for hit in index_hits {
            if seen.insert(hit.source_id.clone()) {
                merged.push(hit.into_book(now));
            }
        }
        for book in ingested {
            if seen.insert(book.source_id.clone()) {
                merged.push(book);
            }
        }
        let merged_count = merged.len() as u64;
        merged.truncate(page_size as usize);

        // Step 7: the source's total is an estimate and may undercount
        // relative to what was actually assembled.
        let total_count = source_total.max(merged_count);
        let total_pages = total_count.div_ceil(page_size as u64) as u32;

        let source = match (index_ok, source_ok) {
            (true, true) => SourceLabel::Hybrid,
            (true, false) => SourceLabel::IndexOnlyFallback,
            (false, true) => SourceLabel::ExternalOnlyFallback,
            (false, false) => SourceLabel::EmptyErrorFallback,
        };

        let response = HybridSearchPage {
            books: merged,
            total_count,
            page,
            total_pages,
            source,
            new_books_indexed,
        };

        // Don't memoize a total outage; recovery should be visible on the
        // next request.
        if source != SourceLabel::EmptyErrorFallback {
            cache::put_json(self.cache.as_ref(), &key, &response, self.ttls.search).await;
        }
        response
    }

    /// Pulls up to [`SOURCE_WINDOWS`] consecutive windows for the page.
    /// A failed first window marks the source down; a short window ends
    /// the scan early.
    async fn fetch_source_windows(
        &self,
        query: &str,
        page: u32,
        page_size: u32,
    ) -> (Vec<BookDraft>, u64, bool) {
        let start_index = (page - 1) * page_size;
        let mut items: Vec<BookDraft> = Vec::new();
        let mut total = 0u64;
        let mut ok = false;
        for window in 0..SOURCE_WINDOWS {
            let offset = start_index + window * page_size;
            match self.source.search(query, page_size, offset).await {
                Ok(result) => {
                    ok = true;
                    total = total.max(result.total_items);
                    let full_window = result.items.len() as u32 == page_size;
                    items.extend(result.items);
                    if !full_window {
                        break;
                    }
                }
                Err(error) => {
                    warn!(%query, offset, %error, "external source fetch failed");
                    break;
                }
            }
        }
        (items, total, ok)
    }

    /// Autocomplete with the live-source → index → local-store ladder.
    /// Short prefixes also populate a coarser, longer-lived cache entry
    /// to absorb single/double-character query storms.
    pub async fn suggest(&self, prefix: &str, limit: usize) -> Suggestions {
        let normalized = cache::normalize_query(prefix);
        let standard_key = cache::suggestions_key(&normalized, limit);
        if let Some(cached) =
            cache::get_json::<Suggestions>(self.cache.as_ref(), &standard_key).await
        {
            return cached;
        }
        let short_prefix = normalized.chars().count() <= cache::SHORT_PREFIX_LEN;
        if short_prefix {
            if let Some(cached) = cache::get_json::<Suggestions>(
                self.cache.as_ref(),
                &cache::suggestions_prefix_key(&normalized),
            )
            .await
            {
                return cached;
            }
        }

        let result = match self.source.get_suggestions(&normalized, limit).await {
            Ok(suggestions) => Suggestions {
                suggestions,
                source: SuggestionSource::LiveSource,
            },
            Err(source_error) => {
                warn!(prefix = %normalized, %source_error, "live suggestions failed, falling back to the search index");
                self.suggest_from_index(&normalized, limit).await
            }
        };

        cache::put_json(
            self.cache.as_ref(),
            &standard_key,
            &result,
            self.ttls.suggestions,
        )
        .await;
        if short_prefix {
            cache::put_json(
                self.cache.as_ref(),
                &cache::suggestions_prefix_key(&normalized),
                &result,
                self.ttls.suggestions_prefix,
            )
            .await;
        }
        result
    }

    async fn suggest_from_index(&self, prefix: &str, limit: usize) -> Suggestions {
        match self
            .index
            .query(&IndexQuery::new(prefix, 1, limit as u32))
            .await
        {
            Ok(page) => Suggestions {
                suggestions: page
                    .hits
                    .into_iter()
                    .map(|hit| hit.title)
                    .take(limit)
                    .collect(),
                source: SuggestionSource::SearchIndex,
            },
            Err(index_error) => {
                warn!(%prefix, %index_error, "index suggestions failed, falling back to the local store");
                let suggestions = match self.books.find_title_matches(prefix, limit).await {
                    Ok(titles) => titles,
                    Err(store_error) => {
                        warn!(%prefix, %store_error, "local suggestion lookup failed");
                        Vec::new()
                    }
                };
                Suggestions {
                    suggestions,
                    source: SuggestionSource::LocalStore,
                }
            }
        }
    }
}

/// Extracts unique titles and author names that case-insensitively
/// contain `prefix`, capped at `limit`. Raw item order is preserved,
/// each item's title ahead of its authors.
pub fn extract_suggestions(items: &[BookDraft], prefix: &str, limit: usize) -> Vec<String> {
    let needle = prefix.trim().to_lowercase();
    let mut suggestions: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for item in items {
        let mut candidates: Vec<&str> = Vec::with_capacity(1 + item.authors.len());
        candidates.push(item.title.as_str());
        candidates.extend(item.authors.iter().map(String::as_str));
        for candidate in candidates {
            if suggestions.len() >= limit {
                return suggestions;
            }
            let folded = candidate.to_lowercase();
            if folded.contains(&needle) && seen.insert(folded) {
                suggestions.push(candidate.to_string());
            }
        }
    }
    suggestions
}
