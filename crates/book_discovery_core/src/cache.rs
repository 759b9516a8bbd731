//! crates/book_discovery_core/src/cache.rs
//!
//! Deterministic cache-key construction and the TTL policy table.
//!
//! Keys are a pure function of the operation name plus a normalization of
//! every input parameter, so semantically identical requests always
//! collide and distinct requests never do. Free-text queries are trimmed,
//! case-folded and whitespace-collapsed; filter maps are iterated in
//! their stable `BTreeMap` order; pagination parameters are always
//! explicit in the key.

use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::domain::{BookSort, IndexQuery, SortOrder};
use crate::ports::ResponseCache;

//=========================================================================================
// TTL Policy
//=========================================================================================

/// Time-to-live per operation class. Each field is independently
/// configurable; the defaults follow the product policy table.
#[derive(Debug, Clone)]
pub struct CacheTtls {
    /// Full-text hybrid search results.
    pub search: Duration,
    /// Autocomplete suggestions.
    pub suggestions: Duration,
    /// Coarse entry for very short prefixes (length <= 2), absorbing
    /// single/double-character query storms.
    pub suggestions_prefix: Duration,
    /// Single-book detail pages.
    pub detail: Duration,
    /// Paginated browse listing.
    pub listing: Duration,
    /// Raw search-index query results.
    pub index_query: Duration,
    /// Raw external-source search responses.
    pub source_search: Duration,
    /// Raw external-source detail responses.
    pub source_detail: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            search: Duration::from_secs(5 * 60),
            suggestions: Duration::from_secs(15 * 60),
            suggestions_prefix: Duration::from_secs(30 * 60),
            detail: Duration::from_secs(30 * 60),
            listing: Duration::from_secs(5 * 60),
            index_query: Duration::from_secs(2 * 60),
            source_search: Duration::from_secs(60 * 60),
            source_detail: Duration::from_secs(2 * 60 * 60),
        }
    }
}

/// Length at or below which a suggestion query also gets the coarse
/// prefix cache entry.
pub const SHORT_PREFIX_LEN: usize = 2;

//=========================================================================================
// Key Construction
//=========================================================================================

/// Normalizes a free-text query: trim, case-fold, collapse runs of
/// whitespace to single spaces.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn search_key(query: &str, page: u32, page_size: u32) -> String {
    format!(
        "search:q={}:page={}:size={}",
        normalize_query(query),
        page,
        page_size
    )
}

pub fn suggestions_key(prefix: &str, limit: usize) -> String {
    format!("suggest:q={}:limit={}", normalize_query(prefix), limit)
}

/// The coarser key short prefixes are additionally cached under. No
/// limit component: any limit may be served from it.
pub fn suggestions_prefix_key(prefix: &str) -> String {
    format!("suggest:prefix:{}", normalize_query(prefix))
}

pub fn detail_key(source_id: &str, viewer: Option<Uuid>) -> String {
    match viewer {
        Some(user_id) => format!("detail:{source_id}:viewer={user_id}"),
        None => format!("detail:{source_id}:guest"),
    }
}

/// Prefix covering every viewer's cached copy of one book's detail page.
pub fn detail_prefix(source_id: &str) -> String {
    format!("detail:{source_id}:")
}

pub fn listing_key(page: u32, per_page: u32, sort: BookSort, order: SortOrder) -> String {
    format!(
        "books:list:page={}:per={}:sort={}:order={}",
        page,
        per_page,
        sort.as_str(),
        order.as_str()
    )
}

pub fn index_query_key(query: &IndexQuery) -> String {
    let mut key = format!(
        "index:q={}:page={}:size={}",
        normalize_query(&query.text),
        query.page,
        query.page_size
    );
    for (facet, value) in &query.facet_filters {
        key.push_str(&format!(":{facet}={value}"));
    }
    key
}

pub fn source_search_key(query: &str, max_results: u32, start_index: u32) -> String {
    format!(
        "source:search:q={}:max={}:start={}",
        normalize_query(query),
        max_results,
        start_index
    )
}

pub fn source_detail_key(source_id: &str) -> String {
    format!("source:detail:{source_id}")
}

//=========================================================================================
// Typed Read-Through Helpers
//=========================================================================================

/// Reads and decodes a cached value. Any decode failure is a miss, never
/// an error.
pub async fn get_json<T: DeserializeOwned>(cache: &dyn ResponseCache, key: &str) -> Option<T> {
    let value = cache.get(key).await?;
    serde_json::from_value(value).ok()
}

/// Encodes and stores a value. Encode failures are logged and dropped.
pub async fn put_json<T: Serialize>(
    cache: &dyn ResponseCache,
    key: &str,
    value: &T,
    ttl: Duration,
) {
    match serde_json::to_value(value) {
        Ok(encoded) => cache.set(key, encoded, ttl).await,
        Err(error) => warn!(%key, %error, "failed to encode value for cache"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn normalization_folds_case_and_whitespace() {
        assert_eq!(normalize_query("  JavaScript   Basics "), "javascript basics");
        assert_eq!(
            search_key("JavaScript", 1, 20),
            search_key("  javascript ", 1, 20)
        );
    }

    #[test]
    fn pagination_and_sort_never_collide() {
        let keys = [
            search_key("rust", 1, 20),
            search_key("rust", 2, 20),
            search_key("rust", 1, 40),
            listing_key(1, 20, BookSort::Title, SortOrder::Asc),
            listing_key(1, 20, BookSort::Title, SortOrder::Desc),
            listing_key(1, 20, BookSort::AverageRating, SortOrder::Asc),
            listing_key(2, 20, BookSort::Title, SortOrder::Asc),
        ];
        for (i, a) in keys.iter().enumerate() {
            for b in keys.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn facet_filters_are_order_stable() {
        let mut first = IndexQuery::new("rust", 1, 20);
        first.facet_filters = BTreeMap::from([
            ("language".to_string(), "en".to_string()),
            ("rating_bucket".to_string(), "4.0 & up".to_string()),
        ]);

        let mut second = IndexQuery::new("rust", 1, 20);
        second
            .facet_filters
            .insert("rating_bucket".to_string(), "4.0 & up".to_string());
        second
            .facet_filters
            .insert("language".to_string(), "en".to_string());

        assert_eq!(index_query_key(&first), index_query_key(&second));

        let unfiltered = IndexQuery::new("rust", 1, 20);
        assert_ne!(index_query_key(&first), index_query_key(&unfiltered));
    }

    #[test]
    fn viewer_identity_partitions_detail_keys() {
        let viewer = Uuid::new_v4();
        assert_ne!(detail_key("abc", None), detail_key("abc", Some(viewer)));
        assert!(detail_key("abc", Some(viewer)).starts_with(&detail_prefix("abc")));
        assert!(detail_key("abc", None).starts_with(&detail_prefix("abc")));
    }
}
