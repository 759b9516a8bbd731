//! services/api/src/adapters/meili.rs
//!
//! This module contains the adapter for the hosted search index. It
//! implements the `SearchIndexService` port from the `core` crate on top
//! of Meilisearch: settings push, single/batch upsert, delete, and the
//! faceted paginated query with a short read-through cache.

use async_trait::async_trait;
use book_discovery_core::cache::{self, CacheTtls};
use book_discovery_core::domain::{Book, IndexPage, IndexQuery, IndexedBook};
use book_discovery_core::ports::{PortError, PortResult, ResponseCache, SearchIndexService};
use meilisearch_sdk::client::Client;
use meilisearch_sdk::search::Selectors;
use meilisearch_sdk::settings::Settings;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Facetable attributes exposed to the UI.
const FACET_FIELDS: &[&str] = &["categories", "language", "rating_bucket", "published_year"];

/// Query-time highlighting/snippeting targets.
const HIGHLIGHT_FIELDS: &[&str] = &["title", "description"];

/// An adapter that implements the `SearchIndexService` port using the
/// Meilisearch SDK.
pub struct MeiliSearchIndexAdapter {
    client: Client,
    index_name: String,
    cache: Arc<dyn ResponseCache>,
    ttls: CacheTtls,
}

impl MeiliSearchIndexAdapter {
    pub fn new(
        client: Client,
        index_name: String,
        cache: Arc<dyn ResponseCache>,
        ttls: CacheTtls,
    ) -> Self {
        Self {
            client,
            index_name,
            cache,
            ttls,
        }
    }

    fn map_err(context: &str, error: meilisearch_sdk::errors::Error) -> PortError {
        warn!(%context, %error, "search index call failed");
        PortError::Unavailable(error.to_string())
    }
}

/// Builds a Meilisearch filter expression from the ordered facet map,
/// e.g. `language = "en" AND rating_bucket = "4.0 & up"`.
fn build_filter(facet_filters: &BTreeMap<String, String>) -> Option<String> {
    if facet_filters.is_empty() {
        return None;
    }
    Some(
        facet_filters
            .iter()
            .map(|(facet, value)| format!("{facet} = \"{}\"", value.replace('"', "\\\"")))
            .collect::<Vec<_>>()
            .join(" AND "),
    )
}

#[async_trait]
impl SearchIndexService for MeiliSearchIndexAdapter {
    /// Idempotent settings push. Ranking appends the product order —
    /// rating, ratings count, recency — after the standard relevance
    /// rules.
    async fn configure(&self) -> PortResult<()> {
        let settings = Settings::new()
            .with_searchable_attributes(["title", "authors", "categories", "description"])
            .with_filterable_attributes(FACET_FIELDS.iter().copied())
            .with_sortable_attributes(["average_rating", "ratings_count", "published_year"])
            .with_ranking_rules([
                "words",
                "typo",
                "proximity",
                "attribute",
                "sort",
                "exactness",
                "average_rating:desc",
                "ratings_count:desc",
                "published_year:desc",
            ]);
        self.client
            .index(&self.index_name)
            .set_settings(&settings)
            .await
            .map_err(|e| Self::map_err("configure", e))?;
        Ok(())
    }

    async fn upsert(&self, book: &Book) -> PortResult<()> {
        let documents = [IndexedBook::from(book)];
        self.client
            .index(&self.index_name)
            .add_or_update(&documents, Some("id"))
            .await
            .map_err(|e| Self::map_err("upsert", e))?;
        Ok(())
    }

    async fn upsert_batch(&self, books: &[Book]) -> PortResult<usize> {
        let documents: Vec<IndexedBook> = books.iter().map(IndexedBook::from).collect();
        self.client
            .index(&self.index_name)
            .add_or_update(&documents, Some("id"))
            .await
            .map_err(|e| Self::map_err("upsert_batch", e))?;
        Ok(documents.len())
    }

    async fn delete(&self, book_id: i64) -> PortResult<()> {
        self.client
            .index(&self.index_name)
            .delete_document(book_id)
            .await
            .map_err(|e| Self::map_err("delete", e))?;
        Ok(())
    }

    /// Faceted, paginated query. Pages are 1-based on both sides of this
    /// call, so no offset translation is needed here; results are cached
    /// briefly under the full normalized parameter set.
    async fn query(&self, query: &IndexQuery) -> PortResult<IndexPage> {
        let key = cache::index_query_key(query);
        if let Some(cached) = cache::get_json::<IndexPage>(self.cache.as_ref(), &key).await {
            return Ok(cached);
        }

        let index = self.client.index(&self.index_name);
        let filter = build_filter(&query.facet_filters);
        let mut search = index.search();
        search
            .with_query(&query.text)
            .with_page(query.page.max(1) as usize)
            .with_hits_per_page(query.page_size as usize)
            .with_facets(Selectors::Some(FACET_FIELDS))
            .with_attributes_to_highlight(Selectors::Some(HIGHLIGHT_FIELDS));
        if let Some(filter) = filter.as_deref() {
            search.with_filter(filter);
        }

        let results = search
            .execute::<IndexedBook>()
            .await
            .map_err(|e| Self::map_err("query", e))?;

        let facets = results
            .facet_distribution
            .map(|distribution| {
                distribution
                    .into_iter()
                    .map(|(facet, counts)| (facet, counts.into_iter().collect()))
                    .collect()
            })
            .unwrap_or_default();

        let page = IndexPage {
            hits: results.hits.into_iter().map(|hit| hit.result).collect(),
            total_hits: results
                .total_hits
                .or(results.estimated_total_hits)
                .unwrap_or(0) as u64,
            page: results.page.unwrap_or(query.page as usize) as u32,
            total_pages: results.total_pages.unwrap_or(0) as u32,
            facets,
            processing_time_ms: results.processing_time_ms as u64,
        };
        cache::put_json(self.cache.as_ref(), &key, &page, self.ttls.index_query).await;
        Ok(page)
    }

    async fn clear_all(&self) -> PortResult<()> {
        self.client
            .index(&self.index_name)
            .delete_all_documents()
            .await
            .map_err(|e| Self::map_err("clear_all", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_expression_is_ordered_and_escaped() {
        let mut filters = BTreeMap::new();
        filters.insert("rating_bucket".to_string(), "4.0 & up".to_string());
        filters.insert("language".to_string(), "en".to_string());

        assert_eq!(
            build_filter(&filters).as_deref(),
            Some("language = \"en\" AND rating_bucket = \"4.0 & up\"")
        );
        assert_eq!(build_filter(&BTreeMap::new()), None);

        let mut quoted = BTreeMap::new();
        quoted.insert("categories".to_string(), "Say \"Hi\"".to_string());
        assert_eq!(
            build_filter(&quoted).as_deref(),
            Some("categories = \"Say \\\"Hi\\\"\"")
        );
    }
}
