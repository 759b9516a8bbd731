//! services/api/src/adapters/google_books.rs
//!
//! This module contains the adapter for the Google Books API. It implements
//! the `BookSourceService` port from the `core` crate: catalog search,
//! single-volume detail, and narrow suggestion lookups, with cooperative
//! rate limiting and read-through caching of the raw responses.

use async_trait::async_trait;
use book_discovery_core::cache::{self, CacheTtls};
use book_discovery_core::domain::{BookDraft, SourcePage};
use book_discovery_core::ports::{BookSourceService, PortError, PortResult, ResponseCache};
use book_discovery_core::search::extract_suggestions;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

/// How many items one suggestion lookup pulls from the catalog before
/// extracting matching titles and authors.
const SUGGESTION_FETCH_SIZE: u32 = 20;

/// Partial-response selector for suggestion lookups: titles and authors
/// only, nothing else crosses the wire.
const SUGGESTION_FIELDS: &str = "items(id,volumeInfo(title,authors)),totalItems";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

//=========================================================================================
// Wire Format Structs
//=========================================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumesResponse {
    #[serde(default)]
    total_items: u64,
    #[serde(default)]
    items: Vec<Volume>,
}

#[derive(Debug, Deserialize)]
struct Volume {
    id: String,
    #[serde(rename = "volumeInfo", default)]
    volume_info: VolumeInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct VolumeInfo {
    title: Option<String>,
    authors: Option<Vec<String>>,
    description: Option<String>,
    publisher: Option<String>,
    published_date: Option<String>,
    page_count: Option<i32>,
    categories: Option<Vec<String>>,
    language: Option<String>,
    industry_identifiers: Option<Vec<IndustryIdentifier>>,
    image_links: Option<ImageLinks>,
    average_rating: Option<f64>,
    ratings_count: Option<i32>,
    preview_link: Option<String>,
    info_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndustryIdentifier {
    #[serde(rename = "type")]
    kind: String,
    identifier: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ImageLinks {
    thumbnail: Option<String>,
    small_thumbnail: Option<String>,
}

/// Maps one volume payload onto the normalized draft shape. Missing
/// fields map to absent, never to an error.
fn normalize_volume(volume: Volume) -> BookDraft {
    let info = volume.volume_info;
    let (mut isbn_10, mut isbn_13) = (None, None);
    for identifier in info.industry_identifiers.unwrap_or_default() {
        match identifier.kind.as_str() {
            "ISBN_10" => isbn_10 = Some(identifier.identifier),
            "ISBN_13" => isbn_13 = Some(identifier.identifier),
            _ => {}
        }
    }
    let images = info.image_links.unwrap_or_default();
    BookDraft {
        source_id: volume.id,
        title: info.title.unwrap_or_else(|| "Untitled".to_string()),
        authors: info.authors.unwrap_or_default(),
        description: info.description,
        publisher: info.publisher,
        published_date: info.published_date,
        page_count: info.page_count,
        categories: info.categories.unwrap_or_default(),
        language: info.language,
        isbn_10,
        isbn_13,
        thumbnail: images.thumbnail,
        small_thumbnail: images.small_thumbnail,
        average_rating: info.average_rating,
        ratings_count: info.ratings_count,
        preview_link: info.preview_link,
        info_link: info.info_link,
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `BookSourceService` port against the
/// Google Books `volumes` API.
pub struct GoogleBooksAdapter {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    request_delay: Duration,
    /// Timestamp of the previous outbound call. Held across the pacing
    /// sleep so concurrent callers queue up behind one another.
    last_request: Mutex<Option<Instant>>,
    cache: Arc<dyn ResponseCache>,
    ttls: CacheTtls,
}

impl GoogleBooksAdapter {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        request_delay: Duration,
        cache: Arc<dyn ResponseCache>,
        ttls: CacheTtls,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url,
            api_key,
            request_delay,
            last_request: Mutex::new(None),
            cache,
            ttls,
        })
    }

    /// Cooperative rate limiting: a fixed inter-request delay, not
    /// adaptive and not backoff-based.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(at) = *last {
            let elapsed = at.elapsed();
            if elapsed < self.request_delay {
                tokio::time::sleep(self.request_delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn fetch_volumes(
        &self,
        params: &[(&str, String)],
    ) -> PortResult<VolumesResponse> {
        self.pace().await;
        let url = format!("{}/volumes", self.base_url);
        let mut request = self.http.get(&url).query(params);
        if let Some(api_key) = &self.api_key {
            request = request.query(&[("key", api_key.as_str())]);
        }
        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                warn!(error = %e, "external catalog request failed");
                PortError::Unavailable(e.to_string())
            })?;
        response.json::<VolumesResponse>().await.map_err(|e| {
            warn!(error = %e, "external catalog returned an unparseable payload");
            PortError::Unavailable(e.to_string())
        })
    }
}

//=========================================================================================
// `BookSourceService` Trait Implementation
//=========================================================================================

#[async_trait]
impl BookSourceService for GoogleBooksAdapter {
    async fn search(
        &self,
        query: &str,
        max_results: u32,
        start_index: u32,
    ) -> PortResult<SourcePage> {
        let key = cache::source_search_key(query, max_results, start_index);
        if let Some(cached) = cache::get_json::<SourcePage>(self.cache.as_ref(), &key).await {
            return Ok(cached);
        }

        let params = [
            ("q", query.to_string()),
            ("maxResults", max_results.to_string()),
            ("startIndex", start_index.to_string()),
        ];
        let response = self.fetch_volumes(&params).await?;

        let page = SourcePage {
            total_items: response.total_items,
            items: response.items.into_iter().map(normalize_volume).collect(),
        };
        cache::put_json(self.cache.as_ref(), &key, &page, self.ttls.source_search).await;
        Ok(page)
    }

    async fn get_detail(&self, source_id: &str) -> PortResult<Option<BookDraft>> {
        let key = cache::source_detail_key(source_id);
        if let Some(cached) = cache::get_json::<BookDraft>(self.cache.as_ref(), &key).await {
            return Ok(Some(cached));
        }

        self.pace().await;
        let url = format!("{}/volumes/{}", self.base_url, source_id);
        let mut request = self.http.get(&url);
        if let Some(api_key) = &self.api_key {
            request = request.query(&[("key", api_key.as_str())]);
        }
        let response = request.send().await.map_err(|e| {
            warn!(%source_id, error = %e, "external catalog detail request failed");
            PortError::Unavailable(e.to_string())
        })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status().map_err(|e| {
            warn!(%source_id, error = %e, "external catalog detail request failed");
            PortError::Unavailable(e.to_string())
        })?;
        let volume = response.json::<Volume>().await.map_err(|e| {
            warn!(%source_id, error = %e, "external catalog returned an unparseable volume");
            PortError::Unavailable(e.to_string())
        })?;

        let draft = normalize_volume(volume);
        cache::put_json(self.cache.as_ref(), &key, &draft, self.ttls.source_detail).await;
        Ok(Some(draft))
    }

    async fn get_suggestions(&self, prefix: &str, limit: usize) -> PortResult<Vec<String>> {
        // Narrow search: small page, titles and authors only. The
        // suggestion-level cache lives in the core service; only the raw
        // search responses are cached at this layer.
        let params = [
            ("q", prefix.to_string()),
            ("maxResults", SUGGESTION_FETCH_SIZE.to_string()),
            ("fields", SUGGESTION_FIELDS.to_string()),
        ];
        let response = self.fetch_volumes(&params).await?;
        let drafts: Vec<BookDraft> = response.items.into_iter().map(normalize_volume).collect();
        Ok(extract_suggestions(&drafts, prefix, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_maps_nested_fields_and_tolerates_gaps() {
        let payload = serde_json::json!({
            "id": "zyTCAlFPjgYC",
            "volumeInfo": {
                "title": "The Google Story",
                "authors": ["David A. Vise", "Mark Malseed"],
                "publisher": "Random House Digital, Inc.",
                "publishedDate": "2005-11-15",
                "pageCount": 207,
                "categories": ["Browsers (Computer programs)"],
                "language": "en",
                "industryIdentifiers": [
                    {"type": "ISBN_10", "identifier": "055380457X"},
                    {"type": "ISBN_13", "identifier": "9780553804577"},
                    {"type": "OTHER", "identifier": "OCLC:1234"}
                ],
                "imageLinks": {
                    "smallThumbnail": "http://books.google.com/small.jpg",
                    "thumbnail": "http://books.google.com/thumb.jpg"
                },
                "averageRating": 3.5,
                "ratingsCount": 136,
                "previewLink": "http://books.google.com/preview",
                "infoLink": "http://books.google.com/info"
            }
        });
        let volume: Volume = serde_json::from_value(payload).unwrap();
        let draft = normalize_volume(volume);

        assert_eq!(draft.source_id, "zyTCAlFPjgYC");
        assert_eq!(draft.title, "The Google Story");
        assert_eq!(draft.authors.len(), 2);
        assert_eq!(draft.isbn_10.as_deref(), Some("055380457X"));
        assert_eq!(draft.isbn_13.as_deref(), Some("9780553804577"));
        assert_eq!(
            draft.small_thumbnail.as_deref(),
            Some("http://books.google.com/small.jpg")
        );
        assert_eq!(draft.average_rating, Some(3.5));

        // A nearly empty volume still normalizes.
        let sparse: Volume = serde_json::from_value(serde_json::json!({"id": "x"})).unwrap();
        let draft = normalize_volume(sparse);
        assert_eq!(draft.source_id, "x");
        assert_eq!(draft.title, "Untitled");
        assert!(draft.authors.is_empty());
        assert!(draft.isbn_10.is_none());
    }

    #[test]
    fn volumes_response_tolerates_missing_items() {
        let response: VolumesResponse =
            serde_json::from_value(serde_json::json!({"totalItems": 0})).unwrap();
        assert_eq!(response.total_items, 0);
        assert!(response.items.is_empty());
    }
}
