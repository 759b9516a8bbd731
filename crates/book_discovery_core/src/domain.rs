//! crates/book_discovery_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or search-index wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use uuid::Uuid;

/// A persisted catalog entry. The internal `id` is assigned on first
/// persistence; `source_id` is the external catalog identifier and is
/// unique across the whole store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub source_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    /// Loosely structured date string from the external catalog.
    /// Not guaranteed to parse; see [`published_year`].
    pub published_date: Option<String>,
    pub page_count: Option<i32>,
    pub categories: Vec<String>,
    pub language: Option<String>,
    pub isbn_10: Option<String>,
    pub isbn_13: Option<String>,
    pub thumbnail: Option<String>,
    pub small_thumbnail: Option<String>,
    pub average_rating: Option<f64>,
    pub ratings_count: Option<i32>,
    pub preview_link: Option<String>,
    pub info_link: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A normalized external payload, ready for upsert. Everything a [`Book`]
/// carries except the internal id and timestamps. Missing source fields
/// map to `None`/empty, never to an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookDraft {
    pub source_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    pub page_count: Option<i32>,
    pub categories: Vec<String>,
    pub language: Option<String>,
    pub isbn_10: Option<String>,
    pub isbn_13: Option<String>,
    pub thumbnail: Option<String>,
    pub small_thumbnail: Option<String>,
    pub average_rating: Option<f64>,
    pub ratings_count: Option<i32>,
    pub preview_link: Option<String>,
    pub info_link: Option<String>,
}

impl Book {
    /// Builds a `Book` from a draft without going through the store.
    /// Used on the best-effort path where persistence failed but the
    /// external payload should still be served (`id` stays 0).
    pub fn from_draft(draft: &BookDraft, id: i64, now: DateTime<Utc>) -> Self {
        Self {
            id,
            source_id: draft.source_id.clone(),
            title: draft.title.clone(),
            authors: draft.authors.clone(),
            description: draft.description.clone(),
            publisher: draft.publisher.clone(),
            published_date: draft.published_date.clone(),
            page_count: draft.page_count,
            categories: draft.categories.clone(),
            language: draft.language.clone(),
            isbn_10: draft.isbn_10.clone(),
            isbn_13: draft.isbn_13.clone(),
            thumbnail: draft.thumbnail.clone(),
            small_thumbnail: draft.small_thumbnail.clone(),
            average_rating: draft.average_rating,
            ratings_count: draft.ratings_count,
            preview_link: draft.preview_link.clone(),
            info_link: draft.info_link.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

//=========================================================================================
// Search Index Projection
//=========================================================================================

/// Rating facet thresholds, highest first. Each book gets the label of the
/// highest threshold its average rating clears. Product data, not logic:
/// changing a boundary means editing this table only.
pub const RATING_BUCKETS: &[(f64, &str)] = &[
    (4.5, "4.5 & up"),
    (4.0, "4.0 & up"),
    (3.5, "3.5 & up"),
    (3.0, "3.0 & up"),
];
pub const RATING_BUCKET_UNDER: &str = "Under 3.0";
pub const RATING_BUCKET_UNKNOWN: &str = "Unknown";

/// Maps an average rating onto its discrete facet label.
pub fn rating_bucket(average_rating: Option<f64>) -> &'static str {
    match average_rating {
        None => RATING_BUCKET_UNKNOWN,
        Some(rating) => RATING_BUCKETS
            .iter()
            .find(|(threshold, _)| rating >= *threshold)
            .map(|(_, label)| *label)
            .unwrap_or(RATING_BUCKET_UNDER),
    }
}

/// Extracts a publication year from the loosely structured date string
/// ("2005-03-14", "c1998", "1987?"). First four-digit run wins.
pub fn published_year(published_date: Option<&str>) -> Option<i32> {
    static YEAR: OnceLock<regex::Regex> = OnceLock::new();
    let re = YEAR.get_or_init(|| regex::Regex::new(r"\d{4}").expect("valid year pattern"));
    published_date
        .and_then(|date| re.find(date))
        .and_then(|m| m.as_str().parse().ok())
}

/// The denormalized projection of a [`Book`] stored in the search index:
/// every catalog field plus the derived facet fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedBook {
    pub id: i64,
    pub source_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    pub page_count: Option<i32>,
    pub categories: Vec<String>,
    pub language: Option<String>,
    pub isbn_10: Option<String>,
    pub isbn_13: Option<String>,
    pub thumbnail: Option<String>,
    pub small_thumbnail: Option<String>,
    pub average_rating: Option<f64>,
    pub ratings_count: Option<i32>,
    pub preview_link: Option<String>,
    pub info_link: Option<String>,
    pub published_year: Option<i32>,
    pub rating_bucket: String,
}

impl From<&Book> for IndexedBook {
    fn from(book: &Book) -> Self {
        Self {
            id: book.id,
            source_id: book.source_id.clone(),
            title: book.title.clone(),
            authors: book.authors.clone(),
            description: book.description.clone(),
            publisher: book.publisher.clone(),
            published_date: book.published_date.clone(),
            page_count: book.page_count,
            categories: book.categories.clone(),
            language: book.language.clone(),
            isbn_10: book.isbn_10.clone(),
            isbn_13: book.isbn_13.clone(),
            thumbnail: book.thumbnail.clone(),
            small_thumbnail: book.small_thumbnail.clone(),
            average_rating: book.average_rating,
            ratings_count: book.ratings_count,
            preview_link: book.preview_link.clone(),
            info_link: book.info_link.clone(),
            published_year: published_year(book.published_date.as_deref()),
            rating_bucket: rating_bucket(book.average_rating).to_string(),
        }
    }
}

impl IndexedBook {
    /// Collapses the projection back into the catalog record shape,
    /// dropping the derived facet fields. Used when merging index hits
    /// with store-backed results.
    pub fn into_book(self, now: DateTime<Utc>) -> Book {
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
            created_at: now,
            updated_at: now,
        }
    }
}

//=========================================================================================
// Users, Auth, Favorites
//=========================================================================================

// Represents a user - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub email: Option<String>,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

// Represents an issued bearer-token session
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// One (user, book) join row. The pair is unique in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Favorite {
    pub user_id: Uuid,
    pub book_id: i64,
    pub created_at: DateTime<Utc>,
}

/// A favorite joined with its book, as listed back to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FavoritedBook {
    pub book: Book,
    pub favorited_at: DateTime<Utc>,
}

//=========================================================================================
// Search Types
//=========================================================================================

/// Which backend path(s) produced a search response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceLabel {
    #[serde(rename = "hybrid")]
    Hybrid,
    #[serde(rename = "index-only-fallback")]
    IndexOnlyFallback,
    #[serde(rename = "external-only-fallback")]
    ExternalOnlyFallback,
    #[serde(rename = "empty-error-fallback")]
    EmptyErrorFallback,
}

impl SourceLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceLabel::Hybrid => "hybrid",
            SourceLabel::IndexOnlyFallback => "index-only-fallback",
            SourceLabel::ExternalOnlyFallback => "external-only-fallback",
            SourceLabel::EmptyErrorFallback => "empty-error-fallback",
        }
    }
}

/// Which rung of the suggestion fallback ladder answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuggestionSource {
    #[serde(rename = "live-source")]
    LiveSource,
    #[serde(rename = "search-index")]
    SearchIndex,
    #[serde(rename = "local-store")]
    LocalStore,
}

/// One page of results from the external book catalog. `total_items` is
/// the source's own estimate and may undercount.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcePage {
    pub items: Vec<BookDraft>,
    pub total_items: u64,
}

/// A faceted, paginated query against the search index. Pages are
/// 1-based at this layer.
#[derive(Debug, Clone)]
pub struct IndexQuery {
    pub text: String,
    pub page: u32,
    pub page_size: u32,
    pub facet_filters: BTreeMap<String, String>,
}

impl IndexQuery {
    pub fn new(text: impl Into<String>, page: u32, page_size: u32) -> Self {
        Self {
            text: text.into(),
            page,
            page_size,
            facet_filters: BTreeMap::new(),
        }
    }
}

/// One page of search-index hits plus facet distributions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexPage {
    pub hits: Vec<IndexedBook>,
    pub total_hits: u64,
    pub page: u32,
    pub total_pages: u32,
    pub facets: BTreeMap<String, BTreeMap<String, usize>>,
    pub processing_time_ms: u64,
}

/// The assembled hybrid search response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridSearchPage {
    pub books: Vec<Book>,
    pub total_count: u64,
    pub page: u32,
    pub total_pages: u32,
    pub source: SourceLabel,
    pub new_books_indexed: usize,
}

/// Autocomplete suggestions plus the ladder rung that produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestions {
    pub suggestions: Vec<String>,
    pub source: SuggestionSource,
}

/// One page of the plain (non-search) catalog listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookListing {
    pub books: Vec<Book>,
    pub total_count: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

/// A single detail-view payload, with the viewer's favorite state when
/// the request carried an identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookDetail {
    pub book: Book,
    pub is_favorite: Option<bool>,
}

/// Sort columns accepted by the catalog listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookSort {
    CreatedAt,
    Title,
    AverageRating,
}

impl BookSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookSort::CreatedAt => "created_at",
            BookSort::Title => "title",
            BookSort::AverageRating => "average_rating",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_bucket_thresholds() {
        assert_eq!(rating_bucket(Some(4.8)), "4.5 & up");
        assert_eq!(rating_bucket(Some(4.5)), "4.5 & up");
        assert_eq!(rating_bucket(Some(4.2)), "4.0 & up");
        assert_eq!(rating_bucket(Some(3.7)), "3.5 & up");
        assert_eq!(rating_bucket(Some(3.0)), "3.0 & up");
        assert_eq!(rating_bucket(Some(2.9)), "Under 3.0");
        assert_eq!(rating_bucket(Some(0.0)), "Under 3.0");
        assert_eq!(rating_bucket(None), "Unknown");
    }

    #[test]
    fn published_year_handles_loose_dates() {
        assert_eq!(published_year(Some("2005-03-14")), Some(2005));
        assert_eq!(published_year(Some("c1998")), Some(1998));
        assert_eq!(published_year(Some("1987?")), Some(1987));
        assert_eq!(published_year(Some("March 2011")), Some(2011));
        assert_eq!(published_year(Some("n.d.")), None);
        assert_eq!(published_year(Some("")), None);
        assert_eq!(published_year(None), None);
    }

    #[test]
    fn indexed_projection_derives_facets() {
        let now = Utc::now();
        let book = Book::from_draft(
            &BookDraft {
                source_id: "abc123".into(),
                title: "The Rust Programming Language".into(),
                authors: vec!["Steve Klabnik".into(), "Carol Nichols".into()],
                published_date: Some("2019-08-06".into()),
                average_rating: Some(4.7),
                ..Default::default()
            },
            1,
            now,
        );

        let indexed = IndexedBook::from(&book);
        assert_eq!(indexed.published_year, Some(2019));
        assert_eq!(indexed.rating_bucket, "4.5 & up");
        assert_eq!(indexed.into_book(now).source_id, "abc123");
    }
}
