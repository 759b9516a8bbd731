//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the public book endpoints and the
//! master definition for the OpenAPI specification.

use crate::web::middleware::optional_viewer;
use crate::web::protocol::{
    error_response, port_error_response, ApiEnvelope, ErrorResponse, FieldErrors,
};
use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use book_discovery_core::domain::{Book, BookSort, SortOrder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{IntoParams, Modify, OpenApi, ToSchema};

/// Hard caps on page sizes, per endpoint class.
const MAX_LIST_PER_PAGE: u32 = 100;
const MAX_SEARCH_PER_PAGE: u32 = 40;
const MAX_SUGGESTIONS: usize = 10;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        list_books_handler,
        search_books_handler,
        suggestions_handler,
        book_detail_handler,
        crate::web::favorites::list_favorites_handler,
        crate::web::favorites::add_favorite_handler,
        crate::web::favorites::toggle_favorite_handler,
        crate::web::favorites::remove_favorite_handler,
        crate::web::auth::signup_handler,
        crate::web::auth::login_handler,
        crate::web::auth::logout_handler,
        crate::web::auth::delete_account_handler,
    ),
    components(
        schemas(
            BookPayload,
            PaginationBlock,
            ListBooksData,
            SearchData,
            SuggestionsData,
            BookDetailData,
            crate::web::favorites::FavoriteRequest,
            crate::web::favorites::FavoriteData,
            crate::web::favorites::FavoriteEntry,
            crate::web::favorites::FavoritesListData,
            crate::web::auth::SignupRequest,
            crate::web::auth::LoginRequest,
            crate::web::auth::AuthData,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Book Discovery API", description = "Hybrid book search, browse and favorites endpoints.")
    )
)]
pub struct ApiDoc;

/// Registers the bearer-token security scheme the protected routes use.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_token",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// One catalog entry, as serialized to clients.
#[derive(Serialize, ToSchema)]
pub struct BookPayload {
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
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Book> for BookPayload {
    fn from(book: Book) -> Self {
        Self {
            id: book.id,
            source_id: book.source_id,
            title: book.title,
            authors: book.authors,
            description: book.description,
            publisher: book.publisher,
            published_date: book.published_date,
            page_count: book.page_count,
            categories: book.categories,
            language: book.language,
            isbn_10: book.isbn_10,
            isbn_13: book.isbn_13,
            thumbnail: book.thumbnail,
            small_thumbnail: book.small_thumbnail,
            average_rating: book.average_rating,
            ratings_count: book.ratings_count,
            preview_link: book.preview_link,
            info_link: book.info_link,
            created_at: book.created_at,
            updated_at: book.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaginationBlock {
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u32,
}

#[derive(Serialize, ToSchema)]
pub struct ListBooksData {
    pub books: Vec<BookPayload>,
    pub pagination: PaginationBlock,
}

#[derive(Serialize, ToSchema)]
pub struct SearchData {
    pub books: Vec<BookPayload>,
    pub pagination: PaginationBlock,
    /// Which backend path(s) produced this response.
    pub source: String,
    pub new_books_indexed: usize,
}

#[derive(Serialize, ToSchema)]
pub struct SuggestionsData {
    pub suggestions: Vec<String>,
    pub source: String,
}

#[derive(Serialize, ToSchema)]
pub struct BookDetailData {
    pub book: BookPayload,
    /// Present only when the request carried a valid bearer token.
    pub is_favorite: Option<bool>,
}

//=========================================================================================
// Query Parameter Structs
//=========================================================================================

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListBooksParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// One of `created_at`, `title`, `average_rating`.
    pub sort: Option<String>,
    /// `asc` or `desc`.
    pub order: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchParams {
    /// The free-text query. Required.
    pub q: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SuggestionsParams {
    /// The query prefix. Required.
    pub q: Option<String>,
    pub limit: Option<usize>,
}

fn validate_page(raw: Option<u32>, errors: &mut FieldErrors) -> u32 {
    match raw {
        Some(0) => {
            errors.push("page", "page must be at least 1");
            1
        }
        Some(page) => page,
        None => 1,
    }
}

fn validate_per_page(raw: Option<u32>, max: u32, errors: &mut FieldErrors) -> u32 {
    match raw {
        Some(0) => {
            errors.push("per_page", "per_page must be at least 1");
            20
        }
        Some(per_page) if per_page > max => {
            errors.push("per_page", format!("per_page may not be greater than {max}"));
            20
        }
        Some(per_page) => per_page,
        None => 20,
    }
}

fn validate_query(raw: Option<&str>, errors: &mut FieldErrors) -> String {
    let query = raw.unwrap_or("").trim().to_string();
    if query.is_empty() {
        errors.push("q", "The q parameter is required");
    }
    query
}

fn parse_sort(raw: Option<&str>, errors: &mut FieldErrors) -> BookSort {
    match raw {
        None | Some("created_at") => BookSort::CreatedAt,
        Some("title") => BookSort::Title,
        Some("average_rating") => BookSort::AverageRating,
        Some(other) => {
            errors.push(
                "sort",
                format!("'{other}' is not one of created_at, title, average_rating"),
            );
            BookSort::CreatedAt
        }
    }
}

fn parse_order(raw: Option<&str>, errors: &mut FieldErrors) -> SortOrder {
    match raw {
        None | Some("desc") => SortOrder::Desc,
        Some("asc") => SortOrder::Asc,
        Some(other) => {
            errors.push("order", format!("'{other}' is not one of asc, desc"));
            SortOrder::Desc
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Browse the local catalog.
///
/// Paginated and sortable; responses are cached briefly and labeled with
/// an `X-Cache: hit|miss` header.
#[utoipa::path(
    get,
    path = "/books",
    params(ListBooksParams),
    responses(
        (status = 200, description = "One page of the catalog", body = ApiEnvelope<ListBooksData>),
        (status = 422, description = "Invalid pagination or sort parameters")
    )
)]
pub async fn list_books_handler(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<ListBooksParams>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let mut errors = FieldErrors::default();
    let page = validate_page(params.page, &mut errors);
    let per_page = validate_per_page(params.per_page, MAX_LIST_PER_PAGE, &mut errors);
    let sort = parse_sort(params.sort.as_deref(), &mut errors);
    let order = parse_order(params.order.as_deref(), &mut errors);
    if !errors.is_empty() {
        return Err(errors.into_response());
    }

    let (listing, cache_hit) = app_state
        .catalog
        .list(page, per_page, sort, order)
        .await
        .map_err(port_error_response)?;

    let data = ListBooksData {
        pagination: PaginationBlock {
            page: listing.page,
            per_page: listing.per_page,
            total: listing.total_count,
            total_pages: listing.total_pages,
        },
        books: listing.books.into_iter().map(BookPayload::from).collect(),
    };
    let cache_header = if cache_hit { "hit" } else { "miss" };
    Ok((
        [("x-cache", cache_header)],
        Json(ApiEnvelope::data(data)),
    ))
}

/// Hybrid search across the search index and the external catalog.
///
/// Read paths never hard-fail: a backend outage degrades the result set
/// and is reported in the `source` field instead.
#[utoipa::path(
    get,
    path = "/books/search",
    params(SearchParams),
    responses(
        (status = 200, description = "Merged, de-duplicated search results", body = ApiEnvelope<SearchData>),
        (status = 422, description = "Missing query or invalid pagination parameters")
    )
)]
pub async fn search_books_handler(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let mut errors = FieldErrors::default();
    let query = validate_query(params.q.as_deref(), &mut errors);
    let page = validate_page(params.page, &mut errors);
    let per_page = validate_per_page(params.per_page, MAX_SEARCH_PER_PAGE, &mut errors);
    if !errors.is_empty() {
        return Err(errors.into_response());
    }

    let result = app_state.search.search(&query, page, per_page).await;

    let data = SearchData {
        pagination: PaginationBlock {
            page: result.page,
            per_page,
            total: result.total_count,
            total_pages: result.total_pages,
        },
        source: result.source.as_str().to_string(),
        new_books_indexed: result.new_books_indexed,
        books: result.books.into_iter().map(BookPayload::from).collect(),
    };
    Ok(Json(ApiEnvelope::data(data)))
}

/// Autocomplete suggestions.
///
/// Falls back live-source → index → local substring match; the rung that
/// answered is reported in `source`.
#[utoipa::path(
    get,
    path = "/books/suggestions",
    params(SuggestionsParams),
    responses(
        (status = 200, description = "Up to `limit` unique suggestions", body = ApiEnvelope<SuggestionsData>),
        (status = 422, description = "Missing prefix or invalid limit")
    )
)]
pub async fn suggestions_handler(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<SuggestionsParams>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let mut errors = FieldErrors::default();
    let query = validate_query(params.q.as_deref(), &mut errors);
    let limit = match params.limit {
        Some(0) => {
            errors.push("limit", "limit must be at least 1");
            MAX_SUGGESTIONS
        }
        Some(limit) if limit > MAX_SUGGESTIONS => {
            errors.push(
                "limit",
                format!("limit may not be greater than {MAX_SUGGESTIONS}"),
            );
            MAX_SUGGESTIONS
        }
        Some(limit) => limit,
        None => MAX_SUGGESTIONS,
    };
    if !errors.is_empty() {
        return Err(errors.into_response());
    }

    let result = app_state.search.suggest(&query, limit).await;
    let source = match result.source {
        book_discovery_core::domain::SuggestionSource::LiveSource => "live-source",
        book_discovery_core::domain::SuggestionSource::SearchIndex => "search-index",
        book_discovery_core::domain::SuggestionSource::LocalStore => "local-store",
    };
    Ok(Json(ApiEnvelope::data(SuggestionsData {
        suggestions: result.suggestions,
        source: source.to_string(),
    })))
}

/// Single-book detail by external catalog id.
///
/// The local store answers first; a miss falls back to the external
/// source with persist + index. 404 only when the book exists nowhere.
#[utoipa::path(
    get,
    path = "/books/{source_id}",
    params(
        ("source_id" = String, Path, description = "The external catalog identifier of the book.")
    ),
    responses(
        (status = 200, description = "The book", body = ApiEnvelope<BookDetailData>),
        (status = 404, description = "Unknown book")
    )
)]
pub async fn book_detail_handler(
    State(app_state): State<Arc<AppState>>,
    Path(source_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ErrorResponse> {
    let viewer = optional_viewer(&app_state, &headers).await;
    match app_state.catalog.detail(&source_id, viewer).await {
        Some(detail) => Ok(Json(ApiEnvelope::data(BookDetailData {
            book: BookPayload::from(detail.book),
            is_favorite: detail.is_favorite,
        }))),
        None => Err(error_response(StatusCode::NOT_FOUND, "Book not found")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_page_caps_differ_by_endpoint() {
        let mut errors = FieldErrors::default();
        assert_eq!(validate_per_page(Some(100), MAX_LIST_PER_PAGE, &mut errors), 100);
        assert!(errors.is_empty());

        let mut errors = FieldErrors::default();
        validate_per_page(Some(41), MAX_SEARCH_PER_PAGE, &mut errors);
        assert!(!errors.is_empty());

        let mut errors = FieldErrors::default();
        validate_per_page(Some(0), MAX_SEARCH_PER_PAGE, &mut errors);
        assert!(!errors.is_empty());
    }

    #[test]
    fn query_is_required_and_trimmed() {
        let mut errors = FieldErrors::default();
        assert_eq!(validate_query(Some("  rust  "), &mut errors), "rust");
        assert!(errors.is_empty());

        let mut errors = FieldErrors::default();
        validate_query(Some("   "), &mut errors);
        assert!(!errors.is_empty());

        let mut errors = FieldErrors::default();
        validate_query(None, &mut errors);
        assert!(!errors.is_empty());
    }

    #[test]
    fn unknown_sort_and_order_are_rejected() {
        let mut errors = FieldErrors::default();
        assert_eq!(parse_sort(Some("title"), &mut errors), BookSort::Title);
        assert_eq!(parse_order(Some("asc"), &mut errors), SortOrder::Asc);
        assert!(errors.is_empty());

        let mut errors = FieldErrors::default();
        parse_sort(Some("publisher"), &mut errors);
        parse_order(Some("sideways"), &mut errors);
        let (status, _) = errors.into_response();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
