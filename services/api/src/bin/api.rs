//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        db, GoogleBooksAdapter, MeiliSearchIndexAdapter, MokaResponseCache, PgBookRepository,
        PgFavoriteRepository, PgUserRepository,
    },
    config::Config,
    error::ApiError,
    web::{
        auth::{delete_account_handler, login_handler, logout_handler, signup_handler},
        book_detail_handler,
        favorites::{
            add_favorite_handler, list_favorites_handler, remove_favorite_handler,
            toggle_favorite_handler,
        },
        list_books_handler, require_auth,
        rest::ApiDoc,
        search_books_handler, state::AppState, suggestions_handler,
    },
};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use book_discovery_core::{
    catalog::Catalog,
    favorites::Favorites,
    ports::{
        BookRepository, BookSourceService, FavoriteRepository, ResponseCache, SearchIndexService,
        UserRepository,
    },
    search::HybridSearch,
};
use meilisearch_sdk::client::Client as MeiliClient;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    info!("Running database migrations...");
    db::run_migrations(&db_pool).await?;
    info!("Database migrations complete.");

    // --- 3. Build the Cache and the Service Adapters ---
    let cache: Arc<dyn ResponseCache> = Arc::new(MokaResponseCache::new(config.cache_capacity));
    let books: Arc<dyn BookRepository> = Arc::new(PgBookRepository::new(db_pool.clone()));
    let favorites_repo: Arc<dyn FavoriteRepository> =
        Arc::new(PgFavoriteRepository::new(db_pool.clone()));
    let users: Arc<dyn UserRepository> = Arc::new(PgUserRepository::new(db_pool.clone()));

    let source: Arc<dyn BookSourceService> = Arc::new(
        GoogleBooksAdapter::new(
            config.books_api_base_url.clone(),
            config.books_api_key.clone(),
            config.source_request_delay,
            cache.clone(),
            config.ttls.clone(),
        )
        .map_err(|e| ApiError::Internal(format!("Failed to build the catalog HTTP client: {e}")))?,
    );

    let meili_client = MeiliClient::new(config.meili_url.clone(), config.meili_api_key.clone())?;
    let index: Arc<dyn SearchIndexService> = Arc::new(MeiliSearchIndexAdapter::new(
        meili_client,
        config.meili_index.clone(),
        cache.clone(),
        config.ttls.clone(),
    ));

    // Settings are pushed idempotently at startup; a failure here only
    // degrades search quality, it must not stop the service.
    if let Err(error) = index.configure().await {
        warn!(%error, "failed to configure the search index at startup");
    }

    // --- 4. Build the Core Services and Shared AppState ---
    let catalog = Arc::new(Catalog::new(
        books.clone(),
        favorites_repo.clone(),
        index.clone(),
        source.clone(),
        cache.clone(),
        config.ttls.clone(),
    ));
    let search = Arc::new(HybridSearch::new(
        index.clone(),
        source.clone(),
        books.clone(),
        cache.clone(),
        config.ttls.clone(),
    ));
    let favorites = Arc::new(Favorites::new(
        favorites_repo.clone(),
        books.clone(),
        cache.clone(),
    ));

    let app_state = Arc::new(AppState {
        config: config.clone(),
        users,
        catalog,
        search,
        favorites,
        cache,
    });

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .cors_origin
                .parse::<HeaderValue>()
                .map_err(|e| ApiError::Internal(format!("Invalid CORS_ORIGIN: {e}")))?,
        )
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/books", get(list_books_handler))
        .route("/books/search", get(search_books_handler))
        .route("/books/suggestions", get(suggestions_handler))
        .route("/books/{source_id}", get(book_detail_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route(
            "/favorites",
            get(list_favorites_handler).post(add_favorite_handler),
        )
        .route("/favorites/toggle", post(toggle_favorite_handler))
        .route("/favorites/{book_id}", delete(remove_favorite_handler))
        .route("/auth/account", delete(delete_account_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
