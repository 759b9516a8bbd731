//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use book_discovery_core::cache::CacheTtls;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub cors_origin: String,
    pub books_api_base_url: String,
    pub books_api_key: Option<String>,
    /// Cooperative inter-request delay imposed on every external catalog call.
    pub source_request_delay: Duration,
    pub meili_url: String,
    pub meili_api_key: Option<String>,
    pub meili_index: String,
    pub cache_capacity: u64,
    pub ttls: CacheTtls,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin =
            std::env::var("CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:5173".to_string());

        // --- Load External Service Settings ---
        let books_api_base_url = std::env::var("BOOKS_API_BASE_URL")
            .unwrap_or_else(|_| "https://www.googleapis.com/books/v1".to_string());
        let books_api_key = std::env::var("BOOKS_API_KEY").ok();
        let source_request_delay = Duration::from_millis(u64_var("BOOKS_API_DELAY_MS", 500)?);

        let meili_url =
            std::env::var("MEILI_URL").unwrap_or_else(|_| "http://localhost:7700".to_string());
        let meili_api_key = std::env::var("MEILI_API_KEY").ok();
        let meili_index = std::env::var("MEILI_INDEX").unwrap_or_else(|_| "books".to_string());

        // --- Load Cache Settings ---
        // Every TTL class is tunable on its own; the defaults follow the
        // product policy table.
        let cache_capacity = u64_var("CACHE_CAPACITY", 10_000)?;
        let defaults = CacheTtls::default();
        let ttls = CacheTtls {
            search: secs_var("CACHE_TTL_SEARCH_SECS", defaults.search)?,
            suggestions: secs_var("CACHE_TTL_SUGGESTIONS_SECS", defaults.suggestions)?,
            suggestions_prefix: secs_var(
                "CACHE_TTL_SUGGESTIONS_PREFIX_SECS",
                defaults.suggestions_prefix,
            )?,
            detail: secs_var("CACHE_TTL_DETAIL_SECS", defaults.detail)?,
            listing: secs_var("CACHE_TTL_LISTING_SECS", defaults.listing)?,
            index_query: secs_var("CACHE_TTL_INDEX_QUERY_SECS", defaults.index_query)?,
            source_search: secs_var("CACHE_TTL_SOURCE_SEARCH_SECS", defaults.source_search)?,
            source_detail: secs_var("CACHE_TTL_SOURCE_DETAIL_SECS", defaults.source_detail)?,
        };

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            cors_origin,
            books_api_base_url,
            books_api_key,
            source_request_delay,
            meili_url,
            meili_api_key,
            meili_index,
            cache_capacity,
            ttls,
        })
    }
}

fn u64_var(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
        Err(_) => Ok(default),
    }
}

fn secs_var(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    Ok(Duration::from_secs(u64_var(name, default.as_secs())?))
}
