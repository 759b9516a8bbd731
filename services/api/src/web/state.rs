//! services/api/src/web/state.rs
//!
//! Defines the application's shared state: one long-lived instance of
//! every port and core service, constructed once at startup and passed
//! by reference into every handler. No process-wide mutable globals.

use crate::config::Config;
use book_discovery_core::catalog::Catalog;
use book_discovery_core::favorites::Favorites;
use book_discovery_core::ports::{ResponseCache, UserRepository};
use book_discovery_core::search::HybridSearch;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub users: Arc<dyn UserRepository>,
    pub catalog: Arc<Catalog>,
    pub search: Arc<HybridSearch>,
    pub favorites: Arc<Favorites>,
    pub cache: Arc<dyn ResponseCache>,
}
