pub mod auth;
pub mod favorites;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;

// Re-export the handlers the binary wires into the router.
pub use middleware::require_auth;
pub use rest::{
    book_detail_handler, list_books_handler, search_books_handler, suggestions_handler,
};
