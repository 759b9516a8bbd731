pub mod db;
pub mod google_books;
pub mod meili;
pub mod memory_cache;

pub use db::{PgBookRepository, PgFavoriteRepository, PgUserRepository};
pub use google_books::GoogleBooksAdapter;
pub use meili::MeiliSearchIndexAdapter;
pub use memory_cache::MokaResponseCache;
