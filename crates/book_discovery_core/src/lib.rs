pub mod cache;
pub mod catalog;
pub mod domain;
pub mod favorites;
pub mod ports;
pub mod search;

#[cfg(test)]
pub(crate) mod test_support;

pub use catalog::Catalog;
pub use domain::{
    AuthSession, Book, BookDetail, BookDraft, BookListing, BookSort, Favorite, FavoritedBook,
    HybridSearchPage, IndexPage, IndexQuery, IndexedBook, SortOrder, SourceLabel, SourcePage,
    SuggestionSource, Suggestions, User, UserCredentials,
};
pub use favorites::Favorites;
pub use ports::{
    BookRepository, BookSourceService, FavoriteRepository, PortError, PortResult, ResponseCache,
    SearchIndexService, UserRepository,
};
pub use search::HybridSearch;
