mod cache;
mod kv;
mod schema;
mod types;

pub use cache::{PersistentCache, DEFAULT_CACHE_TTL, FAVORITES_KEY, LAST_FETCH_KEY, NEWS_CACHE_KEY};
pub use kv::{KeyValueStore, MemoryStore};
pub use schema::Database;
pub use types::{Article, ArticleSource, CachedNews, DatabaseError};

#[cfg(test)]
pub(crate) use types::fixtures;
