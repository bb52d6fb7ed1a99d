//! User-pinned articles, persisted independently of the news feed.
use crate::storage::{Article, PersistentCache};

/// In-memory favorites list mirrored to [`PersistentCache`] on every change.
pub struct FavoritesStore {
    cache: PersistentCache,
    favorites: Vec<Article>,
}

impl FavoritesStore {
    /// Load the persisted list. A missing or unreadable list starts empty.
    pub async fn load(cache: PersistentCache) -> Self {
        let favorites = cache.get_favorites().await;
        tracing::debug!(count = favorites.len(), "Loaded favorites");
        Self { cache, favorites }
    }

    pub fn list(&self) -> &[Article] {
        &self.favorites
    }

    pub fn is_favorite(&self, id: &str) -> bool {
        self.favorites.iter().any(|a| a.id == id)
    }

    /// Pin `article`. Returns `false` if it was already pinned.
    pub async fn add(&mut self, article: Article) -> bool {
        if self.is_favorite(&article.id) {
            return false;
        }
        self.favorites.push(article);
        self.persist().await;
        true
    }

    /// Unpin by id. Returns `false` if it wasn't pinned.
    pub async fn remove(&mut self, id: &str) -> bool {
        let before = self.favorites.len();
        self.favorites.retain(|a| a.id != id);
        if self.favorites.len() == before {
            return false;
        }
        self.persist().await;
        true
    }

    /// Flip the pinned state. Returns the new state.
    pub async fn toggle(&mut self, article: Article) -> bool {
        if self.is_favorite(&article.id) {
            self.remove(&article.id).await;
            false
        } else {
            self.add(article).await
        }
    }

    async fn persist(&self) {
        self.cache.save_favorites(&self.favorites).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fixtures::article;
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    fn cache() -> PersistentCache {
        PersistentCache::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let mut favorites = FavoritesStore::load(cache()).await;
        assert!(favorites.add(article("a")).await);
        assert!(!favorites.add(article("a")).await);
        assert_eq!(favorites.list().len(), 1);
    }

    #[tokio::test]
    async fn test_changes_survive_reload() {
        let cache = cache();
        let mut favorites = FavoritesStore::load(cache.clone()).await;
        favorites.add(article("a")).await;
        favorites.add(article("b")).await;
        favorites.remove("a").await;

        let reloaded = FavoritesStore::load(cache).await;
        assert!(!reloaded.is_favorite("a"));
        assert!(reloaded.is_favorite("b"));
    }

    #[tokio::test]
    async fn test_toggle() {
        let mut favorites = FavoritesStore::load(cache()).await;
        assert!(favorites.toggle(article("a")).await);
        assert!(favorites.is_favorite("a"));
        assert!(!favorites.toggle(article("a")).await);
        assert!(favorites.list().is_empty());
    }

    #[tokio::test]
    async fn test_remove_missing() {
        let mut favorites = FavoritesStore::load(cache()).await;
        assert!(!favorites.remove("nope").await);
    }

    #[tokio::test]
    async fn test_clearing_news_cache_keeps_favorites() {
        let cache = cache();
        let mut favorites = FavoritesStore::load(cache.clone()).await;
        favorites.add(article("a")).await;
        cache.save_news_cache(&[article("n")]).await;

        cache.clear_cache().await;

        assert!(FavoritesStore::load(cache).await.is_favorite("a"));
    }
}
