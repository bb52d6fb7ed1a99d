use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use super::kv::KeyValueStore;
use super::types::{Article, CachedNews};

/// Key for the serialized news snapshot
pub const NEWS_CACHE_KEY: &str = "news.cache";
/// Key for the epoch-millis timestamp of the last snapshot write
pub const LAST_FETCH_KEY: &str = "news.last_fetch";
/// Key for the serialized favorites list
pub const FAVORITES_KEY: &str = "favorites";

/// Default snapshot lifetime (30 minutes)
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

/// Best-effort persistence for the news snapshot and favorites.
///
/// Nothing here ever returns an error. Read failures are reported as an
/// absent cache and write failures are logged and swallowed.
#[derive(Clone)]
pub struct PersistentCache {
    kv: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl PersistentCache {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            ttl: DEFAULT_CACHE_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Read the news snapshot along with its expiry status.
    ///
    /// A snapshot older than the TTL is still returned with `is_expired = true`.
    pub async fn get_news_cache(&self) -> CachedNews {
        let values = match self.kv.get_many(&[NEWS_CACHE_KEY, LAST_FETCH_KEY]).await {
            Ok(values) => values,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read news cache");
                return CachedNews::absent();
            }
        };
        let mut values = values.into_iter();
        let news_raw = values.next().flatten();
        let last_fetch_raw = values.next().flatten();

        let articles = match news_raw {
            Some(raw) => match serde_json::from_str::<Vec<Article>>(&raw) {
                Ok(articles) => Some(articles),
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding undecodable news cache");
                    return CachedNews::absent();
                }
            },
            None => None,
        };

        let last_fetch_ms = last_fetch_raw
            .and_then(|raw| raw.parse::<i64>().ok())
            .unwrap_or(0);
        let age_ms = Utc::now().timestamp_millis().saturating_sub(last_fetch_ms);
        let is_expired = age_ms > self.ttl.as_millis() as i64;

        CachedNews {
            articles,
            is_expired,
        }
    }

    /// Persist the news snapshot and stamp it with the current time.
    pub async fn save_news_cache(&self, articles: &[Article]) {
        let json = match serde_json::to_string(articles) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize news cache");
                return;
            }
        };
        let now = Utc::now().timestamp_millis().to_string();

        if let Err(e) = self
            .kv
            .set_many(&[(NEWS_CACHE_KEY, json), (LAST_FETCH_KEY, now)])
            .await
        {
            tracing::warn!(error = %e, count = articles.len(), "Failed to save news cache");
        } else {
            tracing::debug!(count = articles.len(), "Saved news cache");
        }
    }

    pub async fn get_favorites(&self) -> Vec<Article> {
        match self.kv.get(FAVORITES_KEY).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Discarding undecodable favorites");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read favorites");
                Vec::new()
            }
        }
    }

    pub async fn save_favorites(&self, favorites: &[Article]) {
        let json = match serde_json::to_string(favorites) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize favorites");
                return;
            }
        };
        if let Err(e) = self.kv.set(FAVORITES_KEY, &json).await {
            tracing::warn!(error = %e, count = favorites.len(), "Failed to save favorites");
        }
    }

    /// Drop the news snapshot. Favorites are kept.
    pub async fn clear_cache(&self) {
        if let Err(e) = self.kv.remove_many(&[NEWS_CACHE_KEY, LAST_FETCH_KEY]).await {
            tracing::warn!(error = %e, "Failed to clear news cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::kv::MemoryStore;
    use crate::storage::types::fixtures::{article, articles};
    use anyhow::anyhow;
    use async_trait::async_trait;

    /// Backend whose every operation fails.
    struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        async fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
            Err(anyhow!("disk on fire"))
        }
        async fn set(&self, _key: &str, _value: &str) -> anyhow::Result<()> {
            Err(anyhow!("disk on fire"))
        }
        async fn set_many(&self, _pairs: &[(&str, String)]) -> anyhow::Result<()> {
            Err(anyhow!("disk on fire"))
        }
        async fn remove_many(&self, _keys: &[&str]) -> anyhow::Result<()> {
            Err(anyhow!("disk on fire"))
        }
    }

    fn memory_cache() -> (Arc<MemoryStore>, PersistentCache) {
        let kv = Arc::new(MemoryStore::new());
        let cache = PersistentCache::new(kv.clone());
        (kv, cache)
    }

    #[tokio::test]
    async fn test_empty_cache_is_absent_and_expired() {
        let (_kv, cache) = memory_cache();
        let read = cache.get_news_cache().await;
        assert!(read.articles.is_none());
        assert!(read.is_expired);
    }

    #[tokio::test]
    async fn test_save_then_read_is_fresh() {
        let (_kv, cache) = memory_cache();
        cache.save_news_cache(&articles(&["a", "b"])).await;

        let read = cache.get_news_cache().await;
        assert_eq!(read.articles, Some(articles(&["a", "b"])));
        assert!(!read.is_expired);
    }

    #[tokio::test]
    async fn test_old_snapshot_is_expired_but_returned() {
        let (kv, cache) = memory_cache();
        cache.save_news_cache(&articles(&["a"])).await;

        let an_hour_ago = Utc::now().timestamp_millis() - 60 * 60 * 1000;
        kv.set(LAST_FETCH_KEY, &an_hour_ago.to_string())
            .await
            .unwrap();

        let read = cache.get_news_cache().await;
        assert!(read.is_expired);
        assert_eq!(read.articles.map(|a| a.len()), Some(1));
    }

    #[tokio::test]
    async fn test_missing_timestamp_counts_as_expired() {
        let (kv, cache) = memory_cache();
        kv.set(NEWS_CACHE_KEY, &serde_json::to_string(&articles(&["a"])).unwrap())
            .await
            .unwrap();

        let read = cache.get_news_cache().await;
        assert!(read.is_expired);
        assert!(read.articles.is_some());
    }

    #[tokio::test]
    async fn test_custom_ttl() {
        let kv = Arc::new(MemoryStore::new());
        let cache = PersistentCache::new(kv.clone()).with_ttl(Duration::from_secs(5 * 60 * 60));
        cache.save_news_cache(&articles(&["a"])).await;

        let an_hour_ago = Utc::now().timestamp_millis() - 60 * 60 * 1000;
        kv.set(LAST_FETCH_KEY, &an_hour_ago.to_string())
            .await
            .unwrap();

        assert!(!cache.get_news_cache().await.is_expired);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_reads_as_absent() {
        let (kv, cache) = memory_cache();
        kv.set(NEWS_CACHE_KEY, "{not json").await.unwrap();
        let read = cache.get_news_cache().await;
        assert!(read.articles.is_none());
    }

    #[tokio::test]
    async fn test_clear_cache_keeps_favorites() {
        let (_kv, cache) = memory_cache();
        cache.save_news_cache(&articles(&["a"])).await;
        cache.save_favorites(&[article("fav")]).await;

        cache.clear_cache().await;

        assert!(cache.get_news_cache().await.articles.is_none());
        assert_eq!(cache.get_favorites().await, vec![article("fav")]);
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let cache = PersistentCache::new(Arc::new(BrokenStore));

        cache.save_news_cache(&articles(&["a"])).await;
        cache.save_favorites(&articles(&["a"])).await;
        cache.clear_cache().await;

        let read = cache.get_news_cache().await;
        assert!(read.articles.is_none());
        assert!(read.is_expired);
        assert!(cache.get_favorites().await.is_empty());
    }
}
