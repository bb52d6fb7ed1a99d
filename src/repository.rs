//! Cached one-shot reads of the news feed, for callers that don't need
//! pagination state (search, widgets, the CLI's `search` command).
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::api::{normalize_articles, NewsQuery, NewsSource};
use crate::config::SyncConfig;
use crate::storage::{Article, PersistentCache};
use crate::sync::SyncError;

const DEFAULT_MEMORY_ENTRIES: NonZeroUsize = match NonZeroUsize::new(32) {
    Some(n) => n,
    None => unreachable!(),
};

/// Read-through cache in front of a [`NewsSource`].
///
/// Lookup order: in-memory LRU, fresh persisted snapshot, network, then the
/// persisted snapshot even if expired.
pub struct NewsRepository {
    source: Arc<dyn NewsSource>,
    cache: PersistentCache,
    config: SyncConfig,
    memory: Mutex<LruCache<String, Vec<Article>>>,
}

impl NewsRepository {
    pub fn new(source: Arc<dyn NewsSource>, cache: PersistentCache, config: SyncConfig) -> Self {
        Self {
            source,
            cache,
            config,
            memory: Mutex::new(LruCache::new(DEFAULT_MEMORY_ENTRIES)),
        }
    }

    /// Cap the in-memory cache at `entries` queries (at least one).
    pub fn with_memory_capacity(mut self, entries: usize) -> Self {
        let capacity = NonZeroUsize::new(entries).unwrap_or(NonZeroUsize::MIN);
        self.memory = Mutex::new(LruCache::new(capacity));
        self
    }

    pub async fn latest_news(&self, query: &NewsQuery) -> Result<Vec<Article>, SyncError> {
        let key = query.cache_key();

        if let Some(hit) = self.memory.lock().await.get(&key) {
            tracing::debug!(key = %key, "Memory cache hit");
            return Ok(hit.clone());
        }

        // The persisted snapshot only mirrors the unfiltered first page
        let persisted = if uses_snapshot(query) {
            let cached = self.cache.get_news_cache().await;
            if let (Some(articles), false) = (cached.usable(), cached.is_expired) {
                tracing::debug!(key = %key, count = articles.len(), "Persisted cache hit");
                let articles = articles.to_vec();
                self.memory.lock().await.put(key, articles.clone());
                return Ok(articles);
            }
            cached.articles
        } else {
            None
        };

        match self.fetch(query).await {
            Ok(articles) => {
                self.memory.lock().await.put(key, articles.clone());
                if uses_snapshot(query) {
                    self.cache.save_news_cache(&articles).await;
                }
                Ok(articles)
            }
            Err(err) => match persisted.filter(|a| !a.is_empty()) {
                Some(stale) => {
                    tracing::warn!(error = %err, count = stale.len(), "Fetch failed, serving expired cache");
                    Ok(stale)
                }
                None => Err(err),
            },
        }
    }

    /// Forget cached responses. Favorites are untouched.
    pub async fn clear_cache(&self) {
        self.memory.lock().await.clear();
        self.cache.clear_cache().await;
        tracing::info!("Cleared news cache");
    }

    async fn fetch(&self, query: &NewsQuery) -> Result<Vec<Article>, SyncError> {
        let cancel = CancellationToken::new();
        let result = tokio::time::timeout(
            self.config.request_timeout,
            self.source.fetch_page(query, &cancel),
        )
        .await;

        let response = match result {
            Ok(response) => response?,
            Err(_) => {
                cancel.cancel();
                return Err(SyncError::Timeout);
            }
        };
        let normalized = normalize_articles(response.results);
        if normalized.skipped > 0 {
            tracing::debug!(skipped = normalized.skipped, "Dropped malformed articles");
        }
        Ok(normalized.articles)
    }
}

fn uses_snapshot(query: &NewsQuery) -> bool {
    let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
    blank(&query.page) && blank(&query.query)
}
