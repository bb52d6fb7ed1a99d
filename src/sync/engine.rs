//! The news sync engine: paginated fetch with retry, timeout, cancellation
//! and cache fallback.
//!
//! # Concurrency
//!
//! At most one load is admitted at a time; a load that arrives while another
//! is tracked is rejected, not queued. Every admitted load gets a fresh
//! generation and cancellation token. Navigating away ([`NewsSyncEngine::cancel_pending`])
//! or disposing bumps the generation, so any continuation still holding the
//! old one finds itself stale and leaves the store alone.
//!
//! Engine bookkeeping sits behind a `std::sync::Mutex` that is only held for
//! short synchronous sections. Store mutations take the store lock first and
//! then check the generation under the state lock, so a check and its write
//! are never split by a cancellation.
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::SyncError;
use super::loading::{LoadingKind, LoadingState};
use super::notice::Notice;
use crate::api::{normalize_articles, NewsQuery, NewsResponse, NewsSource};
use crate::config::SyncConfig;
use crate::network::NetworkMonitor;
use crate::storage::{Article, PersistentCache};
use crate::store::SharedArticleStore;

/// Pagination and error bookkeeping owned by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderState {
    /// Next page to request. Only advances after a page has been merged.
    pub current_page: u32,
    pub has_more_pages: bool,
    pub last_error: Option<String>,
    pub last_updated: DateTime<Utc>,
    /// Retries spent on the load in progress
    pub retry_count: u32,
}

impl Default for LoaderState {
    fn default() -> Self {
        Self {
            current_page: 1,
            has_more_pages: true,
            last_error: None,
            last_updated: Utc::now(),
            retry_count: 0,
        }
    }
}

/// How a call to [`NewsSyncEngine::load`] ended, short of a terminal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A page was merged; `added` is the number of new entries
    Loaded { added: usize },
    /// The page had no usable articles; no more pages
    Exhausted,
    /// Offline; the store was filled from the cached snapshot
    ServedFromCache,
    /// The fetch failed and the cached snapshot was shown instead
    CacheFallback,
    /// Another load was in flight, or the request isn't allowed right now
    Rejected,
    /// Cancelled or overtaken before it could write anything
    Superseded,
    /// The engine has been disposed
    Disposed,
}

struct EngineState {
    loader: LoaderState,
    loading: LoadingState,
    in_flight: HashSet<u64>,
    next_request_id: u64,
    generation: u64,
    cancel: Option<CancellationToken>,
    /// Cursor returned with the last merged page, valid for `loader.current_page`
    next_page_token: Option<String>,
    live: bool,
}

impl EngineState {
    fn new() -> Self {
        Self {
            loader: LoaderState::default(),
            loading: LoadingState::default(),
            in_flight: HashSet::new(),
            next_request_id: 0,
            generation: 0,
            cancel: None,
            next_page_token: None,
            live: true,
        }
    }

    fn is_current(&self, ticket: &Ticket) -> bool {
        self.live && self.generation == ticket.generation
    }

    fn stale_outcome(&self) -> LoadOutcome {
        if self.live {
            LoadOutcome::Superseded
        } else {
            LoadOutcome::Disposed
        }
    }

    /// Track a new request, aborting whatever token was outstanding.
    fn admit(&mut self) -> Ticket {
        if let Some(previous) = self.cancel.take() {
            previous.cancel();
        }
        self.generation += 1;
        self.next_request_id += 1;

        let token = CancellationToken::new();
        self.cancel = Some(token.clone());
        self.in_flight.insert(self.next_request_id);
        Ticket {
            id: self.next_request_id,
            generation: self.generation,
            token,
        }
    }

    /// Cancel the outstanding token and orphan every in-flight load.
    fn abort(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
            tracing::debug!(generation = self.generation, "Cancelled pending news request");
        }
        self.generation += 1;
        self.in_flight.clear();
        self.loading.finish();
        self.loader.retry_count = 0;
    }

    /// Cursor to send for `page`.
    fn cursor_for(&self, page: u32) -> Option<String> {
        if page <= 1 {
            return None;
        }
        match &self.next_page_token {
            Some(token) if page == self.loader.current_page => Some(token.clone()),
            _ => Some(page.to_string()),
        }
    }
}

/// Identity of one admitted load. Stable across its retries.
struct Ticket {
    id: u64,
    generation: u64,
    token: CancellationToken,
}

/// Releases a ticket however its load ends, including the future being dropped.
struct InFlight<'a> {
    engine: &'a EngineInner,
    ticket: Ticket,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.engine.lock_state();
        state.in_flight.remove(&self.ticket.id);
        if state.generation == self.ticket.generation {
            state.loading.finish();
            state.cancel = None;
        }
    }
}

struct EngineInner {
    source: Arc<dyn NewsSource>,
    store: SharedArticleStore,
    cache: PersistentCache,
    network: NetworkMonitor,
    config: SyncConfig,
    base_query: NewsQuery,
    notices: Option<mpsc::Sender<Notice>>,
    state: Mutex<EngineState>,
}

impl EngineInner {
    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Builder for [`NewsSyncEngine`].
pub struct EngineBuilder {
    source: Arc<dyn NewsSource>,
    store: SharedArticleStore,
    cache: PersistentCache,
    network: NetworkMonitor,
    config: SyncConfig,
    base_query: NewsQuery,
    notices: Option<mpsc::Sender<Notice>>,
}

impl EngineBuilder {
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Filters and page size sent with every request. Its `page` is ignored.
    pub fn base_query(mut self, query: NewsQuery) -> Self {
        self.base_query = query.with_page(None);
        self
    }

    pub fn notices(mut self, tx: mpsc::Sender<Notice>) -> Self {
        self.notices = Some(tx);
        self
    }

    pub fn build(self) -> NewsSyncEngine {
        NewsSyncEngine {
            inner: Arc::new(EngineInner {
                source: self.source,
                store: self.store,
                cache: self.cache,
                network: self.network,
                config: self.config,
                base_query: self.base_query,
                notices: self.notices,
                state: Mutex::new(EngineState::new()),
            }),
        }
    }
}

/// Drives the article store from the remote feed. Clones share state.
#[derive(Clone)]
pub struct NewsSyncEngine {
    inner: Arc<EngineInner>,
}

impl NewsSyncEngine {
    pub fn builder(
        source: Arc<dyn NewsSource>,
        store: SharedArticleStore,
        cache: PersistentCache,
        network: NetworkMonitor,
    ) -> EngineBuilder {
        EngineBuilder {
            source,
            store,
            cache,
            network,
            config: SyncConfig::default(),
            base_query: NewsQuery::default(),
            notices: None,
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn loader_state(&self) -> LoaderState {
        self.inner.lock_state().loader.clone()
    }

    pub fn loading(&self) -> LoadingState {
        self.inner.lock_state().loading
    }

    pub fn has_active_requests(&self) -> bool {
        !self.inner.lock_state().in_flight.is_empty()
    }

    pub fn is_live(&self) -> bool {
        self.inner.lock_state().live
    }

    pub fn store(&self) -> SharedArticleStore {
        self.inner.store.clone()
    }

    /// More pages exist, we're online and nothing is loading.
    pub fn can_load_more(&self) -> bool {
        let state = self.inner.lock_state();
        state.live
            && state.loader.has_more_pages
            && state.in_flight.is_empty()
            && state.loading.is_idle()
            && !self.inner.network.is_offline()
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Load `page` (1-based). Page 1 replaces the list; later pages append.
    ///
    /// Returns `Err` only for terminal failures with nothing to fall back to.
    pub async fn load(&self, page: u32, is_refresh: bool) -> Result<LoadOutcome, SyncError> {
        let page = page.max(1);
        let kind = LoadingKind::for_request(page, is_refresh);

        let ticket = {
            let mut state = self.inner.lock_state();
            if !state.live {
                return Ok(LoadOutcome::Disposed);
            }
            if !state.in_flight.is_empty() {
                tracing::warn!(page, "News loading already in progress");
                return Ok(LoadOutcome::Rejected);
            }
            if !state.loading.start(kind) {
                return Ok(LoadOutcome::Rejected);
            }
            state.admit()
        };
        let guard = InFlight {
            engine: self.inner.as_ref(),
            ticket,
        };

        self.run(&guard.ticket, page, is_refresh).await
    }

    /// Reload the first page. Rejected with a notice while offline.
    pub async fn refresh(&self) -> Result<LoadOutcome, SyncError> {
        if !self.is_live() {
            return Ok(LoadOutcome::Disposed);
        }
        if self.inner.network.is_offline() {
            tracing::info!("Refresh requested while offline");
            self.notify(Notice::CannotRefreshOffline);
            return Ok(LoadOutcome::Rejected);
        }
        if self.has_active_requests() {
            tracing::warn!("Refresh attempted while loading");
            return Ok(LoadOutcome::Rejected);
        }
        self.load(1, true).await
    }

    /// Load the next page if [`can_load_more`](Self::can_load_more).
    pub async fn load_more(&self) -> Result<LoadOutcome, SyncError> {
        let page = {
            let state = self.inner.lock_state();
            if !state.live {
                return Ok(LoadOutcome::Disposed);
            }
            state.loader.current_page
        };
        if !self.can_load_more() {
            tracing::debug!(page, "Cannot load more right now");
            return Ok(LoadOutcome::Rejected);
        }
        self.load(page, false).await
    }

    /// Abort the outstanding request and forget everything in flight.
    ///
    /// Any continuation of an aborted load becomes a no-op.
    pub fn cancel_pending(&self) {
        self.inner.lock_state().abort();
    }

    /// Cancel everything and refuse all further loads.
    pub fn dispose(&self) {
        let mut state = self.inner.lock_state();
        state.abort();
        state.live = false;
        tracing::debug!("News sync engine disposed");
    }

    /// Cancel pending work and clear the list and pagination.
    ///
    /// The cached snapshot is kept for offline fallback.
    pub async fn reset(&self) {
        self.cancel_pending();
        let mut store = self.inner.store.lock().await;
        let mut state = self.inner.lock_state();
        store.reset();
        state.loader = LoaderState::default();
        state.next_page_token = None;
    }

    // ========================================================================
    // Load pipeline
    // ========================================================================

    async fn run(
        &self,
        ticket: &Ticket,
        page: u32,
        is_refresh: bool,
    ) -> Result<LoadOutcome, SyncError> {
        if self.inner.network.is_offline() {
            return self.load_offline(ticket, is_refresh).await;
        }

        let query = {
            let mut store = self.inner.store.lock().await;
            let mut state = self.inner.lock_state();
            if !state.is_current(ticket) {
                return Ok(state.stale_outcome());
            }
            if is_refresh {
                state.loader.current_page = 1;
                state.loader.last_updated = Utc::now();
                state.next_page_token = None;
                store.set_page(1);
            }
            self.inner
                .base_query
                .clone()
                .with_page(state.cursor_for(page))
        };

        let max_retries = self.inner.config.max_retries;
        let mut retries = 0;
        loop {
            let err = match self.fetch_once(&query, &ticket.token).await {
                Ok(response) => return self.apply_page(ticket, page, response).await,
                Err(err) => err,
            };

            let retry = {
                let mut state = self.inner.lock_state();
                if err == SyncError::Cancelled || !state.is_current(ticket) {
                    return Ok(state.stale_outcome());
                }
                let retry = err.is_retryable() && retries < max_retries;
                if retry {
                    retries += 1;
                    state.loader.retry_count = retries;
                }
                retry
            };
            if !retry {
                return self.fail(ticket, page, err).await;
            }
            tracing::warn!(
                page,
                attempt = retries,
                max_retries,
                error = %err,
                "Retrying news request"
            );
        }
    }

    /// One attempt, bounded by the request timeout and the ticket's token.
    async fn fetch_once(
        &self,
        query: &NewsQuery,
        token: &CancellationToken,
    ) -> Result<NewsResponse, SyncError> {
        let attempt = token.child_token();
        let timeout = self.inner.config.request_timeout;

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(SyncError::Cancelled),
            result = tokio::time::timeout(timeout, self.inner.source.fetch_page(query, &attempt)) => {
                match result {
                    Ok(response) => response.map_err(SyncError::from),
                    Err(_) => {
                        attempt.cancel();
                        tracing::debug!(timeout_ms = timeout.as_millis() as u64, "News request timed out");
                        Err(SyncError::Timeout)
                    }
                }
            }
        }
    }

    async fn apply_page(
        &self,
        ticket: &Ticket,
        page: u32,
        response: NewsResponse,
    ) -> Result<LoadOutcome, SyncError> {
        let NewsResponse {
            results, next_page, ..
        } = response;
        let next_page = next_page.filter(|token| !token.is_empty());

        let normalized = normalize_articles(results);
        if normalized.skipped > 0 {
            tracing::debug!(page, skipped = normalized.skipped, "Dropped malformed articles");
        }
        // Nothing usable ends pagination; the list and snapshot stay as they are
        let exhausted = normalized.articles.is_empty();

        let (added, has_more, snapshot) = {
            let mut store = self.inner.store.lock().await;
            let mut state = self.inner.lock_state();
            if !state.is_current(ticket) {
                tracing::debug!(page, "Discarding response for superseded request");
                return Ok(state.stale_outcome());
            }

            state.loader.last_updated = Utc::now();
            state.loader.retry_count = 0;

            if exhausted {
                store.set_has_more(false);
                state.loader.has_more_pages = false;
                tracing::info!(page, "News feed exhausted");
                return Ok(LoadOutcome::Exhausted);
            }

            let has_more = next_page.is_some();
            let added = if page == 1 {
                store.set_articles(normalized.articles);
                store.articles().len()
            } else {
                store.append_articles(normalized.articles)
            };
            let next = page.saturating_add(1);
            store.set_page(next);
            store.set_has_more(has_more);
            store.set_error(None);

            state.loader.current_page = next;
            state.loader.has_more_pages = has_more;
            state.loader.last_error = None;
            state.next_page_token = next_page;

            (added, has_more, store.set_cached_snapshot().to_vec())
        };

        self.inner.cache.save_news_cache(&snapshot).await;
        tracing::info!(page, added, has_more, "Loaded news page");
        Ok(LoadOutcome::Loaded { added })
    }

    async fn fail(
        &self,
        ticket: &Ticket,
        page: u32,
        err: SyncError,
    ) -> Result<LoadOutcome, SyncError> {
        let cached = if page == 1 {
            self.cached_articles().await
        } else {
            Vec::new()
        };
        let message = err.to_string();

        let notice = {
            let mut store = self.inner.store.lock().await;
            let mut state = self.inner.lock_state();
            if !state.is_current(ticket) {
                return Ok(state.stale_outcome());
            }

            state.loader.retry_count = 0;
            state.loader.last_error = Some(message.clone());
            state.loader.last_updated = Utc::now();
            store.set_error(Some(message.clone()));

            if cached.is_empty() {
                Notice::LoadFailed { message }
            } else {
                store.set_articles(cached);
                Notice::FailedShowingCached
            }
        };

        tracing::warn!(page, error = %err, "Failed to load news");
        let fell_back = notice == Notice::FailedShowingCached;
        self.notify(notice);
        if fell_back {
            Ok(LoadOutcome::CacheFallback)
        } else {
            Err(err)
        }
    }

    async fn load_offline(
        &self,
        ticket: &Ticket,
        is_refresh: bool,
    ) -> Result<LoadOutcome, SyncError> {
        let cached = self.cached_articles().await;

        if is_refresh {
            tracing::info!("Offline, keeping current list");
            self.notify(if cached.is_empty() {
                Notice::CannotRefreshOffline
            } else {
                Notice::OfflineShowingCached
            });
            return Ok(LoadOutcome::Rejected);
        }

        let err = SyncError::OfflineNoCache;
        {
            let mut store = self.inner.store.lock().await;
            let mut state = self.inner.lock_state();
            if !state.is_current(ticket) {
                return Ok(state.stale_outcome());
            }
            if !cached.is_empty() {
                tracing::info!(count = cached.len(), "Offline, serving cached news");
                store.set_articles(cached);
                return Ok(LoadOutcome::ServedFromCache);
            }
            state.loader.last_error = Some(err.to_string());
            store.set_error(Some(err.to_string()));
        }

        tracing::warn!("Offline with no cached news");
        self.notify(Notice::LoadFailed {
            message: err.to_string(),
        });
        Err(err)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// The offline snapshot, hydrated from persistent storage on first use.
    async fn cached_articles(&self) -> Vec<Article> {
        {
            let store = self.inner.store.lock().await;
            if !store.cached_articles().is_empty() {
                return store.cached_articles().to_vec();
            }
        }

        let persisted = self.inner.cache.get_news_cache().await;
        let Some(articles) = persisted.usable() else {
            return Vec::new();
        };

        let mut store = self.inner.store.lock().await;
        if store.cached_articles().is_empty() {
            tracing::debug!(
                count = articles.len(),
                expired = persisted.is_expired,
                "Hydrated cached news"
            );
            store.hydrate_cached(articles.to_vec());
        }
        store.cached_articles().to_vec()
    }

    fn notify(&self, notice: Notice) {
        tracing::info!(title = notice.title(), message = notice.message(), "Notice");
        if let Some(tx) = &self.inner.notices {
            if let Err(e) = tx.try_send(notice) {
                tracing::warn!(error = %e, "Dropping notice");
            }
        }
    }
}
