//! In-memory article list shared between the sync engine and the UI.
//!
//! `ArticleStore` is a plain state container: no I/O, no async. The sync
//! engine is its only writer for network-derived fields; readers take the
//! lock briefly to render.
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::storage::Article;

/// Upper bound on the persisted offline snapshot
pub const CACHED_SNAPSHOT_LIMIT: usize = 50;

/// Handle injected into the engine and read by the presentation layer.
pub type SharedArticleStore = Arc<Mutex<ArticleStore>>;

#[derive(Debug, Clone)]
pub struct ArticleStore {
    articles: Vec<Article>,
    cached_articles: Vec<Article>,
    error: Option<String>,
    page: u32,
    has_more: bool,
}

impl Default for ArticleStore {
    fn default() -> Self {
        Self {
            articles: Vec::new(),
            cached_articles: Vec::new(),
            error: None,
            page: 1,
            has_more: true,
        }
    }
}

impl ArticleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedArticleStore {
        Arc::new(Mutex::new(Self::new()))
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    pub fn cached_articles(&self) -> &[Article] {
        &self.cached_articles
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn contains(&self, id: &str) -> bool {
        self.articles.iter().any(|a| a.id == id)
    }

    // ========================================================================
    // Setters
    // ========================================================================

    /// Replace the whole list.
    ///
    /// Duplicate ids in `articles` keep their first occurrence.
    pub fn set_articles(&mut self, articles: Vec<Article>) {
        let mut seen = HashSet::with_capacity(articles.len());
        self.articles = articles
            .into_iter()
            .filter(|a| seen.insert(a.id.clone()))
            .collect();
    }

    /// Append a page, dropping entries whose id is already present.
    ///
    /// Existing entries are never overwritten; order of first appearance wins.
    /// Returns the number of entries actually appended.
    pub fn append_articles(&mut self, articles: Vec<Article>) -> usize {
        let mut seen: HashSet<String> = self.articles.iter().map(|a| a.id.clone()).collect();
        let before = self.articles.len();
        self.articles
            .extend(articles.into_iter().filter(|a| seen.insert(a.id.clone())));
        self.articles.len() - before
    }

    pub fn set_error(&mut self, error: Option<String>) {
        self.error = error;
    }

    pub fn set_page(&mut self, page: u32) {
        self.page = page;
    }

    pub fn set_has_more(&mut self, has_more: bool) {
        self.has_more = has_more;
    }

    /// Snapshot the first [`CACHED_SNAPSHOT_LIMIT`] entries of the full list.
    ///
    /// Returns the snapshot so the caller can persist it.
    pub fn set_cached_snapshot(&mut self) -> &[Article] {
        self.cached_articles = self
            .articles
            .iter()
            .take(CACHED_SNAPSHOT_LIMIT)
            .cloned()
            .collect();
        &self.cached_articles
    }

    /// Install a snapshot read back from persistent storage.
    pub fn hydrate_cached(&mut self, mut articles: Vec<Article>) {
        articles.truncate(CACHED_SNAPSHOT_LIMIT);
        self.cached_articles = articles;
    }

    /// Full reset. The cached snapshot survives so offline fallback keeps working.
    pub fn reset(&mut self) {
        let cached = std::mem::take(&mut self.cached_articles);
        *self = Self {
            cached_articles: cached,
            ..Self::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fixtures::{article, articles};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn ids(store: &ArticleStore) -> Vec<&str> {
        store.articles().iter().map(|a| a.id.as_str()).collect()
    }

    #[test]
    fn test_defaults() {
        let store = ArticleStore::new();
        assert!(store.articles().is_empty());
        assert_eq!(store.page(), 1);
        assert!(store.has_more());
        assert!(store.error().is_none());
    }

    #[test]
    fn test_append_drops_existing_ids() {
        let mut store = ArticleStore::new();
        store.set_articles(articles(&["a", "b"]));

        let added = store.append_articles(articles(&["b", "c"]));

        assert_eq!(added, 1);
        assert_eq!(ids(&store), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_append_never_overwrites() {
        let mut store = ArticleStore::new();
        store.set_articles(vec![article("a")]);

        let mut newer = article("a");
        newer.title = "Updated".to_string();
        store.append_articles(vec![newer]);

        assert_eq!(store.articles()[0].title, "Article a");
    }

    #[test]
    fn test_append_dedups_within_page() {
        let mut store = ArticleStore::new();
        let added = store.append_articles(articles(&["x", "x", "y"]));
        assert_eq!(added, 2);
        assert_eq!(ids(&store), vec!["x", "y"]);
    }

    #[test]
    fn test_set_articles_replaces() {
        let mut store = ArticleStore::new();
        store.set_articles(articles(&["a", "b"]));
        store.set_articles(articles(&["c", "c"]));
        assert_eq!(ids(&store), vec!["c"]);
    }

    #[test]
    fn test_snapshot_truncates_to_limit() {
        let mut store = ArticleStore::new();
        let many: Vec<_> = (0..80).map(|i| article(&format!("n{i}"))).collect();
        store.set_articles(many);

        let snapshot = store.set_cached_snapshot();
        assert_eq!(snapshot.len(), CACHED_SNAPSHOT_LIMIT);
        assert_eq!(snapshot[0].id, "n0");
        assert_eq!(store.articles().len(), 80);
    }

    #[test]
    fn test_reset_keeps_snapshot() {
        let mut store = ArticleStore::new();
        store.set_articles(articles(&["a"]));
        store.set_cached_snapshot();
        store.set_page(4);
        store.set_has_more(false);
        store.set_error(Some("boom".into()));

        store.reset();

        assert!(store.articles().is_empty());
        assert_eq!(store.cached_articles().len(), 1);
        assert_eq!(store.page(), 1);
        assert!(store.has_more());
        assert!(store.error().is_none());
    }

    #[test]
    fn test_hydrate_truncates() {
        let mut store = ArticleStore::new();
        store.hydrate_cached((0..60).map(|i| article(&format!("h{i}"))).collect());
        assert_eq!(store.cached_articles().len(), CACHED_SNAPSHOT_LIMIT);
    }

    proptest! {
        #[test]
        fn prop_pages_never_produce_duplicates(
            pages in prop::collection::vec(prop::collection::vec(0u8..20, 0..12), 1..6)
        ) {
            let mut store = ArticleStore::new();
            let mut expected: Vec<String> = Vec::new();

            for (i, page) in pages.iter().enumerate() {
                let batch: Vec<_> = page.iter().map(|n| article(&n.to_string())).collect();
                if i == 0 {
                    store.set_articles(batch);
                } else {
                    store.append_articles(batch);
                }
                for n in page {
                    let id = n.to_string();
                    if !expected.contains(&id) {
                        expected.push(id);
                    }
                }
            }

            let got: Vec<String> = store.articles().iter().map(|a| a.id.clone()).collect();
            prop_assert_eq!(got, expected);
        }
    }
}
