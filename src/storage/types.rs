use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another instance of the application has locked the database
    #[error("Another instance of newsline appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_error(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) all mean
/// another process holds the file.
pub(crate) fn is_lock_error(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

// ============================================================================
// Data Structures
// ============================================================================

/// Publisher of an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
}

/// A normalized news article.
///
/// Identity is `id`. Values are never patched in place: a re-fetched article
/// replaces the old value wholesale wherever the list logic allows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    pub url: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub source: ArticleSource,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub countries: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
}

/// Result of reading the persisted news snapshot.
///
/// `articles` is `None` when nothing was ever saved or the read failed.
/// An expired snapshot is still returned; callers decide whether stale data
/// is acceptable.
#[derive(Debug, Clone, Default)]
pub struct CachedNews {
    pub articles: Option<Vec<Article>>,
    pub is_expired: bool,
}

impl CachedNews {
    /// An absent snapshot. Absence always counts as expired.
    pub fn absent() -> Self {
        Self {
            articles: None,
            is_expired: true,
        }
    }

    /// Articles if present and non-empty.
    pub fn usable(&self) -> Option<&[Article]> {
        self.articles.as_deref().filter(|a| !a.is_empty())
    }
}
