use anyhow::Result;
use async_trait::async_trait;
use sqlx::QueryBuilder;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::schema::Database;

/// Durable string key/value storage.
///
/// The sync engine never talks to a backend directly; it goes through
/// [`PersistentCache`](super::PersistentCache), which treats every error
/// returned here as non-fatal.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Read several keys at once. Missing keys yield `None` in their slot.
    async fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get(key).await?);
        }
        Ok(values)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Write several pairs; either all land or none do.
    async fn set_many(&self, pairs: &[(&str, String)]) -> Result<()>;

    async fn remove_many(&self, keys: &[&str]) -> Result<()>;
}

// ============================================================================
// SQLite backend
// ============================================================================

#[async_trait]
impl KeyValueStore for Database {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_many(&self, pairs: &[(&str, String)]) -> Result<()> {
        if pairs.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for (key, value) in pairs {
            sqlx::query(
                r#"
                INSERT INTO kv_store (key, value, updated_at)
                VALUES (?, ?, datetime('now'))
                ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            )
            .bind(*key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn remove_many(&self, keys: &[&str]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("DELETE FROM kv_store WHERE key IN (");
        let mut separated = builder.separated(", ");
        for key in keys {
            separated.push_bind(*key);
        }
        separated.push_unseparated(")");

        builder.build().execute(&self.pool).await?;
        Ok(())
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Process-local store. Used with `--ephemeral` and throughout the tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_many(&self, pairs: &[(&str, String)]) -> Result<()> {
        let mut entries = self.entries.lock().await;
        for (key, value) in pairs {
            entries.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }

    async fn remove_many(&self, keys: &[&str]) -> Result<()> {
        let mut entries = self.entries.lock().await;
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}
