//! Key/value device storage.
//!
//! Every database is a single `items` table of JSON values keyed by string.
//! The app config store and each user's storage are separate databases.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tokio::sync::RwLock;
use tracing::debug;

use crate::Result;

/// Errors raised by device storage.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored value could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Could not create the data directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The storage was used before `init`.
    #[error("Storage used before initialization")]
    NotInitialized,
}

/// Result type for storage internals.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Asynchronous key/value store scoped to a named database.
#[async_trait]
pub trait DeviceStorage: Send + Sync {
    /// Open (or create) the database called `name`, replacing any open one.
    async fn init(&self, name: &str) -> Result<()>;

    /// Read a single item.
    async fn get_item(&self, key: &str) -> Result<Option<Value>>;

    /// Read every item whose key starts with `prefix`, ordered by key.
    async fn list_items(&self, prefix: &str) -> Result<Vec<(String, Value)>>;

    /// Insert or replace an item.
    async fn store_item(&self, key: &str, value: Value) -> Result<()>;

    /// Remove a single item. Removing a missing key is not an error.
    async fn remove_item(&self, key: &str) -> Result<()>;

    /// Remove every item whose key starts with `prefix`, returning the count.
    async fn remove_prefix(&self, prefix: &str) -> Result<u64>;
}

/// Read an item and deserialize it into `T`.
///
/// # Errors
///
/// Returns an error if the read fails or the value has the wrong shape.
pub async fn get_typed<T: DeserializeOwned>(
    storage: &dyn DeviceStorage,
    key: &str,
) -> Result<Option<T>> {
    match storage.get_item(key).await? {
        Some(value) => Ok(Some(
            serde_json::from_value(value).map_err(StorageError::from)?,
        )),
        None => Ok(None),
    }
}

/// Serialize `value` and store it under `key`.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub async fn store_typed<T: Serialize + Sync>(
    storage: &dyn DeviceStorage,
    key: &str,
    value: &T,
) -> Result<()> {
    let value = serde_json::to_value(value).map_err(StorageError::from)?;
    storage.store_item(key, value).await
}

/// `SQLite`-backed device storage.
pub struct SqliteStorage {
    data_dir: Option<PathBuf>,
    pool: RwLock<Option<SqlitePool>>,
}

impl SqliteStorage {
    /// Create a storage that keeps its databases under `data_dir`.
    ///
    /// With `None` every database lives in memory. Nothing is opened until
    /// [`DeviceStorage::init`].
    #[must_use]
    pub fn new(data_dir: Option<PathBuf>) -> Self {
        Self {
            data_dir,
            pool: RwLock::new(None),
        }
    }

    async fn open(&self, name: &str) -> StorageResult<SqlitePool> {
        let pool = match &self.data_dir {
            Some(dir) => {
                tokio::fs::create_dir_all(dir).await?;
                let path = dir.join(format!("{}.db", file_stem(name)));
                let url = format!("sqlite:{}?mode=rwc", path.display());
                SqlitePoolOptions::new()
                    .max_connections(5)
                    .connect(&url)
                    .await?
            }
            // A single connection that never expires, or the data is gone.
            None => {
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect("sqlite::memory:")
                    .await?
            }
        };

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS items (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&pool)
        .await?;

        Ok(pool)
    }

    async fn pool(&self) -> StorageResult<SqlitePool> {
        self.pool
            .read()
            .await
            .clone()
            .ok_or(StorageError::NotInitialized)
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        let pool = self.pool().await?;
        let row = sqlx::query("SELECT value FROM items WHERE key = ?")
            .bind(key)
            .fetch_optional(&pool)
            .await?;

        match row {
            Some(row) => {
                let raw: String = row.get("value");
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<(String, Value)>> {
        let pool = self.pool().await?;
        let rows = sqlx::query(
            "SELECT key, value FROM items WHERE substr(key, 1, ?) = ? ORDER BY key",
        )
        .bind(prefix_len(prefix))
        .bind(prefix)
        .fetch_all(&pool)
        .await?;

        rows.into_iter()
            .map(|row| -> StorageResult<(String, Value)> {
                let key: String = row.get("key");
                let raw: String = row.get("value");
                Ok((key, serde_json::from_str(&raw)?))
            })
            .collect()
    }

    async fn put(&self, key: &str, value: &Value) -> StorageResult<()> {
        let pool = self.pool().await?;
        sqlx::query(
            r"
            INSERT INTO items (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
            ",
        )
        .bind(key)
        .bind(serde_json::to_string(value)?)
        .execute(&pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        let pool = self.pool().await?;
        sqlx::query("DELETE FROM items WHERE key = ?")
            .bind(key)
            .execute(&pool)
            .await?;
        Ok(())
    }

    async fn remove_all(&self, prefix: &str) -> StorageResult<u64> {
        let pool = self.pool().await?;
        let result = sqlx::query("DELETE FROM items WHERE substr(key, 1, ?) = ?")
            .bind(prefix_len(prefix))
            .bind(prefix)
            .execute(&pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl DeviceStorage for SqliteStorage {
    async fn init(&self, name: &str) -> Result<()> {
        let pool = self.open(name).await?;
        let previous = self.pool.write().await.replace(pool);
        if let Some(previous) = previous {
            previous.close().await;
        }
        debug!("Opened storage {name}");
        Ok(())
    }

    async fn get_item(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.get(key).await?)
    }

    async fn list_items(&self, prefix: &str) -> Result<Vec<(String, Value)>> {
        Ok(self.list(prefix).await?)
    }

    async fn store_item(&self, key: &str, value: Value) -> Result<()> {
        Ok(self.put(key, &value).await?)
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        Ok(self.remove(key).await?)
    }

    async fn remove_prefix(&self, prefix: &str) -> Result<u64> {
        Ok(self.remove_all(prefix).await?)
    }
}

/// Map a database name to a safe file stem.
fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `SQLite` `substr` counts characters, not bytes.
fn prefix_len(prefix: &str) -> i64 {
    i64::try_from(prefix.chars().count()).unwrap_or(i64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::Error;

    async fn storage() -> SqliteStorage {
        let storage = SqliteStorage::new(None);
        storage.init("test").await.unwrap();
        storage
    }

    #[tokio::test]
    async fn test_use_before_init() {
        let storage = SqliteStorage::new(None);
        let err = storage.get_item("key").await.unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_store_and_get() {
        let storage = storage().await;
        storage.store_item("a", json!({"n": 1})).await.unwrap();
        assert_eq!(storage.get_item("a").await.unwrap(), Some(json!({"n": 1})));

        storage.store_item("a", json!("replaced")).await.unwrap();
        assert_eq!(storage.get_item("a").await.unwrap(), Some(json!("replaced")));
        assert_eq!(storage.get_item("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_prefix_operations() {
        let storage = storage().await;
        storage.store_item("email_2", json!(2)).await.unwrap();
        storage.store_item("email_1", json!(1)).await.unwrap();
        storage.store_item("folders", json!([])).await.unwrap();

        let items = storage.list_items("email_").await.unwrap();
        let keys: Vec<_> = items.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["email_1", "email_2"]);

        assert_eq!(storage.remove_prefix("email_").await.unwrap(), 2);
        assert!(storage.list_items("email_").await.unwrap().is_empty());
        assert!(storage.get_item("folders").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_prefix_is_literal() {
        let storage = storage().await;
        storage.store_item("a%b", json!(1)).await.unwrap();
        storage.store_item("axb", json!(2)).await.unwrap();
        assert_eq!(storage.list_items("a%").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_typed_helpers() {
        let storage = storage().await;
        store_typed(&storage, "version", &3_u32).await.unwrap();
        let version: Option<u32> = get_typed(&storage, "version").await.unwrap();
        assert_eq!(version, Some(3));
    }

    #[tokio::test]
    async fn test_reinit_replaces_database() {
        let storage = storage().await;
        storage.store_item("a", json!(1)).await.unwrap();
        storage.init("other").await.unwrap();
        assert_eq!(storage.get_item("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_backed_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::new(Some(dir.path().to_path_buf()));
        storage.init("alice@bob.com").await.unwrap();
        storage.store_item("a", json!(true)).await.unwrap();
        assert!(dir.path().join("alice_bob.com.db").exists());

        let reopened = SqliteStorage::new(Some(dir.path().to_path_buf()));
        reopened.init("alice@bob.com").await.unwrap();
        assert_eq!(reopened.get_item("a").await.unwrap(), Some(json!(true)));
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("app-config"), "app-config");
        assert_eq!(file_stem("alice@bob.com"), "alice_bob.com");
        assert_eq!(file_stem("../etc"), ".._etc");
    }
}
