//! Keyed storage for dataflow statistics.
//!
//! The store is a hierarchical key/value space addressed by `/`-separated
//! paths, the shape of a KV secrets engine. Reads and writes are per leaf;
//! `list` returns the immediate children of a path with sub-directories
//! suffixed by `/`.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::RwLock,
};

use serde_json::{Map, Value};

use crate::error::{Error, Result};

#[cfg(feature = "sqlite")]
use crate::error::Context as _;

/// Backing store for persisted statistics.
#[async_trait::async_trait]
pub trait StatStore: Send + Sync {
    /// Create or replace the record at `path`.
    async fn write(&self, path: &str, record: &Map<String, Value>) -> Result<()>;

    /// Immediate children of `path`, sorted. Sub-directories end in `/`.
    async fn list(&self, path: &str) -> Result<Vec<String>>;

    /// The record at `path`, if any.
    async fn read(&self, path: &str) -> Result<Option<Map<String, Value>>>;
}

fn normalize(path: &str) -> &str {
    path.trim_matches('/')
}

/// Process-local store, used by tests and by hosts without a durable backend.
#[derive(Default)]
pub struct MemoryStatStore {
    records: RwLock<BTreeMap<String, Map<String, Value>>>,
}

impl MemoryStatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored path, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.records
            .read()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl StatStore for MemoryStatStore {
    async fn write(&self, path: &str, record: &Map<String, Value>) -> Result<()> {
        let mut records = self
            .records
            .write()
            .map_err(|_| Error::message("statistic store lock poisoned"))?;
        records.insert(normalize(path).to_string(), record.clone());
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<String>> {
        let records = self
            .records
            .read()
            .map_err(|_| Error::message("statistic store lock poisoned"))?;
        let prefix = format!("{}/", normalize(path));
        let children: BTreeSet<String> = records
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| {
                let rest = &k[prefix.len()..];
                match rest.split_once('/') {
                    Some((dir, _)) => format!("{dir}/"),
                    None => rest.to_string(),
                }
            })
            .collect();
        Ok(children.into_iter().collect())
    }

    async fn read(&self, path: &str) -> Result<Option<Map<String, Value>>> {
        let records = self
            .records
            .read()
            .map_err(|_| Error::message("statistic store lock poisoned"))?;
        Ok(records.get(normalize(path)).cloned())
    }
}

/// SQLite-backed store.
///
/// Each record is one row keyed by its full path, with the parent path and
/// leaf name split out so `list` is a single indexed lookup.
#[cfg(feature = "sqlite")]
pub struct SqliteStatStore {
    pool: sqlx::SqlitePool,
}

#[cfg(feature = "sqlite")]
impl SqliteStatStore {
    /// Open or create the database at `path`.
    pub async fn new(path: &std::path::Path) -> Result<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = sqlx::SqlitePool::connect(&db_url)
            .await
            .with_context(|| format!("opening statistics database {}", path.display()))?;
        Self::with_pool(pool).await
    }

    /// Use an existing pool, creating the table if needed.
    pub async fn with_pool(pool: sqlx::SqlitePool) -> Result<Self> {
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    async fn migrate(pool: &sqlx::SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dataflow_statistics (
                path TEXT PRIMARY KEY NOT NULL,
                parent TEXT NOT NULL,
                name TEXT NOT NULL,
                record TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_dataflow_statistics_parent
            ON dataflow_statistics(parent)
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[cfg(feature = "sqlite")]
#[async_trait::async_trait]
impl StatStore for SqliteStatStore {
    async fn write(&self, path: &str, record: &Map<String, Value>) -> Result<()> {
        let path = normalize(path);
        let (parent, name) = path.rsplit_once('/').unwrap_or(("", path));
        let json = serde_json::to_string(record)?;

        sqlx::query(
            r#"
            INSERT INTO dataflow_statistics (path, parent, name, record, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                record = excluded.record,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(path)
        .bind(parent)
        .bind(name)
        .bind(json)
        .bind(time::OffsetDateTime::now_utc().unix_timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<String>> {
        let parent = normalize(path);
        let leaves: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM dataflow_statistics WHERE parent = ?")
                .bind(parent)
                .fetch_all(&self.pool)
                .await?;

        let dirs: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT parent FROM dataflow_statistics WHERE parent LIKE ? ESCAPE '\\'")
                .bind(format!("{}/%", escape_like(parent)))
                .fetch_all(&self.pool)
                .await?;

        let prefix = format!("{parent}/");
        let mut children: BTreeSet<String> = leaves.into_iter().map(|(name,)| name).collect();
        for (dir,) in dirs {
            if let Some(rest) = dir.strip_prefix(&prefix) {
                let first = rest.split('/').next().unwrap_or(rest);
                children.insert(format!("{first}/"));
            }
        }
        Ok(children.into_iter().collect())
    }

    async fn read(&self, path: &str) -> Result<Option<Map<String, Value>>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT record FROM dataflow_statistics WHERE path = ?")
                .bind(normalize(path))
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((json,)) => match serde_json::from_str::<Value>(&json)? {
                Value::Object(map) => Ok(Some(map)),
                _ => Err(Error::malformed(path, "stored record is not an object")),
            },
            None => Ok(None),
        }
    }
}

#[cfg(feature = "sqlite")]
fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn record(state: &str) -> Map<String, Value> {
        match json!({ "stateName": state }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    async fn exercise_listing(store: &dyn StatStore) {
        store.write("a/b/flow/1", &record("Start up")).await.unwrap();
        store.write("a/b/flow/0", &record("Shutdown")).await.unwrap();
        store.write("a/b/flow/nested/9", &record("deep")).await.unwrap();
        store.write("a/b/flowx/1", &record("other")).await.unwrap();

        assert_eq!(store.list("a/b/flow").await.unwrap(), vec![
            "0".to_string(),
            "1".to_string(),
            "nested/".to_string(),
        ]);
        assert_eq!(store.list("a/b/flow/").await.unwrap().len(), 3);
        assert!(store.list("a/missing").await.unwrap().is_empty());

        let read = store.read("a/b/flow/1").await.unwrap().unwrap();
        assert_eq!(read["stateName"], "Start up");
        assert!(store.read("a/b/flow/7").await.unwrap().is_none());

        store.write("a/b/flow/1", &record("replaced")).await.unwrap();
        let read = store.read("/a/b/flow/1").await.unwrap().unwrap();
        assert_eq!(read["stateName"], "replaced");
    }

    #[tokio::test]
    async fn memory_store_lists_immediate_children() {
        let store = MemoryStatStore::new();
        exercise_listing(&store).await;
        assert_eq!(store.len(), 4);
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn sqlite_store_lists_immediate_children() {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = SqliteStatStore::with_pool(pool).await.unwrap();
        exercise_listing(&store).await;
    }
}
