//! Persistent, capacity-bounded metadata cache keyed by URL.
//!
//! Values live in SQLite (`cache_entries`), recency stamps in a separate table
//! (`cache_index`) mirrored by an in-memory [`RecencyIndex`]. Membership and
//! eviction decisions use only the in-memory index; a read rewrites the stamp
//! row, never the value. When the item count exceeds the capacity, the oldest
//! tenth is evicted in one transaction.

mod db;
mod recency;

use anyhow::{Context, Result};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::metadata::MetadataMap;
use crate::sniff::ContainerKind;

pub use db::default_db_path;
use recency::RecencyIndex;

/// A cached value plus the bookkeeping stored next to it.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub metadata: MetadataMap,
    /// Unix milliseconds of the last `get` or `set`.
    pub last_access: i64,
    /// Parser revision that produced `metadata`.
    pub parser_revision: u32,
    pub container: ContainerKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    /// Entries recording "checked, nothing found".
    pub empty_entries: usize,
    pub oldest_access: Option<i64>,
    pub newest_access: Option<i64>,
}

/// Handle to the cache. Cheap to clone; clones share the pool and index.
#[derive(Clone)]
pub struct MetadataCache {
    pool: Pool<Sqlite>,
    index: Arc<Mutex<RecencyIndex>>,
    capacity: usize,
}

/// Entries evicted once the capacity is exceeded: a tenth, at least one.
pub fn eviction_batch(capacity: usize) -> usize {
    capacity.div_ceil(10).max(1)
}

impl MetadataCache {
    /// Open (or create) the cache under the XDG state directory.
    pub async fn open_default(capacity: usize) -> Result<Self> {
        let path = default_db_path()?;
        Self::open_at(&path, capacity).await
    }

    /// Open (or create) the cache at `path`. Creates parent dirs if needed.
    pub async fn open_at(path: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        let path = path.as_ref();
        let pool = db::connect_file(path)
            .await
            .with_context(|| format!("open metadata cache: {}", path.display()))?;
        Self::from_pool(pool, capacity).await
    }

    #[cfg(test)]
    pub(crate) async fn open_memory(capacity: usize) -> Result<Self> {
        Self::from_pool(db::connect_memory().await?, capacity).await
    }

    async fn from_pool(pool: Pool<Sqlite>, capacity: usize) -> Result<Self> {
        let mut index = RecencyIndex::default();
        for (url, stamp) in db::load_index(&pool).await? {
            index.restore(&url, stamp);
        }
        let cache = Self {
            pool,
            index: Arc::new(Mutex::new(index)),
            capacity: capacity.max(1),
        };
        // The configured capacity may have shrunk since the last run.
        let evicted = cache.evict_if_needed().await?;
        tracing::debug!(entries = cache.len(), evicted, "metadata cache opened");
        Ok(cache)
    }

    fn index(&self) -> MutexGuard<'_, RecencyIndex> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.index().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Membership from the in-memory index; no I/O.
    pub fn has(&self, url: &str) -> bool {
        self.index().contains(url)
    }

    pub async fn get(&self, url: &str) -> Result<Option<MetadataMap>> {
        Ok(self.get_entry(url).await?.map(|e| e.metadata))
    }

    /// Look up `url` and mark it as most recently used.
    pub async fn get_entry(&self, url: &str) -> Result<Option<CacheEntry>> {
        if !self.has(url) {
            return Ok(None);
        }
        let row = sqlx::query(
            "SELECT metadata_json, parser_revision, container FROM cache_entries WHERE url = ?",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            self.index().remove(url);
            return Ok(None);
        };

        let json: String = row.get("metadata_json");
        let metadata: MetadataMap = match serde_json::from_str(&json) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(%url, error = %e, "dropping unreadable cache entry");
                self.remove(url).await?;
                return Ok(None);
            }
        };
        let parser_revision: i64 = row.get("parser_revision");
        let container: String = row.get("container");

        let stamp = self.index().touch(url, db::unix_millis());
        sqlx::query("UPDATE cache_index SET last_access = ? WHERE url = ?")
            .bind(stamp)
            .bind(url)
            .execute(&self.pool)
            .await?;

        Ok(Some(CacheEntry {
            metadata,
            last_access: stamp,
            parser_revision: u32::try_from(parser_revision).unwrap_or(0),
            container: ContainerKind::from_str(&container),
        }))
    }

    /// Store `metadata` for `url` with no parser bookkeeping.
    pub async fn set(&self, url: &str, metadata: &MetadataMap) -> Result<()> {
        self.set_entry(url, metadata, ContainerKind::Unknown, 0).await
    }

    /// Store `metadata` for `url`, then evict if over capacity.
    pub async fn set_entry(
        &self,
        url: &str,
        metadata: &MetadataMap,
        container: ContainerKind,
        parser_revision: u32,
    ) -> Result<()> {
        let json = serde_json::to_string(metadata).context("serialize metadata")?;
        let stamp = self.index().touch(url, db::unix_millis());

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO cache_entries (url, metadata_json, parser_revision, container)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                metadata_json = excluded.metadata_json,
                parser_revision = excluded.parser_revision,
                container = excluded.container
            "#,
        )
        .bind(url)
        .bind(&json)
        .bind(i64::from(parser_revision))
        .bind(container.as_str())
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            r#"
            INSERT INTO cache_index (url, last_access) VALUES (?, ?)
            ON CONFLICT(url) DO UPDATE SET last_access = excluded.last_access
            "#,
        )
        .bind(url)
        .bind(stamp)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        self.evict_if_needed().await?;
        Ok(())
    }

    pub async fn remove(&self, url: &str) -> Result<bool> {
        let present = self.index().remove(url);
        self.delete_rows(&[url.to_string()]).await?;
        Ok(present)
    }

    pub async fn clear(&self) -> Result<()> {
        self.index().clear();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM cache_entries").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM cache_index").execute(&mut *tx).await?;
        tx.commit().await?;
        tracing::info!("metadata cache cleared");
        Ok(())
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM cache_entries WHERE metadata_json = '{}'")
            .fetch_one(&self.pool)
            .await?;
        let empty: i64 = row.get("n");
        let (entries, range) = {
            let index = self.index();
            (index.len(), index.oldest_and_newest())
        };
        Ok(CacheStats {
            entries,
            capacity: self.capacity,
            empty_entries: usize::try_from(empty).unwrap_or(0),
            oldest_access: range.map(|r| r.0),
            newest_access: range.map(|r| r.1),
        })
    }

    /// Evict the oldest batch when over capacity. Returns how many were evicted.
    async fn evict_if_needed(&self) -> Result<usize> {
        let victims = {
            let mut index = self.index();
            if index.len() <= self.capacity {
                return Ok(0);
            }
            let over = index.len() - self.capacity;
            index.take_oldest(eviction_batch(self.capacity).max(over))
        };
        self.delete_rows(&victims).await?;
        tracing::info!(evicted = victims.len(), "metadata cache eviction");
        Ok(victims.len())
    }

    async fn delete_rows(&self, urls: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for url in urls {
            sqlx::query("DELETE FROM cache_entries WHERE url = ?")
                .bind(url)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM cache_index WHERE url = ?")
                .bind(url)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
