//! Partition rows.
//!
//! A partition is a named, versioned region of the cache. Rows are created
//! lazily the first time a partition is opened; deleting a row cascades to
//! its entries.

use super::connection::CacheDb;
use super::version::CacheVersion;
use crate::Error;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;

/// Partition metadata with its current entry count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PartitionInfo {
    pub partition_key: String,
    pub tag: String,
    pub name: String,
    pub created_at: String,
    pub entry_count: u64,
}

impl CacheDb {
    /// Create the partition row if missing and return its key.
    pub async fn ensure_partition(&self, version: &CacheVersion, name: &str) -> Result<String, Error> {
        let partition_key = version.partition_key(name);
        let tag = version.tag();
        let name = name.to_string();
        let created_at = Utc::now().to_rfc3339();

        let key = partition_key.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO partitions (partition_key, tag, name, created_at)
                    VALUES (?1, ?2, ?3, ?4)",
                    params![key, tag, name, created_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(partition_key)
    }

    /// All partitions, ordered by key.
    pub async fn list_partitions(&self) -> Result<Vec<PartitionInfo>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<PartitionInfo>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT p.partition_key, p.tag, p.name, p.created_at, COUNT(e.cache_key)
                    FROM partitions p
                    LEFT JOIN cache_entries e ON e.partition_key = p.partition_key
                    GROUP BY p.partition_key
                    ORDER BY p.partition_key",
                )?;

                let rows = stmt.query_map([], |row| {
                    Ok(PartitionInfo {
                        partition_key: row.get(0)?,
                        tag: row.get(1)?,
                        name: row.get(2)?,
                        created_at: row.get(3)?,
                        entry_count: row.get::<_, i64>(4)? as u64,
                    })
                })?;

                let partitions = rows.collect::<Result<Vec<_>, _>>()?;
                Ok(partitions)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete one partition and its entries.
    ///
    /// Returns whether the partition existed.
    pub async fn delete_partition(&self, partition_key: &str) -> Result<bool, Error> {
        let partition_key = partition_key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM partitions WHERE partition_key = ?1", params![partition_key])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every partition whose tag differs from `keep_tag`.
    ///
    /// Returns the deleted partition keys.
    pub async fn delete_partitions_except_tag(&self, keep_tag: &str) -> Result<Vec<String>, Error> {
        let keep_tag = keep_tag.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let tx = conn.transaction()?;
                let stale = {
                    let mut stmt =
                        tx.prepare("SELECT partition_key FROM partitions WHERE tag != ?1 ORDER BY partition_key")?;
                    let rows = stmt.query_map(params![keep_tag], |row| row.get::<_, String>(0))?;
                    rows.collect::<Result<Vec<_>, _>>()?
                };
                tx.execute("DELETE FROM partitions WHERE tag != ?1", params![keep_tag])?;
                tx.commit()?;
                Ok(stale)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ensure_partition_is_idempotent() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let v = CacheVersion::new("app", "1").unwrap();

        let first = db.ensure_partition(&v, "api").await.unwrap();
        let second = db.ensure_partition(&v, "api").await.unwrap();
        assert_eq!(first, "app:1:api");
        assert_eq!(first, second);

        let partitions = db.list_partitions().await.unwrap();
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions[0].tag, "app:1");
        assert_eq!(partitions[0].name, "api");
        assert_eq!(partitions[0].entry_count, 0);
    }

    #[tokio::test]
    async fn test_delete_partitions_except_tag() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let old = CacheVersion::new("app", "1").unwrap();
        let new = CacheVersion::new("app", "2").unwrap();

        db.ensure_partition(&old, "api").await.unwrap();
        db.ensure_partition(&old, "images").await.unwrap();
        db.ensure_partition(&new, "api").await.unwrap();

        let deleted = db.delete_partitions_except_tag(&new.tag()).await.unwrap();
        assert_eq!(deleted, vec!["app:1:api".to_string(), "app:1:images".to_string()]);

        let remaining = db.list_partitions().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].partition_key, "app:2:api");
    }

    #[tokio::test]
    async fn test_delete_partition() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let v = CacheVersion::new("app", "1").unwrap();
        let key = db.ensure_partition(&v, "asset").await.unwrap();

        assert!(db.delete_partition(&key).await.unwrap());
        assert!(!db.delete_partition(&key).await.unwrap());
    }
}
