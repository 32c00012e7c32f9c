//! Versioned partition manager.
//!
//! A [`CacheStore`] is bound to one [`CacheVersion`]. It opens partitions
//! under that version's tag, reads and writes entries by [`CacheKey`], trims
//! partitions after writes, and deletes partitions of every other version on
//! cleanup.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::connection::CacheDb;
use super::entries::EntryMeta;
use super::key::{CacheKey, KeyNormalizer};
use super::version::CacheVersion;
use crate::config::{PartitionConfig, network_timeout_from_secs};
use crate::routes::RouteOptions;
use crate::{Error, Response};

/// An opened partition with its effective options.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    key: String,
    name: String,
    max_entries: Option<usize>,
    network_timeout: Option<Duration>,
}

impl Partition {
    /// Storage key, `{tag}:{name}`.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_entries(&self) -> Option<usize> {
        self.max_entries
    }

    pub fn network_timeout(&self) -> Option<Duration> {
        self.network_timeout
    }

    /// Apply route-level overrides on top of the partition's own options.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the timeout override is not a valid duration.
    pub fn with_overrides(mut self, options: &RouteOptions) -> Result<Self, Error> {
        if let Some(max) = options.max_entries {
            self.max_entries = Some(max);
        }
        if let Some(secs) = options.network_timeout_seconds {
            self.network_timeout = Some(network_timeout_from_secs(secs)?);
        }
        Ok(self)
    }
}

/// Partition manager for one cache version.
#[derive(Debug, Clone)]
pub struct CacheStore {
    db: CacheDb,
    version: CacheVersion,
    normalizer: Arc<KeyNormalizer>,
    partitions: Arc<BTreeMap<String, PartitionConfig>>,
}

impl CacheStore {
    pub fn new(
        db: CacheDb, version: CacheVersion, normalizer: Arc<KeyNormalizer>,
        partitions: Arc<BTreeMap<String, PartitionConfig>>,
    ) -> Self {
        Self { db, version, normalizer, partitions }
    }

    /// Same database, normalizer and partition options, bound to `version`.
    pub fn with_version(&self, version: CacheVersion) -> Self {
        Self { version, ..self.clone() }
    }

    pub fn db(&self) -> &CacheDb {
        &self.db
    }

    pub fn version(&self) -> &CacheVersion {
        &self.version
    }

    /// Normalized key for a request URL.
    pub fn key_for(&self, url: &str) -> CacheKey {
        self.normalizer.normalize(url)
    }

    /// Open a partition, creating it on first access.
    pub async fn open(&self, name: &str) -> Result<Partition, Error> {
        let key = self.db.ensure_partition(&self.version, name).await?;
        let config = self.partitions.get(name).copied().unwrap_or_default();
        Ok(Partition {
            key,
            name: name.to_string(),
            max_entries: config.max_entries,
            network_timeout: config.network_timeout()?,
        })
    }

    /// Read the entry under `key`. A row that fails to decode is deleted and
    /// reads as a miss.
    pub async fn get(&self, partition: &Partition, key: &CacheKey) -> Result<Option<Response>, Error> {
        match self.db.get_entry(&partition.key, key).await {
            Err(Error::CorruptEntry(reason)) => {
                tracing::warn!(partition = %partition.key, key = %key, reason, "dropping corrupt cache entry");
                if let Err(e) = self.db.delete_entry(&partition.key, key).await {
                    tracing::warn!(partition = %partition.key, key = %key, error = %e, "failed to delete corrupt entry");
                }
                Ok(None)
            }
            result => result,
        }
    }

    pub async fn meta(&self, partition: &Partition, key: &CacheKey) -> Result<Option<EntryMeta>, Error> {
        self.db.get_entry_meta(&partition.key, key).await
    }

    /// Store `response` under `key`, then trim the partition to its cap.
    pub async fn put(&self, partition: &Partition, key: &CacheKey, response: Response) -> Result<(), Error> {
        self.db.put_entry(&partition.key, key, response).await?;
        tracing::debug!(partition = %partition.key, key = %key, "stored cache entry");

        if let Some(max) = partition.max_entries {
            self.evict_overflow(partition, max).await?;
        }
        Ok(())
    }

    /// Store a batch atomically, then trim the partition to its cap.
    pub async fn put_all(&self, partition: &Partition, entries: Vec<(CacheKey, Response)>) -> Result<(), Error> {
        let count = entries.len();
        self.db.put_entries(&partition.key, entries).await?;
        tracing::debug!(partition = %partition.key, count, "stored cache batch");

        if let Some(max) = partition.max_entries {
            self.evict_overflow(partition, max).await?;
        }
        Ok(())
    }

    /// Delete the oldest entries beyond `max_entries`.
    pub async fn evict_overflow(&self, partition: &Partition, max_entries: usize) -> Result<u64, Error> {
        let evicted = self.db.evict_overflow(&partition.key, max_entries).await?;
        if evicted > 0 {
            tracing::debug!(partition = %partition.key, evicted, max_entries, "evicted overflow entries");
        }
        Ok(evicted)
    }

    pub async fn len(&self, partition: &Partition) -> Result<u64, Error> {
        self.db.count_entries(&partition.key).await
    }

    /// Delete every partition not tagged with this store's version.
    ///
    /// Returns the deleted partition keys.
    pub async fn cleanup_stale(&self) -> Result<Vec<String>, Error> {
        let deleted = self.db.delete_partitions_except_tag(&self.version.tag()).await?;
        if !deleted.is_empty() {
            tracing::info!(version = %self.version, deleted = ?deleted, "removed stale cache partitions");
        }
        Ok(deleted)
    }
}
