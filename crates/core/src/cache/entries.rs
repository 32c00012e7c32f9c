//! Cache entry rows.
//!
//! One row per (partition, normalized key). Writes replace the whole row in a
//! single statement, so an entry is either the complete old response or the
//! complete new one. Every write takes the next value of a global insertion
//! sequence, which is what overflow eviction orders by.

use super::connection::CacheDb;
use super::hash::body_digest;
use super::key::CacheKey;
use crate::{Error, Response};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

const UPSERT_ENTRY: &str = "INSERT INTO cache_entries (
        partition_key, cache_key, url, status, headers_json, body, body_sha256, seq, stored_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, (SELECT COALESCE(MAX(seq), 0) + 1 FROM cache_entries), ?8)
    ON CONFLICT(partition_key, cache_key) DO UPDATE SET
        url = excluded.url,
        status = excluded.status,
        headers_json = excluded.headers_json,
        body = excluded.body,
        body_sha256 = excluded.body_sha256,
        seq = excluded.seq,
        stored_at = excluded.stored_at";

/// Entry metadata without the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct EntryMeta {
    pub partition_key: String,
    pub cache_key: String,
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body_len: u64,
    pub body_sha256: String,
    pub stored_at: String,
}

/// A response flattened into column values.
struct EntryRow {
    cache_key: String,
    url: String,
    status: i64,
    headers_json: String,
    body: Vec<u8>,
    body_sha256: String,
}

impl EntryRow {
    fn from_response(key: &CacheKey, response: Response) -> Result<Self, Error> {
        let headers_json = serde_json::to_string(response.headers())
            .map_err(|e| Error::InvalidInput(format!("failed to encode headers: {e}")))?;
        let url = response.url().to_string();
        let status = i64::from(response.status());
        let body = response.into_body().to_vec();
        let body_sha256 = body_digest(&body);
        Ok(Self { cache_key: key.as_str().to_string(), url, status, headers_json, body, body_sha256 })
    }

    fn insert(&self, conn: &rusqlite::Connection, partition_key: &str, stored_at: &str) -> Result<(), Error> {
        conn.execute(
            UPSERT_ENTRY,
            params![
                partition_key,
                &self.cache_key,
                &self.url,
                self.status,
                &self.headers_json,
                &self.body,
                &self.body_sha256,
                stored_at,
            ],
        )?;
        Ok(())
    }
}

fn decode_headers(cache_key: &str, json: &str) -> Result<Vec<(String, String)>, Error> {
    serde_json::from_str(json).map_err(|e| Error::CorruptEntry(format!("{cache_key}: headers: {e}")))
}

fn decode_status(cache_key: &str, status: i64) -> Result<u16, Error> {
    u16::try_from(status).map_err(|_| Error::CorruptEntry(format!("{cache_key}: status {status}")))
}

impl CacheDb {
    /// Insert or replace one entry.
    ///
    /// The replaced entry moves to the newest insertion position.
    pub async fn put_entry(&self, partition_key: &str, key: &CacheKey, response: Response) -> Result<(), Error> {
        let row = EntryRow::from_response(key, response)?;
        let partition_key = partition_key.to_string();
        let stored_at = Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| -> Result<(), Error> { row.insert(conn, &partition_key, &stored_at) })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace a batch of entries in one transaction.
    ///
    /// Either every entry is stored or none is.
    pub async fn put_entries(&self, partition_key: &str, entries: Vec<(CacheKey, Response)>) -> Result<(), Error> {
        let rows = entries
            .into_iter()
            .map(|(key, response)| EntryRow::from_response(&key, response))
            .collect::<Result<Vec<_>, _>>()?;
        let partition_key = partition_key.to_string();
        let stored_at = Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                for row in &rows {
                    row.insert(&tx, &partition_key, &stored_at)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get an entry as a response.
    ///
    /// Returns None if the key doesn't exist in the partition.
    pub async fn get_entry(&self, partition_key: &str, key: &CacheKey) -> Result<Option<Response>, Error> {
        let partition_key = partition_key.to_string();
        let cache_key = key.as_str().to_string();
        self.conn
            .call(move |conn| -> Result<Option<Response>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT url, status, headers_json, body, body_sha256
                    FROM cache_entries WHERE partition_key = ?1 AND cache_key = ?2",
                )?;

                let result = stmt.query_row(params![partition_key, cache_key], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Vec<u8>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                });

                let (url, status, headers_json, body, digest) = match result {
                    Ok(row) => row,
                    Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                    Err(e) => return Err(e.into()),
                };

                if body_digest(&body) != digest {
                    return Err(Error::CorruptEntry(format!("{cache_key}: body digest mismatch")));
                }

                let status = decode_status(&cache_key, status)?;
                let headers = decode_headers(&cache_key, &headers_json)?;
                Ok(Some(Response::new(url, status, headers, body)))
            })
            .await
            .map_err(Error::from)
    }

    /// Get entry metadata without loading the body.
    pub async fn get_entry_meta(&self, partition_key: &str, key: &CacheKey) -> Result<Option<EntryMeta>, Error> {
        let partition_key = partition_key.to_string();
        let cache_key = key.as_str().to_string();
        self.conn
            .call(move |conn| -> Result<Option<EntryMeta>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT url, status, headers_json, LENGTH(body), body_sha256, stored_at
                    FROM cache_entries WHERE partition_key = ?1 AND cache_key = ?2",
                )?;

                let result = stmt.query_row(params![&partition_key, &cache_key], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                });

                match result {
                    Ok((url, status, headers_json, body_len, body_sha256, stored_at)) => Ok(Some(EntryMeta {
                        status: decode_status(&cache_key, status)?,
                        headers: decode_headers(&cache_key, &headers_json)?,
                        partition_key,
                        cache_key,
                        url,
                        body_len: body_len as u64,
                        body_sha256,
                        stored_at,
                    })),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Keys in a partition, oldest insertion first.
    pub async fn list_entry_keys(&self, partition_key: &str) -> Result<Vec<String>, Error> {
        let partition_key = partition_key.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt =
                    conn.prepare("SELECT cache_key FROM cache_entries WHERE partition_key = ?1 ORDER BY seq ASC")?;
                let rows = stmt.query_map(params![partition_key], |row| row.get::<_, String>(0))?;
                let keys = rows.collect::<Result<Vec<_>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn count_entries(&self, partition_key: &str) -> Result<u64, Error> {
        let partition_key = partition_key.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM cache_entries WHERE partition_key = ?1",
                    params![partition_key],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete one entry. Returns whether it existed.
    pub async fn delete_entry(&self, partition_key: &str, key: &CacheKey) -> Result<bool, Error> {
        let partition_key = partition_key.to_string();
        let cache_key = key.as_str().to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute(
                    "DELETE FROM cache_entries WHERE partition_key = ?1 AND cache_key = ?2",
                    params![partition_key, cache_key],
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete the oldest entries until the partition holds at most `max_entries`.
    ///
    /// Returns the number of deleted entries.
    pub async fn evict_overflow(&self, partition_key: &str, max_entries: usize) -> Result<u64, Error> {
        let partition_key = partition_key.to_string();
        let max = max_entries as i64;
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM cache_entries WHERE partition_key = ?1",
                    params![&partition_key],
                    |row| row.get(0),
                )?;
                if count <= max {
                    return Ok(0);
                }

                let to_delete = count - max;
                let deleted = conn.execute(
                    "DELETE FROM cache_entries WHERE partition_key = ?1 AND cache_key IN (
                        SELECT cache_key FROM cache_entries WHERE partition_key = ?1
                        ORDER BY seq ASC LIMIT ?2
                    )",
                    params![&partition_key, to_delete],
                )?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::key::KeyNormalizer;
    use crate::cache::version::CacheVersion;

    async fn setup() -> (CacheDb, String) {
        let db = CacheDb::open_in_memory().await.unwrap();
        let v = CacheVersion::new("app", "1").unwrap();
        let key = db.ensure_partition(&v, "api").await.unwrap();
        (db, key)
    }

    fn response(url: &str, body: &str) -> Response {
        Response::new(url, 200, vec![("Content-Type".into(), "application/json".into())], body.to_string())
    }

    #[tokio::test]
    async fn test_put_and_get_entry() {
        let (db, partition) = setup().await;
        let key = KeyNormalizer::default().normalize("https://app.test/api/users?_dc=1");

        db.put_entry(&partition, &key, response("https://app.test/api/users?_dc=1", "[1,2]"))
            .await
            .unwrap();

        let stored = db.get_entry(&partition, &key).await.unwrap().unwrap();
        assert_eq!(stored.status(), 200);
        assert_eq!(stored.body().as_ref(), b"[1,2]");
        assert_eq!(stored.header("content-type"), Some("application/json"));
    }

    #[tokio::test]
    async fn test_get_missing_entry() {
        let (db, partition) = setup().await;
        let key = KeyNormalizer::default().normalize("https://app.test/nothing");
        assert!(db.get_entry(&partition, &key).await.unwrap().is_none());
        assert!(db.get_entry_meta(&partition, &key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_one_entry_per_key() {
        let (db, partition) = setup().await;
        let n = KeyNormalizer::default();

        db.put_entry(&partition, &n.normalize("https://app.test/a?_dc=1"), response("https://app.test/a?_dc=1", "old"))
            .await
            .unwrap();
        db.put_entry(&partition, &n.normalize("https://app.test/a?_dc=2"), response("https://app.test/a?_dc=2", "new"))
            .await
            .unwrap();

        assert_eq!(db.count_entries(&partition).await.unwrap(), 1);
        let stored = db.get_entry(&partition, &n.normalize("https://app.test/a")).await.unwrap().unwrap();
        assert_eq!(stored.body().as_ref(), b"new");
    }

    #[tokio::test]
    async fn test_evict_overflow_removes_oldest() {
        let (db, partition) = setup().await;
        let n = KeyNormalizer::default();

        for i in 0..4 {
            let url = format!("https://app.test/item/{i}");
            db.put_entry(&partition, &n.normalize(&url), response(&url, "x")).await.unwrap();
        }

        let deleted = db.evict_overflow(&partition, 3).await.unwrap();
        assert_eq!(deleted, 1);

        let keys = db.list_entry_keys(&partition).await.unwrap();
        assert_eq!(keys, vec!["https://app.test/item/1", "https://app.test/item/2", "https://app.test/item/3"]);
    }

    #[tokio::test]
    async fn test_rewrite_moves_entry_to_newest() {
        let (db, partition) = setup().await;
        let n = KeyNormalizer::default();
        for url in ["https://app.test/a", "https://app.test/b", "https://app.test/a"] {
            db.put_entry(&partition, &n.normalize(url), response(url, "x")).await.unwrap();
        }

        let keys = db.list_entry_keys(&partition).await.unwrap();
        assert_eq!(keys, vec!["https://app.test/b", "https://app.test/a"]);
    }

    #[tokio::test]
    async fn test_evict_under_limit_is_noop() {
        let (db, partition) = setup().await;
        assert_eq!(db.evict_overflow(&partition, 10).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_put_entries_batch() {
        let (db, partition) = setup().await;
        let n = KeyNormalizer::default();
        let batch = vec![
            (n.normalize("https://app.test/app.js"), response("https://app.test/app.js", "js")),
            (n.normalize("https://app.test/app.css"), response("https://app.test/app.css", "css")),
        ];

        db.put_entries(&partition, batch).await.unwrap();
        assert_eq!(db.count_entries(&partition).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_entry_meta() {
        let (db, partition) = setup().await;
        let key = KeyNormalizer::default().normalize("https://app.test/api/users");
        db.put_entry(&partition, &key, response("https://app.test/api/users", "abc")).await.unwrap();

        let meta = db.get_entry_meta(&partition, &key).await.unwrap().unwrap();
        assert_eq!(meta.body_len, 3);
        assert_eq!(meta.body_sha256, body_digest(b"abc"));
        assert_eq!(meta.cache_key, "https://app.test/api/users");
    }

    #[tokio::test]
    async fn test_corrupt_body_is_reported() {
        let (db, partition) = setup().await;
        let key = KeyNormalizer::default().normalize("https://app.test/a");
        db.put_entry(&partition, &key, response("https://app.test/a", "good")).await.unwrap();

        db.conn
            .call(|conn| conn.execute("UPDATE cache_entries SET body = X'00'", []))
            .await
            .unwrap();

        let result = db.get_entry(&partition, &key).await;
        assert!(matches!(result, Err(Error::CorruptEntry(_))));
    }

    #[tokio::test]
    async fn test_deleting_partition_cascades() {
        let (db, partition) = setup().await;
        let key = KeyNormalizer::default().normalize("https://app.test/a");
        db.put_entry(&partition, &key, response("https://app.test/a", "x")).await.unwrap();

        db.delete_partition(&partition).await.unwrap();
        assert_eq!(db.count_entries(&partition).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_entry() {
        let (db, partition) = setup().await;
        let key = KeyNormalizer::default().normalize("https://app.test/a");
        db.put_entry(&partition, &key, response("https://app.test/a", "x")).await.unwrap();
        assert!(db.delete_entry(&partition, &key).await.unwrap());
        assert!(!db.delete_entry(&partition, &key).await.unwrap());
    }
}
