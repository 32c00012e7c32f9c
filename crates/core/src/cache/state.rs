//! Persisted worker lifecycle state.
//!
//! A single row records which version tag is active and which, if any, is
//! installed and waiting. The row survives restarts so an already-active
//! version resumes serving without a reinstall.

use super::connection::CacheDb;
use crate::Error;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Stored version tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct StoredWorkerState {
    pub active_tag: Option<String>,
    pub waiting_tag: Option<String>,
    pub updated_at: Option<String>,
}

impl CacheDb {
    pub async fn load_worker_state(&self) -> Result<StoredWorkerState, Error> {
        self.conn
            .call(|conn| -> Result<StoredWorkerState, Error> {
                let result = conn.query_row(
                    "SELECT active_tag, waiting_tag, updated_at FROM worker_state WHERE id = 1",
                    [],
                    |row| {
                        Ok(StoredWorkerState {
                            active_tag: row.get(0)?,
                            waiting_tag: row.get(1)?,
                            updated_at: row.get(2)?,
                        })
                    },
                );

                match result {
                    Ok(state) => Ok(state),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(StoredWorkerState::default()),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Record `tag` as installed and waiting, or clear the waiting slot.
    pub async fn set_waiting_tag(&self, tag: Option<&str>) -> Result<(), Error> {
        let tag = tag.map(String::from);
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO worker_state (id, active_tag, waiting_tag, updated_at)
                    VALUES (1, NULL, ?1, ?2)
                    ON CONFLICT(id) DO UPDATE SET
                        waiting_tag = excluded.waiting_tag,
                        updated_at = excluded.updated_at",
                    params![tag, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Make `tag` the active version and clear the waiting slot.
    pub async fn promote_tag(&self, tag: &str) -> Result<(), Error> {
        let tag = tag.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO worker_state (id, active_tag, waiting_tag, updated_at)
                    VALUES (1, ?1, NULL, ?2)
                    ON CONFLICT(id) DO UPDATE SET
                        active_tag = excluded.active_tag,
                        waiting_tag = NULL,
                        updated_at = excluded.updated_at",
                    params![tag, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}
