//! Install-time precaching of the static asset manifest.
//!
//! Every manifest entry is fetched with bounded concurrency and the whole
//! batch is written to the `precache` partition in one transaction. A single
//! failed fetch or non-2xx status abandons the batch, so a partially cached
//! manifest is never visible.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

use swcache_core::{CacheStore, Error, PRECACHE_PARTITION, PrecacheConfig, Request, Response};

use crate::fetch::{Fetcher, resolve};

/// Outcome of a completed precache run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, schemars::JsonSchema)]
pub struct PrecacheReport {
    /// Version tag the manifest was stored under.
    pub version: String,
    /// Storage key of the precache partition.
    pub partition: String,
    /// Number of manifest entries stored.
    pub stored: usize,
    /// Total body bytes stored.
    pub bytes: usize,
}

/// Fetches and stores the precache manifest.
#[derive(Clone)]
pub struct PrecacheLoader {
    fetcher: Arc<dyn Fetcher>,
    base: Option<Url>,
    concurrency: usize,
}

impl PrecacheLoader {
    pub fn new(fetcher: Arc<dyn Fetcher>, base: Option<Url>, concurrency: usize) -> Self {
        Self { fetcher, base, concurrency: concurrency.max(1) }
    }

    /// Absolute URLs of the manifest, in manifest order.
    pub fn manifest_urls(&self, precache: &PrecacheConfig) -> Result<Vec<Url>, Error> {
        precache
            .stripped_paths()
            .map(|path| resolve(self.base.as_ref(), path).map_err(|e| Error::InvalidUrl(format!("{path}: {e}"))))
            .collect()
    }

    /// Fetch every manifest entry and store the batch into the precache
    /// partition of `store`.
    ///
    /// # Errors
    ///
    /// Returns `PrecacheFailed` if any entry fails to fetch or answers with a
    /// non-2xx status. Nothing is stored in that case.
    pub async fn precache(&self, store: &CacheStore, precache: &PrecacheConfig) -> Result<PrecacheReport, Error> {
        let urls = self.manifest_urls(precache)?;
        let partition = store.open(PRECACHE_PARTITION).await?;

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set = JoinSet::new();

        for (index, url) in urls.into_iter().enumerate() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| Error::PrecacheFailed(e.to_string()))?;
            let fetcher = self.fetcher.clone();

            join_set.spawn(async move {
                let _permit = permit;
                let result = fetcher.fetch(&Request::get(url.as_str())).await;
                (index, url, result)
            });
        }

        let mut fetched: Vec<(usize, Url, Response)> = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            let (index, url, result) = joined.map_err(|e| Error::PrecacheFailed(e.to_string()))?;
            let response = match result {
                Ok(response) if response.is_success() => response,
                Ok(response) => {
                    join_set.abort_all();
                    return Err(Error::PrecacheFailed(format!("{url}: status {}", response.status())));
                }
                Err(e) => {
                    join_set.abort_all();
                    return Err(Error::PrecacheFailed(format!("{url}: {e}")));
                }
            };
            tracing::debug!(%url, bytes = response.body().len(), "precached manifest entry");
            fetched.push((index, url, response));
        }

        fetched.sort_by_key(|(index, _, _)| *index);
        let bytes = fetched.iter().map(|(_, _, response)| response.body().len()).sum();
        let entries: Vec<_> = fetched
            .into_iter()
            .map(|(_, url, response)| (store.key_for(url.as_str()), response))
            .collect();
        let stored = entries.len();

        store.put_all(&partition, entries).await?;
        tracing::info!(version = %store.version(), stored, bytes, "precache complete");

        Ok(PrecacheReport { version: store.version().tag(), partition: partition.key().to_string(), stored, bytes })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::fetch::parse_base;
    use crate::strategy::test_support::store;
    use crate::testing::ScriptedFetcher;

    fn manifest(paths: &[&str]) -> PrecacheConfig {
        PrecacheConfig {
            strip_prefix: "build/production/MyApp/".into(),
            manifest: paths.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    fn loader(fetcher: Arc<ScriptedFetcher>) -> PrecacheLoader {
        PrecacheLoader::new(fetcher, Some(parse_base("https://app.test/").unwrap()), 2)
    }

    #[test]
    fn test_manifest_urls_strip_prefix_and_resolve() {
        let loader = loader(Arc::new(ScriptedFetcher::new()));
        let urls = loader
            .manifest_urls(&manifest(&["build/production/MyApp/index.html", "resources/app.css"]))
            .unwrap();
        let urls: Vec<_> = urls.iter().map(Url::as_str).collect();
        assert_eq!(urls, vec!["https://app.test/index.html", "https://app.test/resources/app.css"]);
    }

    #[test]
    fn test_manifest_relative_without_base_fails() {
        let loader = PrecacheLoader::new(Arc::new(ScriptedFetcher::new()), None, 2);
        let result = loader.manifest_urls(&manifest(&["index.html"]));
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_precache_stores_every_entry() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher
            .respond("https://app.test/index.html", 200, "<html>")
            .respond("https://app.test/app.js", 200, "js")
            .respond("https://app.test/resources/app.css", 200, "css");
        let store = store().await;

        let report = loader(fetcher.clone())
            .precache(
                &store,
                &manifest(&[
                    "build/production/MyApp/index.html",
                    "build/production/MyApp/app.js",
                    "build/production/MyApp/resources/app.css",
                ]),
            )
            .await
            .unwrap();

        assert_eq!(report.stored, 3);
        assert_eq!(report.bytes, 11);
        assert_eq!(report.partition, "app:1:precache");

        let partition = store.open(PRECACHE_PARTITION).await.unwrap();
        assert_eq!(store.len(&partition).await.unwrap(), 3);
        let css = store
            .get(&partition, &store.key_for("https://app.test/resources/app.css"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(css.body().as_ref(), b"css");
    }

    #[tokio::test]
    async fn test_one_failed_entry_abandons_batch() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher
            .respond("https://app.test/index.html", 200, "<html>")
            .fail("https://app.test/app.js")
            .respond("https://app.test/app.css", 200, "css");
        let store = store().await;

        let result = loader(fetcher)
            .precache(&store, &manifest(&["index.html", "app.js", "app.css"]))
            .await;

        assert!(matches!(result, Err(Error::PrecacheFailed(_))));
        let partition = store.open(PRECACHE_PARTITION).await.unwrap();
        assert_eq!(store.len(&partition).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_error_status_abandons_batch() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher
            .respond("https://app.test/index.html", 200, "<html>")
            .respond("https://app.test/gone.js", 404, "missing");
        let store = store().await;

        let err = loader(fetcher)
            .precache(&store, &manifest(&["index.html", "gone.js"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("status 404"), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_slow_entries_complete_before_install_returns() {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher
            .delay("https://app.test/a.js", Duration::from_millis(30), "a")
            .delay("https://app.test/b.js", Duration::from_millis(10), "b")
            .delay("https://app.test/c.js", Duration::from_millis(20), "c");
        let store = store().await;

        let report = loader(fetcher.clone())
            .precache(&store, &manifest(&["a.js", "b.js", "c.js"]))
            .await
            .unwrap();

        assert_eq!(report.stored, 3);
        assert_eq!(fetcher.total_calls(), 3);
        let partition = store.open(PRECACHE_PARTITION).await.unwrap();
        let keys = store.db().list_entry_keys(partition.key()).await.unwrap();
        assert_eq!(keys, vec!["https://app.test/a.js", "https://app.test/b.js", "https://app.test/c.js"]);
    }

    #[tokio::test]
    async fn test_empty_manifest_is_complete() {
        let store = store().await;
        let report = loader(Arc::new(ScriptedFetcher::new()))
            .precache(&store, &PrecacheConfig::default())
            .await
            .unwrap();
        assert_eq!(report.stored, 0);
    }
}
