//! Worker lifecycle: install, waiting, activate, control.
//!
//! At most one version is active and at most one newer version is pending.
//! A pending version moves `installing → waiting → activating` and then
//! replaces the active one. A failed install marks the pending version
//! redundant and leaves the active version serving.
//!
//! The active and waiting tags are written to the database on every
//! transition, so a restarted process resumes where it left off.

use serde::Serialize;
use tokio::sync::RwLock;

use swcache_core::{CacheStore, CacheVersion, Error, PRECACHE_PARTITION, PrecacheConfig};

use crate::precache::{PrecacheLoader, PrecacheReport};

/// Lifecycle state of a worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Precache in progress.
    Installing,
    /// Installed, waiting for clients of the previous version to go away.
    Waiting,
    /// Stale partitions being removed.
    Activating,
    /// Serving requests.
    Active,
    /// Install failed or the version was superseded.
    Redundant,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Installing => "installing",
            Self::Waiting => "waiting",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Redundant => "redundant",
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the lifecycle for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, schemars::JsonSchema)]
pub struct LifecycleStatus {
    /// State of the newest version: the pending one if it is still in
    /// flight, otherwise the active one.
    pub state: Option<WorkerState>,
    /// Tag of the active version.
    pub active: Option<String>,
    /// Tag of the pending version.
    pub pending: Option<String>,
    /// State of the pending version.
    pub pending_state: Option<WorkerState>,
    /// Whether open clients are routed through the active version.
    pub controlled: bool,
}

struct Pending {
    store: CacheStore,
    state: WorkerState,
}

#[derive(Default)]
struct Inner {
    active: Option<CacheStore>,
    pending: Option<Pending>,
    controlled: bool,
}

/// Remove the precache partition of a version that will never activate.
async fn discard_precache(store: &CacheStore) {
    let partition_key = store.version().partition_key(PRECACHE_PARTITION);
    if let Err(e) = store.db().delete_partition(&partition_key).await {
        tracing::warn!(partition = %partition_key, error = %e, "failed to remove abandoned precache");
    }
}

/// Drives version transitions and decides which version serves requests.
pub struct Lifecycle {
    skip_waiting: bool,
    clients_claim: bool,
    inner: RwLock<Inner>,
}

impl Lifecycle {
    /// Rebuild the lifecycle from persisted state.
    ///
    /// `template` supplies the database and partition options; stores for the
    /// persisted tags are derived from it. Clients are considered controlled
    /// when an active version exists.
    pub async fn restore(template: &CacheStore, skip_waiting: bool, clients_claim: bool) -> Result<Self, Error> {
        let stored = template.db().load_worker_state().await?;

        let active = stored
            .active_tag
            .as_deref()
            .map(CacheVersion::parse)
            .transpose()?
            .map(|version| template.with_version(version));
        let pending = stored
            .waiting_tag
            .as_deref()
            .map(CacheVersion::parse)
            .transpose()?
            .map(|version| Pending { store: template.with_version(version), state: WorkerState::Waiting });

        if let Some(store) = &active {
            tracing::info!(version = %store.version(), "resumed active version");
        }
        if let Some(pending) = &pending {
            tracing::info!(version = %pending.store.version(), "resumed waiting version");
        }

        let controlled = active.is_some();
        Ok(Self { skip_waiting, clients_claim, inner: RwLock::new(Inner { active, pending, controlled }) })
    }

    /// Install `store`'s version: precache the manifest, then wait (or
    /// activate at once when skip-waiting is set).
    ///
    /// Returns `None` without fetching anything if the version is already
    /// active or waiting.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if an install of the same version is in progress
    /// - `PrecacheFailed` if any manifest entry fails; the version becomes
    ///   redundant and its precache partition is removed
    pub async fn install(
        &self, store: CacheStore, loader: &PrecacheLoader, precache: &PrecacheConfig,
    ) -> Result<Option<PrecacheReport>, Error> {
        let tag = store.version().tag();
        {
            let mut inner = self.inner.write().await;
            if inner.active.as_ref().is_some_and(|a| a.version().tag() == tag) {
                tracing::debug!(version = %tag, "version already active, skipping install");
                return Ok(None);
            }
            if let Some(pending) = &inner.pending
                && pending.store.version().tag() == tag
            {
                match pending.state {
                    WorkerState::Installing => {
                        return Err(Error::InvalidState(format!("{tag} is already installing")));
                    }
                    WorkerState::Waiting | WorkerState::Activating => return Ok(None),
                    WorkerState::Active | WorkerState::Redundant => {}
                }
            }
            let superseded = inner
                .pending
                .as_ref()
                .filter(|p| p.state == WorkerState::Waiting)
                .map(|p| p.store.clone());
            if let Some(superseded) = superseded {
                superseded.db().set_waiting_tag(None).await?;
                discard_precache(&superseded).await;
                tracing::info!(version = %superseded.version(), "waiting version superseded");
            }
            inner.pending = Some(Pending { store: store.clone(), state: WorkerState::Installing });
        }

        tracing::info!(version = %tag, "installing");
        let result = loader.precache(&store, precache).await;

        let report = {
            let mut inner = self.inner.write().await;
            match result {
                Ok(report) => {
                    if let Err(e) = store.db().set_waiting_tag(Some(&tag)).await {
                        inner.pending = Some(Pending { store: store.clone(), state: WorkerState::Redundant });
                        return Err(e);
                    }
                    inner.pending = Some(Pending { store: store.clone(), state: WorkerState::Waiting });
                    tracing::info!(version = %tag, stored = report.stored, "installed, waiting");
                    report
                }
                Err(e) => {
                    inner.pending = Some(Pending { store: store.clone(), state: WorkerState::Redundant });
                    discard_precache(&store).await;
                    tracing::warn!(version = %tag, error = %e, "install failed, version is redundant");
                    return Err(e);
                }
            }
        };

        if self.skip_waiting {
            self.activate().await?;
        }
        Ok(Some(report))
    }

    /// Promote the waiting version: delete every partition of other versions,
    /// persist the new active tag and, with clients-claim, take control of
    /// open clients.
    ///
    /// Returns the deleted partition keys.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if no version is waiting.
    pub async fn activate(&self) -> Result<Vec<String>, Error> {
        let mut inner = self.inner.write().await;
        let store = match &mut inner.pending {
            Some(pending) if pending.state == WorkerState::Waiting => {
                pending.state = WorkerState::Activating;
                pending.store.clone()
            }
            Some(pending) => {
                return Err(Error::InvalidState(format!(
                    "{} is {}, not waiting",
                    pending.store.version(),
                    pending.state
                )));
            }
            None => return Err(Error::InvalidState("no version is waiting".into())),
        };

        let tag = store.version().tag();
        let promoted = async {
            let deleted = store.cleanup_stale().await?;
            store.db().promote_tag(&tag).await?;
            Ok::<_, Error>(deleted)
        }
        .await;

        match promoted {
            Ok(deleted) => {
                inner.pending = None;
                inner.active = Some(store);
                inner.controlled = inner.controlled || self.clients_claim;
                tracing::info!(version = %tag, controlled = inner.controlled, "activated");
                Ok(deleted)
            }
            Err(e) => {
                if let Some(pending) = &mut inner.pending {
                    pending.state = WorkerState::Waiting;
                }
                Err(e)
            }
        }
    }

    /// Every open client has gone away. A waiting version activates now; the
    /// next navigation is controlled by the active version.
    pub async fn release_clients(&self) -> Result<Option<Vec<String>>, Error> {
        self.inner.write().await.controlled = false;

        let waiting = self
            .inner
            .read()
            .await
            .pending
            .as_ref()
            .is_some_and(|p| p.state == WorkerState::Waiting);
        if waiting { self.activate().await.map(Some) } else { Ok(None) }
    }

    /// The store that serves a request, or `None` when the client is not
    /// controlled. A navigation brings the client under control of the active
    /// version.
    pub async fn controlling_store(&self, navigate: bool) -> Option<CacheStore> {
        if navigate {
            let mut inner = self.inner.write().await;
            if inner.active.is_some() && !inner.controlled {
                inner.controlled = true;
                tracing::debug!("navigation brought clients under control");
            }
            return inner.active.clone();
        }

        let inner = self.inner.read().await;
        if inner.controlled { inner.active.clone() } else { None }
    }

    pub async fn is_active(&self, version: &CacheVersion) -> bool {
        self.inner
            .read()
            .await
            .active
            .as_ref()
            .is_some_and(|active| active.version() == version)
    }

    /// The active store regardless of client control.
    pub async fn active_store(&self) -> Option<CacheStore> {
        self.inner.read().await.active.clone()
    }

    pub async fn status(&self) -> LifecycleStatus {
        let inner = self.inner.read().await;
        let state = match (&inner.pending, &inner.active) {
            (Some(p), Some(_)) if p.state == WorkerState::Redundant => Some(WorkerState::Active),
            (Some(p), _) => Some(p.state),
            (None, Some(_)) => Some(WorkerState::Active),
            (None, None) => None,
        };
        LifecycleStatus {
            state,
            active: inner.active.as_ref().map(|s| s.version().tag()),
            pending: inner.pending.as_ref().map(|p| p.store.version().tag()),
            pending_state: inner.pending.as_ref().map(|p| p.state),
            controlled: inner.controlled,
        }
    }
}
