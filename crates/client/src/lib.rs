//! Client side of swcache.
//!
//! This crate provides the network fetcher, the caching strategies, the
//! precache loader and the worker lifecycle, wired together by
//! [`ServiceWorker`].

pub mod fetch;
pub mod lifecycle;
pub mod precache;
pub mod strategy;
pub mod worker;

#[cfg(test)]
mod testing;

pub use fetch::{FetchClient, FetchConfig, Fetcher};
pub use lifecycle::{Lifecycle, LifecycleStatus, WorkerState};
pub use precache::{PrecacheLoader, PrecacheReport};
pub use strategy::{Served, StrategyEngine};
pub use worker::{PurgeReport, ServiceWorker};
