//! Core types and shared functionality for swcache.
//!
//! This crate provides:
//! - Versioned cache storage with SQLite backend
//! - Request key normalization
//! - The ordered route table
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod response;
pub mod routes;

pub use cache::{CacheDb, CacheKey, CacheStore, CacheVersion, KeyNormalizer, Partition};
pub use config::{AppConfig, ConfigError, PRECACHE_PARTITION, PartitionConfig, PrecacheConfig};
pub use error::Error;
pub use response::{Request, Response, ResponseSource};
pub use routes::{RouteConfig, RouteDecision, RouteOptions, Router, Strategy};
