//! SQLite-backed cache store for HTTP responses, partitioned into generations.
//!
//! This module provides a persistent response cache using SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - Named generations, deleted as a unit (entries cascade)
//! - Request keys hashed from method, URL and vary headers
//! - Per-entry expiry for self-expiring writes
//! - A registry entry pointing at the current generation
//! - Automatic schema migrations

pub mod connection;
pub mod entries;
pub mod generations;
pub mod hash;
pub mod manager;
pub mod migrations;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::CacheEntry;
pub use generations::GenerationHandle;
pub use hash::RequestKey;
pub use manager::GenerationManager;

/// Reserved key of the synthetic entry holding the last full wipe time.
pub const REFRESH_RECORD_KEY: &str = "lastCacheClear";

/// Registry key naming the current generation.
pub const CURRENT_GENERATION_KEY: &str = "current_generation";
