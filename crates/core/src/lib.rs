//! Core types and shared functionality for the offline cache worker.
//!
//! This crate provides:
//! - Cache store with SQLite backend, partitioned into named generations
//! - Generation manager and refresh policy
//! - Worker ⇄ page message protocol
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod messages;
pub mod policy;

pub use cache::{CacheDb, CacheEntry, GenerationHandle, GenerationManager};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use error::Error;
pub use http::{Request, RequestMode, Response, ResponseKind};
pub use messages::{PageMessage, WorkerMessage};
pub use policy::{FetchStrategy, PolicyState, RefreshPolicy};
