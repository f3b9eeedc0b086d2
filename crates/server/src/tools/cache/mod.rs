//! Cache-related MCP tools.
//!
//! This module provides tools for inspecting and pruning the worker's cache
//! store directly, outside the fetch path.

pub mod get;
pub mod purge;
pub mod status;

pub use get::{CacheGetParams, get_impl};
pub use purge::{CachePurgeParams, purge_impl};
pub use status::status_impl;
