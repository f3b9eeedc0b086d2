//! Client code for the offline cache worker.
//!
//! This crate provides the network transport the worker fetches through,
//! plus URL helpers shared by the worker and its host.

pub mod fetch;

pub use fetch::{FetchConfig, HttpNetwork, Network, UrlError, canonicalize, is_same_origin};
