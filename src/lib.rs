//! apidex - incremental metadata indexer
//!
//! Resolves package and image sources against their upstream registries,
//! caches each result under a content fingerprint, and publishes a
//! manifest that only changes where upstream changed.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod indexer;
pub mod invalidate;
pub mod journal;
pub mod manifest;
pub mod record;
pub mod registry;
pub mod resolve;
pub mod scheduler;
pub mod ui;
pub mod upstream;

pub use error::{IndexError, IndexResult};
pub use indexer::Indexer;
