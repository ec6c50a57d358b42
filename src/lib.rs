//! layercache - Filesystem caches persisted as OCI images
//!
//! Mounts named cache directories backed by container images and commits
//! them back into new image revisions when their content changed.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod storage;

pub use error::{LayerCacheError, LayerCacheResult};
