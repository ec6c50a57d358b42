//! Filesystem caches persisted as container images
//!
//! A cache entry is a directory tree stored as an image in local container
//! storage. Mounting it creates a working container from the entry's latest
//! image (or an empty one on first use); unmounting commits the container
//! back into a new image revision when its content changed.
//!
//! # Lifecycle
//!
//! | Step | Mount | Unmount |
//! |------|-------|---------|
//! | 1 | validate, derive name | validate, derive name |
//! | 2 | resolve image | unbind external dirs |
//! | 3 | create external dir | find container (name, then path) |
//! | 4 | acquire container (scratch fallback) | unmount |
//! | 5 | mount, record + bind external dir | commit if changed, push |
//! | 6 | | delete container |

pub mod acquire;
pub mod bind;
pub mod commit;
pub mod image;
pub mod options;
pub mod rollback;
pub mod store;

pub use bind::{BindMount, SysBindMount};
pub use commit::CommitResult;
pub use image::{ImageReference, Transport, SCRATCH};
pub use options::{cache_image_name, derive_container_name, MountOptions, MOUNT_DIR_ARG};
pub use store::{CacheStore, UnmountOutcome};
