//! Core data model definitions shared across reelwatch crates.
//!
//! Everything here is plain data: the pipeline in `reelwatch-core` owns the
//! behaviour (listing, diffing, resolving, composing, dispatching).
#![allow(missing_docs)]

pub use ::chrono;

pub mod change;
pub mod entry;
pub mod heartbeat;
pub mod metadata;

// Intentionally curated re-exports for downstream consumers.
pub use change::ChangeSet;
pub use entry::{EntryKey, FolderEntry, MonitoredPath};
pub use heartbeat::HeartbeatState;
pub use metadata::{FetchStatus, MediaMetadata, MetadataKey};
