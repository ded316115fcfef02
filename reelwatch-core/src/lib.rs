//! # Reelwatch Core
//!
//! Synchronization and notification pipeline for reelwatch: keeps a chat
//! channel in sync with the top-level folders of one or more media library
//! directories.
//!
//! ## Overview
//!
//! A scan cycle flows through these components, leaves first:
//!
//! - [`scanner`]: filesystem capability and the diff engine that turns a
//!   fresh listing plus the committed [`persistence::Snapshot`] into a
//!   [`ChangeSet`]
//! - [`metadata`]: folder name parsing, the metadata cache with its
//!   negative-result cooldown, and the per-cycle resolver
//! - [`providers`]: external metadata provider capability (OMDb adapter)
//! - [`notify`]: markup dialects, chunking, and the notification composer
//! - [`dispatch`]: messaging capability, ordered at-least-once dispatcher,
//!   and the Telegram adapter
//! - [`scheduler`]: the Idle/Scanning/Committing state machine, the scan
//!   cycle, and the heartbeat
//! - [`query`] and [`commands`]: read-only status/search/recent queries and
//!   the command surface built on them
//!
//! All state a cycle reads or writes is held by [`context::LibraryContext`].
//! Queries only ever see the last committed snapshot/cache pair.
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

/// Command surface: parsing, validation, and the dispatch table
pub mod commands;

/// Explicit application context with init/flush lifecycle
pub mod context;

/// Dispatcher, retry policy, and messaging adapters
pub mod dispatch;

/// Error types and error handling utilities
pub mod error;

/// Folder name parsing, metadata cache, and resolver
pub mod metadata;

/// Notification composition and chunking
pub mod notify;

/// Persisted state: snapshot and atomic JSON state files
pub mod persistence;

/// External metadata providers (OMDb integration)
pub mod providers;

/// Read-only queries over committed state
pub mod query;

/// Filesystem capability and diff engine
pub mod scanner;

/// Scan scheduling, scan cycle, and heartbeat
pub mod scheduler;

/// Runtime settings consumed by the pipeline
pub mod settings;

pub use error::{Result, SyncError};
pub use reelwatch_model::{
    ChangeSet, EntryKey, FetchStatus, FolderEntry, HeartbeatState,
    MediaMetadata, MetadataKey, MonitoredPath,
};
