//! Read-only views over the last committed state.
//!
//! Queries never wait for a running scan: they clone the committed `Arc` and
//! work from that.

use std::cmp::Reverse;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reelwatch_model::{FolderEntry, HeartbeatState, MediaMetadata, MetadataKey, MonitoredPath};
use tokio::sync::RwLock;

use crate::context::LibraryContext;
use crate::scheduler::{ScanPhase, SchedulerHandle};

/// Number of entries `recent` returns when the caller gives none.
pub const DEFAULT_RECENT_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("Search query is empty")]
    EmptyQuery,

    #[error("Count must be a positive number, got {0}")]
    InvalidCount(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub last_scan: Option<DateTime<Utc>>,
    pub total_unique: usize,
    /// Folder count per configured path, in configured order.
    pub per_path: Vec<(MonitoredPath, usize)>,
    /// `None` when no scheduler is attached.
    pub phase: Option<ScanPhase>,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

/// A library entry joined with whatever metadata is cached for it.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryItem {
    pub entry: FolderEntry,
    pub metadata: Option<MediaMetadata>,
}

impl LibraryItem {
    /// Resolved title when known, otherwise the title parsed from the
    /// folder name.
    pub fn display_title(&self) -> &str {
        match &self.metadata {
            Some(record) if record.is_resolved() => &record.title,
            _ => &self.entry.title,
        }
    }

    pub fn display_year(&self) -> Option<String> {
        match &self.metadata {
            Some(record) if record.is_resolved() && !record.year_label().is_empty() => {
                Some(record.year_label().to_string())
            }
            _ => self.entry.year.map(|year| year.to_string()),
        }
    }
}

pub struct QueryService {
    context: Arc<LibraryContext>,
    scheduler: Option<SchedulerHandle>,
    heartbeat: Option<Arc<RwLock<HeartbeatState>>>,
}

impl fmt::Debug for QueryService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryService")
            .field("context", &self.context)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl QueryService {
    pub fn new(context: Arc<LibraryContext>) -> Self {
        Self {
            context,
            scheduler: None,
            heartbeat: None,
        }
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerHandle) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_heartbeat(mut self, state: Arc<RwLock<HeartbeatState>>) -> Self {
        self.heartbeat = Some(state);
        self
    }

    pub async fn status(&self) -> StatusReport {
        let committed = self.context.committed().await;
        let per_path = self
            .context
            .paths()
            .iter()
            .map(|path| (path.clone(), committed.snapshot.count(path)))
            .collect();
        let last_heartbeat = match &self.heartbeat {
            Some(state) => state.read().await.last_sent,
            None => None,
        };

        StatusReport {
            last_scan: committed.snapshot.last_scan,
            total_unique: committed.total_unique(),
            per_path,
            phase: self.scheduler.as_ref().map(SchedulerHandle::phase),
            last_heartbeat,
        }
    }

    /// Case-insensitive substring match on titles, ordered by normalized
    /// title and year.
    pub async fn search(&self, query: &str) -> Result<Vec<LibraryItem>, QueryError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        let committed = self.context.committed().await;
        let mut hits: Vec<(MetadataKey, LibraryItem)> = committed
            .snapshot
            .entries()
            .map(|entry| {
                let key = MetadataKey::for_entry(&entry);
                let metadata = committed.cache.get(&key).cloned();
                (key, LibraryItem { entry, metadata })
            })
            .filter(|(_, item)| item.display_title().to_lowercase().contains(&needle))
            .collect();

        hits.sort_by(|(a, item_a), (b, item_b)| {
            a.cmp(b)
                .then_with(|| item_a.entry.path.cmp(&item_b.entry.path))
                .then_with(|| item_a.entry.name.cmp(&item_b.entry.name))
        });
        Ok(hits.into_iter().map(|(_, item)| item).collect())
    }

    /// The `count` most recently added entries, newest first. `count` is
    /// clamped to the number of known entries.
    pub async fn recent(&self, count: usize) -> Result<Vec<LibraryItem>, QueryError> {
        if count == 0 {
            return Err(QueryError::InvalidCount(count));
        }

        let committed = self.context.committed().await;
        let mut entries: Vec<FolderEntry> = committed.snapshot.entries().collect();
        entries.sort_by(|a, b| {
            Reverse(a.first_seen)
                .cmp(&Reverse(b.first_seen))
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.path.cmp(&b.path))
        });
        entries.truncate(count);

        Ok(entries
            .into_iter()
            .map(|entry| {
                let metadata = committed.cache.get(&MetadataKey::for_entry(&entry)).cloned();
                LibraryItem { entry, metadata }
            })
            .collect())
    }
}
