use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::Result;
use crate::metadata::MetadataCache;
use crate::persistence::{LoadOrigin, MetadataCacheStore, Snapshot, SnapshotStore};
use crate::scanner::FileSystem;
use crate::settings::StateSettings;
use reelwatch_model::MonitoredPath;

/// Snapshot and cache as of the last successful commit. Immutable once
/// published; readers hold an `Arc` for as long as they need a stable view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommittedState {
    pub snapshot: Snapshot,
    pub cache: MetadataCache,
    total_unique: usize,
}

impl CommittedState {
    pub fn new(snapshot: Snapshot, cache: MetadataCache) -> Self {
        let total_unique = snapshot.total_unique();
        Self {
            snapshot,
            cache,
            total_unique,
        }
    }

    /// Distinct folder names across all paths, computed at commit time.
    pub fn total_unique(&self) -> usize {
        self.total_unique
    }
}

/// Everything a cycle or query needs, constructed once at startup and
/// passed explicitly.
pub struct LibraryContext {
    paths: Vec<MonitoredPath>,
    fs: Arc<dyn FileSystem>,
    snapshot_store: SnapshotStore,
    cache_store: MetadataCacheStore,
    committed: RwLock<Arc<CommittedState>>,
}

impl fmt::Debug for LibraryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryContext")
            .field("paths", &self.paths)
            .field("snapshot_store", &self.snapshot_store)
            .field("cache_store", &self.cache_store)
            .finish_non_exhaustive()
    }
}

impl LibraryContext {
    /// Load persisted state. Missing files start empty; unreadable files are
    /// moved aside and start empty.
    pub async fn init(
        paths: Vec<MonitoredPath>,
        fs: Arc<dyn FileSystem>,
        state: &StateSettings,
    ) -> Result<Self> {
        let snapshot_store = SnapshotStore::new(state.snapshot_path());
        let cache_store = MetadataCacheStore::new(state.metadata_path());

        let (snapshot, snapshot_origin) = snapshot_store.load().await?;
        let (cache, cache_origin) = cache_store.load().await?;
        for (what, origin) in [("snapshot", &snapshot_origin), ("metadata cache", &cache_origin)] {
            if let LoadOrigin::RecoveredCorrupt(aside) = origin {
                warn!("Recovered from corrupt {}; previous file kept at {:?}", what, aside);
            }
        }

        info!(
            "Loaded state: {} entries across {} paths, {} metadata records",
            snapshot.total_entries(),
            snapshot.paths.len(),
            cache.len()
        );

        Ok(Self {
            paths,
            fs,
            snapshot_store,
            cache_store,
            committed: RwLock::new(Arc::new(CommittedState::new(snapshot, cache))),
        })
    }

    pub fn paths(&self) -> &[MonitoredPath] {
        &self.paths
    }

    pub fn fs(&self) -> Arc<dyn FileSystem> {
        self.fs.clone()
    }

    pub async fn committed(&self) -> Arc<CommittedState> {
        self.committed.read().await.clone()
    }

    /// Publish `next` to readers and persist it. Readers switch to the new
    /// pair in one step; a persistence error is returned after the swap so
    /// the in-process view never lags what was announced.
    pub async fn commit(&self, next: CommittedState) -> Result<Arc<CommittedState>> {
        let next = Arc::new(next);
        *self.committed.write().await = next.clone();
        self.persist(&next).await?;
        Ok(next)
    }

    /// Write the committed state to disk.
    pub async fn flush(&self) -> Result<()> {
        let current = self.committed().await;
        self.persist(&current).await
    }

    /// The snapshot is written last: it is the commit point, so a crash
    /// between the two renames leaves extra cache entries at worst, never a
    /// snapshot that claims titles were announced when they were not.
    async fn persist(&self, state: &CommittedState) -> Result<()> {
        self.cache_store.save(&state.cache).await?;
        self.snapshot_store.save(&state.snapshot).await?;
        Ok(())
    }
}
