use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reelwatch_model::{
    EntryKey, FetchStatus, FolderEntry, MediaMetadata, MetadataKey,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::cache::MetadataCache;
use crate::providers::{MetadataProvider, ProviderError};
use crate::settings::MetadataSettings;

/// Lookup counters for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    pub cache_hits: usize,
    pub fetched: usize,
    pub resolved: usize,
    pub not_found: usize,
    pub unavailable: usize,
}

/// Resolves metadata for folder entries through the cache and provider.
pub struct MetadataResolver {
    provider: Arc<dyn MetadataProvider>,
    settings: MetadataSettings,
}

impl fmt::Debug for MetadataResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataResolver")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl MetadataResolver {
    pub fn new(provider: Arc<dyn MetadataProvider>, settings: MetadataSettings) -> Self {
        Self { provider, settings }
    }

    pub fn settings(&self) -> &MetadataSettings {
        &self.settings
    }

    /// Start a cycle-scoped session writing into the staged cache.
    pub fn session(
        &self,
        staged: Arc<Mutex<MetadataCache>>,
        now: DateTime<Utc>,
    ) -> ResolveSession<'_> {
        ResolveSession {
            resolver: self,
            staged,
            now,
            attempted: HashMap::new(),
            stats: ResolveStats::default(),
            disabled_logged: false,
        }
    }
}

/// One cycle's view of the resolver. Each key is fetched at most once per
/// session, no matter how many entries share it.
pub struct ResolveSession<'a> {
    resolver: &'a MetadataResolver,
    staged: Arc<Mutex<MetadataCache>>,
    now: DateTime<Utc>,
    attempted: HashMap<MetadataKey, MediaMetadata>,
    stats: ResolveStats,
    disabled_logged: bool,
}

impl fmt::Debug for ResolveSession<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveSession")
            .field("now", &self.now)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl ResolveSession<'_> {
    pub fn stats(&self) -> ResolveStats {
        self.stats
    }

    /// Resolve every entry, in order. Always yields a record per entry:
    /// failures degrade to title/year placeholders.
    pub async fn resolve_all(
        &mut self,
        entries: &[FolderEntry],
    ) -> BTreeMap<EntryKey, MediaMetadata> {
        let mut resolved = BTreeMap::new();
        for entry in entries {
            let record = self.resolve(entry).await;
            resolved.insert(entry.key(), record);
        }
        resolved
    }

    pub async fn resolve(&mut self, entry: &FolderEntry) -> MediaMetadata {
        let key = MetadataKey::for_entry(entry);
        let settings = &self.resolver.settings;

        if let Some(record) = self
            .staged
            .lock()
            .await
            .fresh(&key, self.now, settings.not_found_cooldown)
        {
            self.stats.cache_hits += 1;
            return record.clone();
        }

        if let Some(record) = self.attempted.get(&key) {
            return record.clone();
        }

        self.stats.fetched += 1;
        let fetch = self.resolver.provider.fetch(&entry.title, entry.year);
        let outcome = match tokio::time::timeout(settings.fetch_timeout, fetch).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProviderError::Timeout(settings.fetch_timeout)),
        };

        let record = match outcome {
            Ok(found) => {
                self.stats.resolved += 1;
                debug!("Resolved {} as {:?}", key, found.title);
                found.into_metadata(key.clone(), self.now)
            }
            Err(err) if err.is_not_found() => {
                self.stats.not_found += 1;
                info!("No metadata for {}", key);
                MediaMetadata::placeholder_for(entry, FetchStatus::NotFound, self.now)
            }
            Err(err) => {
                self.stats.unavailable += 1;
                match err {
                    ProviderError::Disabled(_) if self.disabled_logged => {}
                    ProviderError::Disabled(reason) => {
                        self.disabled_logged = true;
                        warn!("Metadata lookups disabled: {}", reason);
                    }
                    other => warn!("Metadata lookup for {} failed: {}", key, other),
                }
                MediaMetadata::placeholder_for(entry, FetchStatus::Pending, self.now)
            }
        };

        if record.status != FetchStatus::Pending {
            self.staged.lock().await.insert(record.clone());
        }
        self.attempted.insert(key, record.clone());
        record
    }
}
