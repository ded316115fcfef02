use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use reelwatch_model::{FetchStatus, MediaMetadata, MetadataKey};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Metadata records keyed by normalized title/year.
///
/// Holds only `Resolved` and `NotFound` records. Resolved records never
/// expire; NotFound records suppress refetching until their cooldown passes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "CacheDocument", into = "CacheDocument")]
pub struct MetadataCache {
    records: BTreeMap<MetadataKey, MediaMetadata>,
}

/// On-disk layout: `{"records": [...]}`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheDocument {
    #[serde(default)]
    records: Vec<MediaMetadata>,
}

impl From<CacheDocument> for MetadataCache {
    fn from(doc: CacheDocument) -> Self {
        let mut cache = Self::default();
        for record in doc.records {
            cache.insert(record);
        }
        cache
    }
}

impl From<MetadataCache> for CacheDocument {
    fn from(cache: MetadataCache) -> Self {
        Self {
            records: cache.records.into_values().collect(),
        }
    }
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &MetadataKey) -> Option<&MediaMetadata> {
        self.records.get(key)
    }

    /// The cached record if it still answers a lookup at `now`: resolved
    /// records always do, NotFound records only within the cooldown.
    pub fn fresh(
        &self,
        key: &MetadataKey,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Option<&MediaMetadata> {
        let record = self.records.get(key)?;
        match record.status {
            FetchStatus::Resolved => Some(record),
            FetchStatus::NotFound if !cooldown_elapsed(record, now, cooldown) => {
                Some(record)
            }
            _ => None,
        }
    }

    /// Store a definitive answer. Pending records are dropped.
    pub fn insert(&mut self, record: MediaMetadata) -> bool {
        if record.status == FetchStatus::Pending {
            debug!("not caching pending record for {}", record.key);
            return false;
        }
        self.records.insert(record.key.clone(), record);
        true
    }

    pub fn remove(&mut self, key: &MetadataKey) -> Option<MediaMetadata> {
        self.records.remove(key)
    }

    /// Drop NotFound records whose cooldown has passed.
    pub fn prune_expired(&mut self, now: DateTime<Utc>, cooldown: Duration) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| {
            record.status != FetchStatus::NotFound
                || !cooldown_elapsed(record, now, cooldown)
        });
        before - self.records.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MediaMetadata> {
        self.records.values()
    }
}

fn cooldown_elapsed(
    record: &MediaMetadata,
    now: DateTime<Utc>,
    cooldown: Duration,
) -> bool {
    let cooldown = TimeDelta::from_std(cooldown).unwrap_or(TimeDelta::MAX);
    match record.fetched_at.checked_add_signed(cooldown) {
        Some(until) => now >= until,
        None => false,
    }
}
