use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use reelwatch_model::{FolderEntry, MonitoredPath};
use serde::{Deserialize, Serialize};

use crate::metadata::folder_name;

/// Folder name to the time it was first observed under one path.
pub type FolderNames = BTreeMap<String, DateTime<Utc>>;

/// The last committed view of every monitored path.
///
/// Persisted as
/// `{"last_updated": ..., "paths": {"<path>": {"<folder>": "<first_seen>"}}}`.
/// A path maps to an empty object once it has been listed successfully with
/// no folders; a path never listed successfully is absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "last_updated", default)]
    pub last_scan: Option<DateTime<Utc>>,
    #[serde(default)]
    pub paths: BTreeMap<MonitoredPath, FolderNames>,
}

impl Snapshot {
    pub fn names(&self, path: &MonitoredPath) -> Option<&FolderNames> {
        self.paths.get(path)
    }

    pub fn count(&self, path: &MonitoredPath) -> usize {
        self.paths.get(path).map_or(0, BTreeMap::len)
    }

    pub fn contains(&self, path: &MonitoredPath, name: &str) -> bool {
        self.paths
            .get(path)
            .is_some_and(|names| names.contains_key(name))
    }

    /// Distinct folder names across all paths.
    pub fn total_unique(&self) -> usize {
        self.paths
            .values()
            .flat_map(|names| names.keys())
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn total_entries(&self) -> usize {
        self.paths.values().map(BTreeMap::len).sum()
    }

    /// Mark a path as successfully listed.
    pub fn track_path(&mut self, path: &MonitoredPath) {
        self.paths.entry(path.clone()).or_default();
    }

    /// Record an entry; an existing entry keeps its original `first_seen`.
    pub fn insert(
        &mut self,
        path: &MonitoredPath,
        name: &str,
        first_seen: DateTime<Utc>,
    ) -> bool {
        let names = self.paths.entry(path.clone()).or_default();
        if names.contains_key(name) {
            return false;
        }
        names.insert(name.to_string(), first_seen);
        true
    }

    pub fn remove(
        &mut self,
        path: &MonitoredPath,
        name: &str,
    ) -> Option<DateTime<Utc>> {
        self.paths.get_mut(path)?.remove(name)
    }

    pub fn entry(&self, path: &MonitoredPath, name: &str) -> Option<FolderEntry> {
        let first_seen = self.paths.get(path)?.get(name)?;
        Some(folder_name::observe(path.clone(), name, *first_seen))
    }

    /// Every entry with its parsed title/year, ordered by path then name.
    pub fn entries(&self) -> impl Iterator<Item = FolderEntry> + '_ {
        self.paths.iter().flat_map(|(path, names)| {
            names.iter().map(move |(name, first_seen)| {
                folder_name::observe(path.clone(), name, *first_seen)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn insert_keeps_original_first_seen() {
        let path = MonitoredPath::new("/m");
        let mut snapshot = Snapshot::default();
        assert!(snapshot.insert(&path, "A (2020)", ts(1)));
        assert!(!snapshot.insert(&path, "A (2020)", ts(2)));
        assert_eq!(snapshot.entry(&path, "A (2020)").unwrap().first_seen, ts(1));
    }

    #[test]
    fn unique_total_collapses_names_shared_by_paths() {
        let movies = MonitoredPath::new("/movies");
        let backup = MonitoredPath::new("/backup");
        let mut snapshot = Snapshot::default();
        snapshot.insert(&movies, "A", ts(1));
        snapshot.insert(&movies, "B", ts(1));
        snapshot.insert(&backup, "A", ts(1));
        assert_eq!(snapshot.total_unique(), 2);
        assert_eq!(snapshot.total_entries(), 3);
        assert_eq!(snapshot.count(&movies), 2);
    }

    #[test]
    fn serializes_in_documented_layout() {
        let path = MonitoredPath::new("/m");
        let mut snapshot = Snapshot::default();
        snapshot.track_path(&MonitoredPath::new("/empty"));
        snapshot.insert(&path, "A (2020)", ts(1));
        snapshot.last_scan = Some(ts(2));

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["last_updated"], "2024-01-02T00:00:00Z");
        assert_eq!(json["paths"]["/m"]["A (2020)"], "2024-01-01T00:00:00Z");
        assert!(json["paths"]["/empty"].as_object().unwrap().is_empty());

        let back: Snapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }
}
