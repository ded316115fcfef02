use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reelwatch_model::{ChangeSet, MonitoredPath};
use tracing::{debug, warn};

use super::fs::{FileSystem, ListingError};
use crate::metadata::folder_name;
use crate::persistence::{FolderNames, Snapshot};

/// A monitored path whose listing failed this cycle. Its committed entries
/// are carried over untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingFailure {
    pub path: MonitoredPath,
    pub error: ListingError,
}

/// Result of diffing every monitored path against the committed snapshot.
#[derive(Debug, Clone, Default)]
pub struct DiffOutcome {
    pub changes: ChangeSet,
    /// Fresh listings of the paths that could be read.
    pub listings: BTreeMap<MonitoredPath, BTreeSet<String>>,
    pub failures: Vec<ListingFailure>,
    /// Paths in configured order, duplicates removed.
    pub paths: Vec<MonitoredPath>,
}

impl DiffOutcome {
    /// Folder count per path as currently known: the fresh listing when it
    /// succeeded, otherwise the committed count.
    pub fn totals(&self, snapshot: &Snapshot) -> Vec<(MonitoredPath, usize)> {
        self.paths
            .iter()
            .map(|path| {
                let count = match self.listings.get(path) {
                    Some(names) => names.len(),
                    None => snapshot.count(path),
                };
                (path.clone(), count)
            })
            .collect()
    }
}

/// Pure per-path diff. Entries present now but absent from `known` are
/// added with `first_seen = now`; entries known but gone are removed and
/// keep their recorded `first_seen`.
pub fn diff_listing(
    path: &MonitoredPath,
    current: &BTreeSet<String>,
    known: Option<&FolderNames>,
    now: DateTime<Utc>,
) -> ChangeSet {
    let mut changes = ChangeSet::default();

    for name in current {
        if !known.is_some_and(|known| known.contains_key(name)) {
            changes
                .added
                .push(folder_name::observe(path.clone(), name, now));
        }
    }

    if let Some(known) = known {
        for (name, first_seen) in known {
            if !current.contains(name) {
                changes.removed.push(folder_name::observe(
                    path.clone(),
                    name,
                    *first_seen,
                ));
            }
        }
    }

    changes
}

/// Lists monitored paths and diffs them against a snapshot.
pub struct DiffEngine {
    fs: Arc<dyn FileSystem>,
}

impl fmt::Debug for DiffEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiffEngine").finish_non_exhaustive()
    }
}

impl DiffEngine {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    pub async fn diff(
        &self,
        paths: &[MonitoredPath],
        snapshot: &Snapshot,
        now: DateTime<Utc>,
    ) -> DiffOutcome {
        let mut outcome = DiffOutcome::default();
        let mut seen = HashSet::new();

        for path in paths {
            if !seen.insert(path) {
                continue;
            }
            outcome.paths.push(path.clone());

            match self.fs.list_folders(path.as_path()).await {
                Ok(current) => {
                    let changes =
                        diff_listing(path, &current, snapshot.names(path), now);
                    debug!(
                        "{}: {} folders, {} added, {} removed",
                        path,
                        current.len(),
                        changes.added.len(),
                        changes.removed.len()
                    );
                    outcome.changes.extend(changes);
                    outcome.listings.insert(path.clone(), current);
                }
                Err(error) => {
                    warn!("Skipping {} this cycle: {}", path, error);
                    outcome.failures.push(ListingFailure {
                        path: path.clone(),
                        error,
                    });
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::InMemoryFs;
    use chrono::TimeZone;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn first_observation_adds_everything() {
        let path = MonitoredPath::new("/m");
        let changes = diff_listing(
            &path,
            &names(&["MovieA (2020)", "MovieB (2021)"]),
            None,
            ts(1),
        );
        assert_eq!(changes.added.len(), 2);
        assert!(changes.removed.is_empty());
        assert_eq!(changes.added[0].title, "MovieA");
        assert_eq!(changes.added[0].year, Some(2020));
        assert_eq!(changes.added[0].first_seen, ts(1));
    }

    #[test]
    fn removal_keeps_recorded_first_seen() {
        let path = MonitoredPath::new("/m");
        let mut snapshot = Snapshot::default();
        snapshot.insert(&path, "MovieA (2020)", ts(1));
        snapshot.insert(&path, "MovieB (2021)", ts(1));

        let changes = diff_listing(
            &path,
            &names(&["MovieB (2021)", "MovieC (2022)"]),
            snapshot.names(&path),
            ts(5),
        );
        assert_eq!(changes.added.len(), 1);
        assert_eq!(changes.added[0].name, "MovieC (2022)");
        assert_eq!(changes.removed.len(), 1);
        assert_eq!(changes.removed[0].name, "MovieA (2020)");
        assert_eq!(changes.removed[0].first_seen, ts(1));
    }

    #[test]
    fn unchanged_listing_is_empty() {
        let path = MonitoredPath::new("/m");
        let mut snapshot = Snapshot::default();
        snapshot.insert(&path, "X", ts(1));
        let changes =
            diff_listing(&path, &names(&["X"]), snapshot.names(&path), ts(2));
        assert!(changes.is_empty());
    }

    #[tokio::test]
    async fn failing_path_keeps_its_entries_out_of_the_diff() {
        let fs = Arc::new(InMemoryFs::new());
        fs.add_folder("/movies", "New Film (2023)");
        fs.add_root("/tv");
        fs.fail_path("/tv");

        let movies = MonitoredPath::new("/movies");
        let tv = MonitoredPath::new("/tv");
        let mut snapshot = Snapshot::default();
        snapshot.insert(&tv, "Show (2010)", ts(1));

        let engine = DiffEngine::new(fs);
        let outcome = engine
            .diff(&[movies.clone(), tv.clone(), movies.clone()], &snapshot, ts(3))
            .await;

        assert_eq!(outcome.paths, vec![movies.clone(), tv.clone()]);
        assert_eq!(outcome.changes.added.len(), 1);
        assert!(outcome.changes.removed.is_empty());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].path, tv);
        assert_eq!(outcome.totals(&snapshot), vec![(movies, 1), (tv, 1)]);
    }
}
