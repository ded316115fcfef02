use std::collections::BTreeSet;

use crate::entry::{FolderEntry, MonitoredPath};

/// Added/removed entries computed for one scan cycle.
///
/// Built by the diff engine; an entry never appears in both lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: Vec<FolderEntry>,
    pub removed: Vec<FolderEntry>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len()
    }

    pub fn added_in<'a>(
        &'a self,
        path: &'a MonitoredPath,
    ) -> impl Iterator<Item = &'a FolderEntry> + 'a {
        self.added.iter().filter(move |entry| &entry.path == path)
    }

    pub fn removed_in<'a>(
        &'a self,
        path: &'a MonitoredPath,
    ) -> impl Iterator<Item = &'a FolderEntry> + 'a {
        self.removed.iter().filter(move |entry| &entry.path == path)
    }

    /// Paths touched by this change set, in sorted order.
    pub fn paths(&self) -> BTreeSet<&MonitoredPath> {
        self.added
            .iter()
            .chain(self.removed.iter())
            .map(|entry| &entry.path)
            .collect()
    }

    /// Merge another path's changes into this set.
    pub fn extend(&mut self, other: ChangeSet) {
        self.added.extend(other.added);
        self.removed.extend(other.removed);
    }
}
