use std::fmt;
use std::path::{Path, PathBuf};

use crate::chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A directory designated for scanning.
///
/// Stored as the configured string so that persisted snapshots keep the exact
/// spelling the operator used; two spellings of the same directory are two
/// different monitored paths.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct MonitoredPath(String);

impl MonitoredPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }

    /// Short name used in notifications: the final path component, or the
    /// whole path when it has none (e.g. `/`).
    pub fn label(&self) -> &str {
        self.as_path()
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for MonitoredPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&Path> for MonitoredPath {
    fn from(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }
}

impl From<PathBuf> for MonitoredPath {
    fn from(path: PathBuf) -> Self {
        Self::from(path.as_path())
    }
}

impl From<&str> for MonitoredPath {
    fn from(path: &str) -> Self {
        Self(path.to_string())
    }
}

/// Identity of a folder entry: the owning path plus the raw folder name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntryKey {
    pub path: MonitoredPath,
    pub name: String,
}

impl EntryKey {
    pub fn new(path: MonitoredPath, name: impl Into<String>) -> Self {
        Self {
            path,
            name: name.into(),
        }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.path, self.name)
    }
}

/// One top-level subdirectory of a monitored path, representing a single
/// media item.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FolderEntry {
    /// Raw folder name exactly as listed.
    pub name: String,
    /// Title parsed from the folder name (the full name when no year was
    /// found).
    pub title: String,
    /// Four digit year parsed from the folder name.
    pub year: Option<u16>,
    pub path: MonitoredPath,
    pub first_seen: DateTime<Utc>,
}

impl FolderEntry {
    pub fn key(&self) -> EntryKey {
        EntryKey::new(self.path.clone(), self.name.clone())
    }

    /// Year rendered for display; empty when the name carried no year.
    pub fn year_label(&self) -> String {
        self.year.map(|year| year.to_string()).unwrap_or_default()
    }
}
