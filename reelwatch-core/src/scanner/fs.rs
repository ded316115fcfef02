use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Why a monitored path could not be listed. Listing failures are per path;
/// the other paths of the cycle are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListingError {
    #[error("monitored path not found: {path:?}")]
    NotFound { path: PathBuf },

    #[error("monitored path {path:?} is not accessible: {reason}")]
    Inaccessible { path: PathBuf, reason: String },
}

impl ListingError {
    pub fn from_io(path: &Path, err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound {
                path: path.to_path_buf(),
            },
            _ => Self::Inaccessible {
                path: path.to_path_buf(),
                reason: err.to_string(),
            },
        }
    }
}

/// Filesystem capability used by the diff engine.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Names of the immediate subdirectories of `path`. Plain files are not
    /// part of the result.
    async fn list_folders(
        &self,
        path: &Path,
    ) -> Result<BTreeSet<String>, ListingError>;
}

/// Real filesystem implementation backed by tokio::fs.
#[derive(Debug, Clone, Default)]
pub struct RealFs {
    include_hidden: bool,
}

impl RealFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hidden(include_hidden: bool) -> Self {
        Self { include_hidden }
    }
}

#[async_trait]
impl FileSystem for RealFs {
    async fn list_folders(
        &self,
        path: &Path,
    ) -> Result<BTreeSet<String>, ListingError> {
        let mut rd = tokio::fs::read_dir(path)
            .await
            .map_err(|e| ListingError::from_io(path, &e))?;

        let mut names = BTreeSet::new();
        // A partial listing would read as removals, so any iteration error
        // fails the whole path.
        while let Some(entry) = rd
            .next_entry()
            .await
            .map_err(|e| ListingError::from_io(path, &e))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                tracing::warn!(
                    "skipping non UTF-8 folder name under {:?}: {:?}",
                    path,
                    entry.file_name()
                );
                continue;
            };
            if !self.include_hidden && name.starts_with('.') {
                continue;
            }
            // Follows symlinks, so linked folders count as folders.
            match tokio::fs::metadata(entry.path()).await {
                Ok(md) if md.is_dir() => {
                    names.insert(name);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(
                        "skipping unreadable entry {:?}: {}",
                        entry.path(),
                        e
                    );
                }
            }
        }
        Ok(names)
    }
}

/// In-memory filesystem for tests.
/// Note: Paths are treated literally; callers should use consistent absolute or relative paths.
#[derive(Debug, Default)]
pub struct InMemoryFs {
    state: Mutex<InMemoryState>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    dirs: HashMap<PathBuf, Node>,
    failing: HashSet<PathBuf>,
}

#[derive(Debug, Default)]
struct Node {
    folders: BTreeSet<String>,
    files: BTreeSet<String>,
}

impl InMemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty directory that can be listed.
    pub fn add_root<P: Into<PathBuf>>(&self, path: P) {
        self.with_state(|state| {
            state.dirs.entry(path.into()).or_default();
        });
    }

    pub fn add_folder<P: Into<PathBuf>>(&self, root: P, name: &str) {
        self.with_state(|state| {
            state
                .dirs
                .entry(root.into())
                .or_default()
                .folders
                .insert(name.to_string());
        });
    }

    pub fn add_file<P: Into<PathBuf>>(&self, root: P, name: &str) {
        self.with_state(|state| {
            state
                .dirs
                .entry(root.into())
                .or_default()
                .files
                .insert(name.to_string());
        });
    }

    pub fn remove_folder<P: AsRef<Path>>(&self, root: P, name: &str) {
        self.with_state(|state| {
            if let Some(node) = state.dirs.get_mut(root.as_ref()) {
                node.folders.remove(name);
            }
        });
    }

    /// Delete a directory entirely; listing it yields `NotFound`.
    pub fn remove_root<P: AsRef<Path>>(&self, root: P) {
        self.with_state(|state| {
            state.dirs.remove(root.as_ref());
        });
    }

    /// Make listings of `root` fail with `Inaccessible` until restored.
    pub fn fail_path<P: Into<PathBuf>>(&self, root: P) {
        self.with_state(|state| {
            state.failing.insert(root.into());
        });
    }

    pub fn restore_path<P: AsRef<Path>>(&self, root: P) {
        self.with_state(|state| {
            state.failing.remove(root.as_ref());
        });
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut InMemoryState) -> R) -> R {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

#[async_trait]
impl FileSystem for InMemoryFs {
    async fn list_folders(
        &self,
        path: &Path,
    ) -> Result<BTreeSet<String>, ListingError> {
        self.with_state(|state| {
            if state.failing.contains(path) {
                return Err(ListingError::Inaccessible {
                    path: path.to_path_buf(),
                    reason: "permission denied".to_string(),
                });
            }
            match state.dirs.get(path) {
                Some(node) => Ok(node.folders.clone()),
                None => Err(ListingError::NotFound {
                    path: path.to_path_buf(),
                }),
            }
        })
    }
}
