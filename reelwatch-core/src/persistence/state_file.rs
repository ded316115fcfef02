use std::fmt;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StateFileError {
    #[error("failed to create state directory {path:?}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to read state file {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to encode state file {path:?}: {source}")]
    Encode {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to write state file {path:?}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to move state file {from:?} -> {to:?}: {source}")]
    Replace {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
}

/// How a state file load was satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOrigin {
    /// No file yet; started from the empty default.
    Missing,
    /// Parsed from disk.
    File,
    /// The file did not parse and was moved aside to the given path.
    RecoveredCorrupt(PathBuf),
}

/// A JSON document persisted with write-to-temp-then-rename, so readers and
/// restarts see either the previous or the next version in full.
pub struct StateFile<T> {
    path: PathBuf,
    _doc: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for StateFile<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateFile").field("path", &self.path).finish()
    }
}

impl<T> StateFile<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _doc: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<(T, LoadOrigin), StateFileError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!("No state at {:?}; starting empty", self.path);
                return Ok((T::default(), LoadOrigin::Missing));
            }
            Err(source) => {
                return Err(StateFileError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        match serde_json::from_slice(&raw) {
            Ok(value) => Ok((value, LoadOrigin::File)),
            Err(err) => {
                let aside = self.corrupt_path();
                warn!(
                    "State file {:?} is unreadable ({}); moving it to {:?} and starting empty",
                    self.path, err, aside
                );
                tokio::fs::rename(&self.path, &aside).await.map_err(
                    |source| StateFileError::Replace {
                        from: self.path.clone(),
                        to: aside.clone(),
                        source,
                    },
                )?;
                Ok((T::default(), LoadOrigin::RecoveredCorrupt(aside)))
            }
        }
    }

    pub async fn save(&self, value: &T) -> Result<(), StateFileError> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|source| {
            StateFileError::Encode {
                path: self.path.clone(),
                source,
            }
        })?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|source| {
                StateFileError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                }
            })?;
        }

        let tmp = self.sibling(&format!("tmp-{}", Uuid::new_v4().simple()));
        if let Err(source) = write_synced(&tmp, &bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StateFileError::Write { path: tmp, source });
        }

        if let Err(source) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StateFileError::Replace {
                from: tmp,
                to: self.path.clone(),
                source,
            });
        }

        Ok(())
    }

    fn corrupt_path(&self) -> PathBuf {
        self.sibling(&format!("corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S")))
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "state".to_string());
        self.path.with_file_name(format!("{name}.{suffix}"))
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Doc {
        items: Vec<String>,
    }

    #[tokio::test]
    async fn missing_file_loads_default() {
        let dir = tempdir().unwrap();
        let file = StateFile::<Doc>::new(dir.path().join("doc.json"));
        let (doc, origin) = file.load().await.unwrap();
        assert_eq!(doc, Doc::default());
        assert_eq!(origin, LoadOrigin::Missing);
    }

    #[tokio::test]
    async fn save_then_load_and_no_temp_left_behind() {
        let dir = tempdir().unwrap();
        let file = StateFile::<Doc>::new(dir.path().join("nested/doc.json"));
        let doc = Doc {
            items: vec!["a".into(), "b".into()],
        };
        file.save(&doc).await.unwrap();

        let (loaded, origin) = file.load().await.unwrap();
        assert_eq!(loaded, doc);
        assert_eq!(origin, LoadOrigin::File);

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[tokio::test]
    async fn corrupt_file_is_moved_aside() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let file = StateFile::<Doc>::new(&path);
        let (doc, origin) = file.load().await.unwrap();
        assert_eq!(doc, Doc::default());
        let LoadOrigin::RecoveredCorrupt(aside) = origin else {
            panic!("expected recovery, got {origin:?}");
        };
        assert!(!path.exists());
        assert_eq!(std::fs::read(aside).unwrap(), b"{ not json");
    }
}
