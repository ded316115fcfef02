pub mod snapshot;
pub mod state_file;

pub use snapshot::{FolderNames, Snapshot};
pub use state_file::{LoadOrigin, StateFile, StateFileError};

/// Persisted snapshot document.
pub type SnapshotStore = StateFile<Snapshot>;

/// Persisted metadata cache document.
pub type MetadataCacheStore = StateFile<crate::metadata::MetadataCache>;
