pub mod cache;
pub mod folder_name;
pub mod resolver;

pub use cache::MetadataCache;
pub use folder_name::ParsedFolderName;
pub use resolver::{MetadataResolver, ResolveSession, ResolveStats};
