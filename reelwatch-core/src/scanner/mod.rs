pub mod diff;
pub mod fs;

pub use diff::{DiffEngine, DiffOutcome, ListingFailure, diff_listing};
pub use fs::{FileSystem, InMemoryFs, ListingError, RealFs};
