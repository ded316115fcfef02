use thiserror::Error;

use crate::persistence::StateFileError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    StateFile(#[from] StateFileError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
