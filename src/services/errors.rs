//! Errors surfaced by the chunked object store.

use std::io;
use thiserror::Error;

use crate::models::file_id::FileId;

#[derive(Debug, Error)]
pub enum StoreError {
    /// No complete metadata record exists for the id.
    #[error("file `{0}` not found")]
    NotFound(FileId),
    #[error("`{0}` is not supported by this store")]
    Unsupported(&'static str),
    #[error("refusing to clear the store without confirmation")]
    ConfirmationRequired,
    #[error("invalid file id `{0}`")]
    InvalidFileId(String),
    #[error("invalid collection prefix `{0}`")]
    InvalidPrefix(String),
    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),
    #[error("file `{id}` is corrupt: {reason}")]
    CorruptChunk { id: FileId, reason: String },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for io::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Io(err) => err,
            StoreError::NotFound(_) => io::Error::new(io::ErrorKind::NotFound, err),
            other => io::Error::other(other),
        }
    }
}
