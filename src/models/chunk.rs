//! A single fixed-size slice of a stored file.

use sqlx::FromRow;
use uuid::Uuid;

/// One row of the chunk collection.
///
/// Chunks of a file are keyed by `(files_id, n)`. Ordered by `n` they
/// concatenate to the file's full content; every chunk except the last is
/// exactly `chunk_size` bytes long.
#[derive(Clone, FromRow, Debug, PartialEq, Eq)]
pub struct Chunk {
    /// Id of the owning file record. Not enforced as a foreign key.
    pub files_id: Uuid,

    /// Zero-based position among the file's chunks.
    pub n: i64,

    /// Raw payload bytes.
    pub data: Vec<u8>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
