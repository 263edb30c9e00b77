//! src/services/grid_store.rs
//!
//! `GridStore` is the public face of the chunked object store. Each store owns
//! one pair of tables in SQLite, `{prefix}_files` (one metadata row per
//! file) and `{prefix}_chunks` (the file content in fixed-size rows), and
//! keeps them consistent without transactions: content is written first,
//! metadata is completed last, and anything without complete metadata is
//! treated as absent by readers.

use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{debug, info};

use super::{
    chunk_store::ChunkCollection,
    copier,
    errors::{StoreError, StoreResult},
    metadata_store::FileCollection,
    reader::ChunkedReader,
    writer,
};
use crate::models::{
    file::{FileInfo, UploadOptions},
    file_id::FileId,
};

/// Token `clear_all` must be given before it wipes both tables.
pub const CLEAR_CONFIRMATION: &str = "confirm";

/// 255 KiB, leaving headroom under 256 KiB for the row overhead.
pub const DEFAULT_CHUNK_SIZE: usize = 255 * 1024;
pub const DEFAULT_BATCH_SIZE: usize = 5 * 1024 * 1024;
pub const DEFAULT_PREFIX: &str = "fs";

/// Fixed-at-construction settings of a store.
///
/// Only [`StoreConfig::new`] and `Default` build one, so a store never sees
/// a zero chunk size or a batch size that is not a multiple of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    prefix: String,
    chunk_size: usize,
    batch_size: usize,
}

impl StoreConfig {
    pub fn new(
        prefix: impl Into<String>,
        chunk_size: usize,
        batch_size: usize,
    ) -> StoreResult<Self> {
        let prefix = prefix.into();
        ensure_prefix_safe(&prefix)?;
        if chunk_size == 0 {
            return Err(StoreError::InvalidConfig("chunk size must be non-zero".into()));
        }
        Ok(Self {
            prefix,
            chunk_size,
            batch_size: align_batch_size(chunk_size, batch_size),
        })
    }

    /// Table name prefix, `[A-Za-z0-9_]+`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Maximum payload bytes per chunk row.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Bytes read from a source (or chunk bytes paged from the database)
    /// per round trip. Always a positive multiple of `chunk_size`.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            batch_size: align_batch_size(DEFAULT_CHUNK_SIZE, DEFAULT_BATCH_SIZE),
        }
    }
}

/// Round `batch_size` down to a multiple of `chunk_size`, never below one
/// chunk, so only the final chunk of a file can come out short.
fn align_batch_size(chunk_size: usize, batch_size: usize) -> usize {
    (batch_size / chunk_size).max(1) * chunk_size
}

/// The prefix ends up inside SQL identifiers.
fn ensure_prefix_safe(prefix: &str) -> StoreResult<()> {
    let valid = !prefix.is_empty()
        && prefix.len() <= 64
        && prefix
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
        && !prefix.as_bytes()[0].is_ascii_digit();
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidPrefix(prefix.to_string()))
    }
}

/// Where the content of a new file comes from.
pub enum UploadSource<'a> {
    /// Any byte stream; written through the chunking writer.
    Stream(Box<dyn AsyncRead + Send + Unpin + 'a>),
    /// A file already held by a store of this kind; copied row by row.
    Stored { store: &'a GridStore, id: FileId },
}

impl<'a> UploadSource<'a> {
    pub fn stream(reader: impl AsyncRead + Send + Unpin + 'a) -> Self {
        Self::Stream(Box::new(reader))
    }

    pub fn stored(store: &'a GridStore, id: FileId) -> Self {
        Self::Stored { store, id }
    }
}

/// Chunked object store over one `{prefix}_files` / `{prefix}_chunks` pair.
#[derive(Clone)]
pub struct GridStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
    config: StoreConfig,
    files: FileCollection,
    chunks: ChunkCollection,
}

impl GridStore {
    pub fn new(db: Arc<SqlitePool>, config: StoreConfig) -> Self {
        let files = FileCollection::new(db.clone(), &config.prefix);
        let chunks = ChunkCollection::new(db.clone(), &config.prefix);
        Self {
            db,
            config,
            files,
            chunks,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn files(&self) -> &FileCollection {
        &self.files
    }

    pub fn chunks(&self) -> &ChunkCollection {
        &self.chunks
    }

    /// Chunk rows per database page for files written with `chunk_size`.
    pub(crate) fn chunks_per_page(&self, chunk_size: i64) -> i64 {
        if chunk_size <= 0 {
            return 1;
        }
        (self.config.batch_size as i64 / chunk_size).max(1)
    }

    /// Create both tables if they do not exist yet.
    pub async fn ensure_collections(&self) -> StoreResult<()> {
        self.files.create_table().await?;
        self.chunks.create_table().await?;
        info!(
            files = self.files.table(),
            chunks = self.chunks.table(),
            "collections ready"
        );
        Ok(())
    }

    /// Store a new file and return the id callers use from then on.
    ///
    /// A `Stored` source is copied chunk row by chunk row; any other source
    /// is streamed through the writer. `external_id` supplies the default
    /// filename and the id's suffix.
    pub async fn upload(
        &self,
        source: UploadSource<'_>,
        external_id: &str,
        options: UploadOptions,
    ) -> StoreResult<FileId> {
        match source {
            UploadSource::Stream(reader) => {
                writer::create(self, reader, external_id, options).await
            }
            UploadSource::Stored { store, id } => {
                copier::copy(self, store, &id, external_id, options).await
            }
        }
    }

    /// Complete metadata of a file. In-flight uploads are `NotFound`.
    pub async fn file_info(&self, id: &FileId) -> StoreResult<FileInfo> {
        match self.files.find(id.key).await? {
            Some(file) if file.is_complete() => Ok(file),
            _ => Err(StoreError::NotFound(id.clone())),
        }
    }

    /// Open a lazy reader; `rewindable` keeps read bytes for `rewind`.
    pub async fn open(&self, id: &FileId, rewindable: bool) -> StoreResult<ChunkedReader> {
        let file = self.file_info(id).await?;
        let page_size = self.chunks_per_page(file.chunk_size);
        Ok(ChunkedReader::new(
            self.chunks.clone(),
            id.clone(),
            file,
            page_size,
            rewindable,
        ))
    }

    /// Whole file content in memory. Meant for small files.
    pub async fn read(&self, id: &FileId) -> StoreResult<Vec<u8>> {
        let mut reader = self.open(id, false).await?;
        let bytes = reader.read_to_end().await?;
        reader.close();
        Ok(bytes)
    }

    /// True if a metadata row exists, complete or not.
    pub async fn exists(&self, id: &FileId) -> StoreResult<bool> {
        self.files.exists(id.key).await
    }

    /// Remove a file's metadata row, then its chunks. Absent files are fine.
    pub async fn delete(&self, id: &FileId) -> StoreResult<()> {
        let files = self.files.delete(id.key).await?;
        let chunks = self.chunks.delete_for(id.key).await?;
        debug!(file_id = %id, files, chunks, "deleted file");
        Ok(())
    }

    /// Delete several files. Not atomic across ids.
    pub async fn delete_many(&self, ids: &[FileId]) -> StoreResult<()> {
        let keys: Vec<_> = ids.iter().map(|id| id.key).collect();
        for batch in keys.chunks(DELETE_BATCH) {
            let files = self.files.delete_many(batch).await?;
            let chunks = self.chunks.delete_many(batch).await?;
            debug!(ids = batch.len(), files, chunks, "deleted files");
        }
        Ok(())
    }

    /// Files in this store have no URL of their own.
    pub fn url(&self, _id: &FileId) -> StoreResult<String> {
        Err(StoreError::Unsupported("url"))
    }

    /// Wipe both tables. `confirmation` must equal [`CLEAR_CONFIRMATION`].
    pub async fn clear_all(&self, confirmation: &str) -> StoreResult<()> {
        if confirmation != CLEAR_CONFIRMATION {
            return Err(StoreError::ConfirmationRequired);
        }
        let files = self.files.delete_all().await?;
        let chunks = self.chunks.delete_all().await?;
        info!(prefix = %self.config.prefix, files, chunks, "cleared store");
        Ok(())
    }
}

/// Ids per `IN (...)` list when deleting in bulk.
const DELETE_BATCH: usize = 500;

#[cfg(test)]
impl GridStore {
    /// In-memory store with the default prefix and its tables created.
    pub(crate) async fn for_tests(chunk_size: usize, batch_size: usize) -> Self {
        let pool = super::test_support::memory_pool().await;
        let store = Self::new(
            pool,
            StoreConfig::new(DEFAULT_PREFIX, chunk_size, batch_size).unwrap(),
        );
        store.ensure_collections().await.unwrap();
        store
    }
}
