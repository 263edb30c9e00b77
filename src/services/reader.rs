//! Lazy, optionally rewindable byte reader over a file's chunk rows.
//!
//! Chunks are pulled from the chunk collection a page at a time, in
//! sequence order, as the consumer reads. At most one page of chunk rows
//! plus the chunk being consumed is held in memory, unless the reader was
//! opened rewindable, in which case every byte handed out is also kept so
//! `rewind` can replay it without going back to the database.

use bytes::Bytes;
use futures::{Stream, stream};
use std::{collections::VecDeque, io};

use super::{
    chunk_store::ChunkCollection,
    errors::{StoreError, StoreResult},
};
use crate::models::{chunk::Chunk, file::FileInfo, file_id::FileId};

/// Upper bound on the buffer `read_to_end` reserves from the stored length.
const MAX_PREALLOC: u64 = 8 * 1024 * 1024;

pub struct ChunkedReader {
    chunks: ChunkCollection,
    id: FileId,
    file: FileInfo,
    length: u64,
    page_size: i64,
    page: VecDeque<Chunk>,
    next_sequence: i64,
    exhausted: bool,
    /// Unread tail of the chunk currently being consumed.
    current: Bytes,
    /// Bytes pulled from the database so far.
    pulled: u64,
    rewindable: bool,
    /// Every byte handed out so far; only filled when rewindable.
    history: Vec<u8>,
    /// Read position inside `history` while replaying after a rewind.
    position: usize,
    closed: bool,
}

impl ChunkedReader {
    /// `file` must be a complete record.
    pub(crate) fn new(
        chunks: ChunkCollection,
        id: FileId,
        file: FileInfo,
        page_size: i64,
        rewindable: bool,
    ) -> Self {
        let length = file.length.unwrap_or_default().max(0) as u64;
        Self {
            chunks,
            id,
            file,
            length,
            page_size: page_size.max(1),
            page: VecDeque::new(),
            next_sequence: 0,
            exhausted: false,
            current: Bytes::new(),
            pulled: 0,
            rewindable,
            history: Vec::new(),
            position: 0,
            closed: false,
        }
    }

    /// Total size of the file, known before anything is read.
    pub fn size(&self) -> u64 {
        self.length
    }

    pub fn id(&self) -> &FileId {
        &self.id
    }

    pub fn file(&self) -> &FileInfo {
        &self.file
    }

    pub fn is_rewindable(&self) -> bool {
        self.rewindable
    }

    fn corrupt(&self, reason: String) -> StoreError {
        StoreError::CorruptChunk {
            id: self.id.clone(),
            reason,
        }
    }

    /// Next chunk payload from the database, or `None` at end of file.
    async fn pull_chunk(&mut self) -> StoreResult<Option<Bytes>> {
        if self.closed {
            return Ok(None);
        }
        if self.page.is_empty() && !self.exhausted {
            if self.pulled >= self.length {
                self.exhausted = true;
            } else {
                let page = self
                    .chunks
                    .fetch_range(self.file.id, self.next_sequence, self.page_size)
                    .await?;
                if (page.len() as i64) < self.page_size {
                    self.exhausted = true;
                }
                self.page.extend(page);
            }
        }

        let Some(chunk) = self.page.pop_front() else {
            if self.pulled != self.length {
                return Err(self.corrupt(format!(
                    "expected {} bytes, chunks hold {}",
                    self.length, self.pulled
                )));
            }
            return Ok(None);
        };

        if chunk.n != self.next_sequence {
            return Err(self.corrupt(format!(
                "expected chunk {}, found chunk {}",
                self.next_sequence, chunk.n
            )));
        }
        self.next_sequence += 1;
        self.pulled += chunk.len() as u64;
        if self.pulled > self.length {
            return Err(self.corrupt(format!(
                "chunks hold more than the recorded {} bytes",
                self.length
            )));
        }
        Ok(Some(Bytes::from(chunk.data)))
    }

    fn remember(&mut self, bytes: &[u8]) {
        if self.rewindable {
            self.history.extend_from_slice(bytes);
            self.position = self.history.len();
        }
    }

    fn replaying(&self) -> bool {
        self.rewindable && self.position < self.history.len()
    }

    /// Read the next run of bytes, normally one whole chunk. `None` at end.
    pub async fn next_chunk(&mut self) -> StoreResult<Option<Bytes>> {
        if self.replaying() {
            let replay = Bytes::copy_from_slice(&self.history[self.position..]);
            self.position = self.history.len();
            return Ok(Some(replay));
        }
        let bytes = if self.current.is_empty() {
            match self.pull_chunk().await? {
                Some(bytes) => bytes,
                None => return Ok(None),
            }
        } else {
            std::mem::take(&mut self.current)
        };
        self.remember(&bytes);
        Ok(Some(bytes))
    }

    /// Fill as much of `buf` as the current chunk allows. Returns 0 at end.
    pub async fn read(&mut self, buf: &mut [u8]) -> StoreResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.replaying() {
            let available = &self.history[self.position..];
            let n = available.len().min(buf.len());
            buf[..n].copy_from_slice(&available[..n]);
            self.position += n;
            return Ok(n);
        }
        while self.current.is_empty() {
            match self.pull_chunk().await? {
                Some(bytes) => self.current = bytes,
                None => return Ok(0),
            }
        }
        let n = self.current.len().min(buf.len());
        let piece = self.current.split_to(n);
        buf[..n].copy_from_slice(&piece);
        self.remember(&piece);
        Ok(n)
    }

    /// Drain the rest of the file into memory.
    pub async fn read_to_end(&mut self) -> StoreResult<Vec<u8>> {
        let remaining = self.length.saturating_sub(self.pulled).min(MAX_PREALLOC);
        let mut out = Vec::with_capacity(remaining as usize);
        while let Some(bytes) = self.next_chunk().await? {
            out.extend_from_slice(&bytes);
        }
        Ok(out)
    }

    /// Seek back to the first byte.
    pub fn rewind(&mut self) -> StoreResult<()> {
        if !self.is_rewindable() {
            return Err(StoreError::Unsupported("rewind on a forward-only reader"));
        }
        self.position = 0;
        Ok(())
    }

    /// Release buffered chunks. Later reads report end of file.
    pub fn close(&mut self) {
        self.closed = true;
        self.page = VecDeque::new();
        self.current = Bytes::new();
        self.history = Vec::new();
        self.position = 0;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Forward-only stream of chunk payloads, for response bodies.
    pub fn into_stream(self) -> impl Stream<Item = io::Result<Bytes>> + Send {
        stream::try_unfold(self, |mut reader| async move {
            let next = reader.next_chunk().await.map_err(io::Error::from)?;
            Ok::<_, io::Error>(next.map(|bytes| (bytes, reader)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::file::CustomMetadata;
    use crate::services::{chunk_codec, metadata_store, test_support::memory_pool};
    use futures::TryStreamExt;
    use uuid::Uuid;

    /// Writes `payload` as chunk rows only; returns a matching complete record.
    async fn seeded(payload: &[u8], chunk_size: usize) -> (ChunkCollection, FileInfo) {
        let chunks = ChunkCollection::new(memory_pool().await, "fs");
        chunks.create_table().await.unwrap();
        let id = Uuid::new_v4();
        chunks
            .insert_many(&chunk_codec::split(id, payload, chunk_size, 0))
            .await
            .unwrap();
        let mut file = metadata_store::provisional(
            id,
            "f".into(),
            "t".into(),
            chunk_size as i64,
            CustomMetadata::new(),
        );
        file.length = Some(payload.len() as i64);
        file.checksum = Some(format!("{:x}", md5::compute(payload)));
        (chunks, file)
    }

    fn reader(
        chunks: ChunkCollection,
        file: FileInfo,
        page: i64,
        rewindable: bool,
    ) -> ChunkedReader {
        let id = FileId::from_key(file.id);
        ChunkedReader::new(chunks, id, file, page, rewindable)
    }

    #[tokio::test]
    async fn small_reads_cross_chunk_and_page_boundaries() {
        let payload = b"the quick brown fox jumps over the lazy dog";
        let (chunks, file) = seeded(payload, 5).await;
        let mut r = reader(chunks, file, 2, false);
        assert_eq!(r.size(), payload.len() as u64);

        let mut out = Vec::new();
        let mut buf = [0u8; 3];
        loop {
            let n = r.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, payload);
    }

    #[tokio::test]
    async fn forward_only_reader_cannot_rewind() {
        let (chunks, file) = seeded(b"abc", 2).await;
        let mut r = reader(chunks, file, 4, false);
        assert!(!r.is_rewindable());
        assert_eq!(r.read_to_end().await.unwrap(), b"abc");
        assert!(matches!(r.rewind(), Err(StoreError::Unsupported(_))));
    }

    #[tokio::test]
    async fn rewind_replays_without_losing_the_tail() {
        let payload = b"0123456789abcdef";
        let (chunks, file) = seeded(payload, 4).await;
        let mut r = reader(chunks, file, 1, true);
        assert!(r.is_rewindable());

        let mut head = [0u8; 6];
        let mut got = 0;
        while got < head.len() {
            got += r.read(&mut head[got..]).await.unwrap();
        }
        assert_eq!(&head, b"012345");

        r.rewind().unwrap();
        assert_eq!(r.read_to_end().await.unwrap(), payload);

        r.rewind().unwrap();
        assert_eq!(r.read_to_end().await.unwrap(), payload);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_ends_reads() {
        let (chunks, file) = seeded(b"abcdef", 2).await;
        let mut r = reader(chunks, file, 8, true);
        let mut buf = [0u8; 1];
        r.read(&mut buf).await.unwrap();
        r.close();
        r.close();
        assert!(r.is_closed());
        assert_eq!(r.read(&mut buf).await.unwrap(), 0);
        assert!(r.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_chunk_is_reported() {
        let (chunks, mut file) = seeded(b"", 2).await;
        let mut rows = chunk_codec::split(file.id, b"abcdefgh", 2, 0);
        rows.remove(1);
        chunks.insert_many(&rows).await.unwrap();
        file.length = Some(8);

        let mut r = reader(chunks, file, 8, false);
        assert!(matches!(
            r.read_to_end().await,
            Err(StoreError::CorruptChunk { .. })
        ));
    }

    #[tokio::test]
    async fn truncated_file_is_reported() {
        let (chunks, mut file) = seeded(b"abcd", 2).await;
        file.length = Some(10);
        let mut r = reader(chunks, file, 8, false);
        assert!(matches!(
            r.read_to_end().await,
            Err(StoreError::CorruptChunk { .. })
        ));
    }

    #[tokio::test]
    async fn absurd_stored_length_fails_as_corruption() {
        let (chunks, mut file) = seeded(b"abcd", 2).await;
        file.length = Some(i64::MAX);
        let key = file.id;
        let mut r = reader(chunks, file, 8, false);
        assert_eq!(r.id().key, key);
        match r.read_to_end().await {
            Err(StoreError::CorruptChunk { id, .. }) => assert_eq!(id.key, key),
            other => panic!("expected corruption, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_file_needs_no_chunks() {
        let (chunks, file) = seeded(b"", 4).await;
        let mut r = reader(chunks, file, 8, false);
        assert_eq!(r.size(), 0);
        assert!(r.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stream_yields_whole_payload() {
        let payload: Vec<u8> = (0..100u8).collect();
        let (chunks, file) = seeded(&payload, 7).await;
        let parts: Vec<Bytes> = reader(chunks, file, 3, false)
            .into_stream()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(parts.len(), 15);
        assert_eq!(parts.concat(), payload);
    }
}
