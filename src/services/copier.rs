//! Copies a file between two stores of this kind by duplicating chunk rows.
//!
//! Payload bytes are never decoded or hashed again: the chunk rows are
//! re-keyed to the new id and inserted as they are, and the finished
//! metadata row carries over the source's length, checksum and chunk size.

use chrono::Utc;
use sqlx::types::Json;
use tracing::{debug, info, warn};

use super::{
    errors::{StoreError, StoreResult},
    grid_store::GridStore,
};
use crate::models::{
    chunk::Chunk,
    file::{FileInfo, UploadOptions},
    file_id::FileId,
};

/// Copy `source_id` from `source` into `dest` under a new id.
///
/// On error, chunk rows already copied stay behind with no metadata row
/// pointing at them.
pub(crate) async fn copy(
    dest: &GridStore,
    source: &GridStore,
    source_id: &FileId,
    external_id: &str,
    options: UploadOptions,
) -> StoreResult<FileId> {
    let file_id = FileId::generate(external_id);
    let result = copy_file(dest, source, source_id, &file_id, external_id, options).await;
    if let Err(err) = &result {
        warn!(
            source = %source_id,
            file_id = %file_id,
            error = %err,
            "copy failed, copied chunks were left in place"
        );
    }
    result.map(|_| file_id)
}

async fn copy_file(
    dest: &GridStore,
    source: &GridStore,
    source_id: &FileId,
    file_id: &FileId,
    external_id: &str,
    options: UploadOptions,
) -> StoreResult<()> {
    let original = source.file_info(source_id).await?;
    let per_batch = page_size(dest, &original);

    let mut next: i64 = 0;
    let mut copied: i64 = 0;
    loop {
        let batch = source
            .chunks()
            .fetch_range(original.id, next, per_batch)
            .await?;
        let Some(last) = batch.last() else {
            break;
        };
        next = last.n + 1;
        let full = batch.len() as i64 == per_batch;

        let rekeyed: Vec<Chunk> = batch
            .into_iter()
            .map(|chunk| Chunk {
                files_id: file_id.key,
                ..chunk
            })
            .collect();
        dest.chunks().insert_many(&rekeyed).await?;
        copied += rekeyed.len() as i64;
        debug!(source = %source_id, file_id = %file_id, copied, "copied chunk batch");

        if !full {
            break;
        }
    }

    let expected = original.expected_chunks().unwrap_or_default();
    if copied != expected {
        return Err(StoreError::CorruptChunk {
            id: source_id.clone(),
            reason: format!("expected {expected} chunks, copied {copied}"),
        });
    }

    let record = FileInfo {
        id: file_id.key,
        filename: options.filename.unwrap_or_else(|| external_id.to_string()),
        content_type: options.content_type.unwrap_or(original.content_type),
        length: original.length,
        chunk_size: original.chunk_size,
        checksum: original.checksum,
        created_at: Some(Utc::now()),
        metadata: Json(options.metadata),
    };
    dest.files().insert(&record).await?;

    info!(source = %source_id, file_id = %file_id, chunks = copied, "copied file");
    Ok(())
}

/// Chunk rows per page: the destination's batch size in the source's chunks.
fn page_size(dest: &GridStore, original: &FileInfo) -> i64 {
    dest.chunks_per_page(original.chunk_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::grid_store::{StoreConfig, UploadSource};
    use crate::services::test_support::memory_pool;
    use std::io::Cursor;

    #[tokio::test]
    async fn copy_between_prefixes_sharing_a_pool() {
        let pool = memory_pool().await;
        let source = GridStore::new(pool.clone(), StoreConfig::new("src", 3, 6).unwrap());
        let dest = GridStore::new(pool, StoreConfig::new("dst", 5, 10).unwrap());
        source.ensure_collections().await.unwrap();
        dest.ensure_collections().await.unwrap();

        let source_id = source
            .upload(
                UploadSource::stream(Cursor::new(b"copied verbatim".to_vec())),
                "a.txt",
                UploadOptions::default(),
            )
            .await
            .unwrap();

        let copy_id = copy(&dest, &source, &source_id, "b.bin", UploadOptions::default())
            .await
            .unwrap();
        assert_eq!(copy_id.suffix.as_deref(), Some(".bin"));

        let original = source.file_info(&source_id).await.unwrap();
        // Pages follow the destination's batch size: 10 bytes of 3-byte chunks.
        assert_eq!(page_size(&dest, &original), 3);
        assert_eq!(page_size(&source, &original), 2);

        let info = dest.file_info(&copy_id).await.unwrap();
        // The copy keeps the chunk layout it was written with.
        assert_eq!(info.chunk_size, 3);
        assert_eq!(info.filename, "b.bin");
        assert_eq!(dest.read(&copy_id).await.unwrap(), b"copied verbatim");
        assert!(!source.exists(&copy_id).await.unwrap());
    }

    #[tokio::test]
    async fn copy_of_missing_source_is_not_found() {
        let store = GridStore::for_tests(4, 8).await;
        let missing = FileId::generate("gone.txt");
        let err = copy(&store, &store, &missing, "x", UploadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn copy_detects_missing_source_chunks() {
        let store = GridStore::for_tests(2, 4).await;
        let source_id = store
            .upload(
                UploadSource::stream(Cursor::new(b"abcdefgh".to_vec())),
                "s",
                UploadOptions::default(),
            )
            .await
            .unwrap();
        sqlx::query(&format!(
            "DELETE FROM {} WHERE n = 3",
            store.chunks().table()
        ))
        .execute(&*store.db)
        .await
        .unwrap();

        let err = copy(&store, &store, &source_id, "d", UploadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CorruptChunk { .. }));
    }
}
