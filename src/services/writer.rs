//! Streams an incoming byte source into a new file.
//!
//! The provisional metadata row goes in first, then the chunk rows one
//! batch at a time, then the length and MD5 complete the metadata row.
//! Readers only see the file once that last step has happened.

use chrono::Utc;
use md5::Context;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

use super::{
    chunk_codec,
    errors::{StoreError, StoreResult},
    grid_store::GridStore,
    metadata_store,
};
use crate::models::{
    file::{DEFAULT_CONTENT_TYPE, UploadOptions},
    file_id::FileId,
};

/// Store everything `reader` yields as a new file named after `external_id`.
///
/// On error, chunk rows already written are left behind together with the
/// provisional metadata row.
pub(crate) async fn create<R>(
    store: &GridStore,
    mut reader: R,
    external_id: &str,
    options: UploadOptions,
) -> StoreResult<FileId>
where
    R: AsyncRead + Unpin,
{
    let file_id = FileId::generate(external_id);
    let result = write_file(store, &mut reader, &file_id, external_id, options).await;
    if let Err(err) = &result {
        warn!(
            file_id = %file_id,
            error = %err,
            "upload failed, written chunks were left in place"
        );
    }
    result.map(|_| file_id)
}

async fn write_file<R>(
    store: &GridStore,
    reader: &mut R,
    file_id: &FileId,
    external_id: &str,
    options: UploadOptions,
) -> StoreResult<()>
where
    R: AsyncRead + Unpin,
{
    let config = store.config();
    let record = metadata_store::provisional(
        file_id.key,
        options.filename.unwrap_or_else(|| external_id.to_string()),
        options
            .content_type
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
        config.chunk_size() as i64,
        options.metadata,
    );
    store.files().insert(&record).await?;

    let mut digest = Context::new();
    let mut length: u64 = 0;
    let mut sequence: i64 = 0;
    let mut batches = 0usize;

    loop {
        let batch = read_batch(reader, config.batch_size()).await?;
        if batch.is_empty() {
            break;
        }
        digest.consume(&batch);
        length += batch.len() as u64;

        let chunks = chunk_codec::split(file_id.key, &batch, config.chunk_size(), sequence);
        sequence += chunks.len() as i64;
        store.chunks().insert_many(&chunks).await?;
        batches += 1;
        debug!(
            file_id = %file_id,
            batch = batches,
            bytes = batch.len(),
            chunks = chunks.len(),
            "wrote batch"
        );

        if batch.len() < config.batch_size() {
            break;
        }
    }

    let checksum = format!("{:x}", digest.compute());
    let finalized = store
        .files()
        .finalize(file_id.key, length as i64, &checksum, Utc::now())
        .await?;
    if !finalized {
        return Err(StoreError::NotFound(file_id.clone()));
    }

    info!(file_id = %file_id, length, chunks = sequence, batches, "stored file");
    Ok(())
}

/// Read until `batch_size` bytes are buffered or the source is exhausted.
async fn read_batch<R>(reader: &mut R, batch_size: usize) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; batch_size];
    let mut filled = 0;
    while filled < batch_size {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}
