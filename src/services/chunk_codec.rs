//! Pure conversion between byte buffers and chunk rows. No I/O.

use uuid::Uuid;

use crate::models::chunk::Chunk;

/// Cut `bytes` into chunks of at most `chunk_size` bytes, numbered from
/// `start_sequence` upward and owned by `files_id`.
///
/// Only the final piece can be shorter than `chunk_size`. An empty buffer
/// yields no chunks. `chunk_size` must be non-zero.
pub fn split(files_id: Uuid, bytes: &[u8], chunk_size: usize, start_sequence: i64) -> Vec<Chunk> {
    assert!(chunk_size > 0, "chunk size must be non-zero");
    bytes
        .chunks(chunk_size)
        .zip(start_sequence..)
        .map(|(piece, n)| Chunk {
            files_id,
            n,
            data: piece.to_vec(),
        })
        .collect()
}

/// Concatenate chunks in sequence order, whatever order they arrive in.
pub fn join(chunks: &[Chunk]) -> Vec<u8> {
    let mut ordered: Vec<&Chunk> = chunks.iter().collect();
    ordered.sort_by_key(|chunk| chunk.n);
    let mut out = Vec::with_capacity(ordered.iter().map(|c| c.len()).sum());
    for chunk in ordered {
        out.extend_from_slice(&chunk.data);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_numbers_from_start_sequence() {
        let id = Uuid::new_v4();
        let chunks = split(id, b"abcdefghij", 4, 7);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.iter().map(|c| c.n).collect::<Vec<_>>(), vec![7, 8, 9]);
        assert_eq!(chunks[0].data, b"abcd");
        assert_eq!(chunks[2].data, b"ij");
        assert!(chunks.iter().all(|c| c.files_id == id));
    }

    #[test]
    fn split_empty_buffer_is_empty() {
        assert!(split(Uuid::new_v4(), b"", 4, 0).is_empty());
    }

    #[test]
    fn join_inverts_split_for_various_sizes() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        for chunk_size in [1, 3, 7, 64, 999, 1000, 4096] {
            let chunks = split(Uuid::new_v4(), &payload, chunk_size, 0);
            assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= chunk_size));
            assert_eq!(join(&chunks), payload, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn join_orders_by_sequence() {
        let mut chunks = split(Uuid::new_v4(), b"hello world", 3, 0);
        chunks.reverse();
        assert_eq!(join(&chunks), b"hello world");
    }
}
