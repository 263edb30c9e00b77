//! Represents the metadata record of a stored file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{FromRow, types::Json};
use uuid::Uuid;

/// Content type recorded when the caller does not supply one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Caller-supplied key/value pairs stored verbatim next to a file.
pub type CustomMetadata = Map<String, Value>;

/// The metadata row of a stored file (one per file).
///
/// `length`, `checksum` and `created_at` are written last, after every chunk
/// has landed. A row without them belongs to an upload still in flight (or
/// one that was abandoned) and is never handed out by readers.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct FileInfo {
    /// Internal id, also the `files_id` of every chunk of this file.
    pub id: Uuid,

    /// Display name. Not unique.
    pub filename: String,

    /// MIME type.
    pub content_type: String,

    /// Total size in bytes.
    pub length: Option<i64>,

    /// Chunk size this file was written with.
    pub chunk_size: i64,

    /// Lowercase hex MD5 of the content.
    pub checksum: Option<String>,

    /// When the upload (or copy) completed.
    pub created_at: Option<DateTime<Utc>>,

    /// Opaque caller metadata.
    pub metadata: Json<CustomMetadata>,
}

impl FileInfo {
    /// True once the upload that created this record has finished.
    pub fn is_complete(&self) -> bool {
        self.length.is_some() && self.checksum.is_some()
    }

    /// Number of chunk rows a complete file of this length must have.
    pub fn expected_chunks(&self) -> Option<i64> {
        let length = self.length?;
        if self.chunk_size <= 0 {
            return None;
        }
        Some((length + self.chunk_size - 1) / self.chunk_size)
    }

    /// Raw 16-byte digest decoded from `checksum`, if well formed.
    pub fn checksum_bytes(&self) -> Option<[u8; 16]> {
        let hex = self.checksum.as_deref()?;
        if hex.len() != 32 || !hex.is_ascii() {
            return None;
        }
        let mut out = [0u8; 16];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(out)
    }
}

/// Options accepted when creating a file, by upload or by copy.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadOptions {
    /// Display name; falls back to the external id.
    pub filename: Option<String>,

    /// MIME type; falls back to [`DEFAULT_CONTENT_TYPE`] (or, for copies,
    /// the source's content type).
    pub content_type: Option<String>,

    /// Stored verbatim.
    #[serde(default)]
    pub metadata: CustomMetadata,
}
