//! The identifier handed back to callers after a file is stored.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, path::Path, str::FromStr};
use uuid::Uuid;

use crate::services::errors::StoreError;

/// A stored file's id as seen by callers.
///
/// `key` is the lookup key of the metadata and chunk rows. `suffix` is the
/// extension of the external id the file was stored under (`.jpg`, with the
/// dot), kept only so callers can guess a file type from the id string.
/// The textual form is `key` followed by `suffix`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FileId {
    pub key: Uuid,
    pub suffix: Option<String>,
}

impl FileId {
    /// Fresh key, suffix taken from the extension of `external_id`.
    pub fn generate(external_id: &str) -> Self {
        Self {
            key: Uuid::new_v4(),
            suffix: extension_suffix(external_id),
        }
    }

    pub fn from_key(key: Uuid) -> Self {
        Self { key, suffix: None }
    }
}

/// `"photos/cat.JPG"` -> `Some(".JPG")`, `"foo"` -> `None`.
fn extension_suffix(external_id: &str) -> Option<String> {
    Path::new(external_id)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{ext}"))
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key.hyphenated())?;
        if let Some(suffix) = &self.suffix {
            f.write_str(suffix)?;
        }
        Ok(())
    }
}

impl FromStr for FileId {
    type Err = StoreError;

    /// Hyphenated UUIDs contain no dot, so everything from the first dot on
    /// is the suffix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, suffix) = match s.find('.') {
            Some(pos) => (&s[..pos], Some(&s[pos..])),
            None => (s, None),
        };
        let key = Uuid::parse_str(key).map_err(|_| StoreError::InvalidFileId(s.to_string()))?;
        Ok(Self {
            key,
            suffix: suffix.filter(|sfx| sfx.len() > 1).map(str::to_string),
        })
    }
}

impl Serialize for FileId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FileId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
