//! Represents an object (file) as reported by the backing object store.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Metadata for a single stored object, as returned by a stat or a listing.
///
/// The store has no notion of directories; a listing in delimiter mode may
/// still yield entries whose `key` ends in `/` to denote a common prefix.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Object key (path-like identifier within the bucket, no leading `/`).
    pub key: String,

    /// Size in bytes.
    pub size: u64,

    /// Timestamp when the object was last modified.
    pub last_modified: DateTime<Utc>,

    /// Content type (MIME type), when the store reports one.
    pub content_type: Option<String>,

    /// Entity tag reported by the store.
    pub etag: Option<String>,
}

impl ObjectInfo {
    pub fn new(key: impl Into<String>, size: u64, last_modified: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified,
            content_type: None,
            etag: None,
        }
    }
}
