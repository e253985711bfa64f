//! Object store client abstraction.
//!
//! The adapter only needs three primitives from a store: open an object for
//! reading, stat it, and enumerate keys under a prefix. Listing is exposed as
//! a lazy stream so callers can stop early; implementations must stop
//! fetching pages once the supplied token is cancelled or the stream dropped.

use crate::models::object::ObjectInfo;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::io::SeekFrom;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no such key `{0}`")]
    NoSuchKey(String),
    #[error("object store request failed: {0}")]
    Request(String),
    #[error("invalid seek to offset {0}")]
    InvalidSeek(i64),
    #[error("object reader already closed")]
    Closed,
}

impl StoreError {
    /// True for the expected "key does not exist" miss.
    pub fn is_no_such_key(&self) -> bool {
        matches!(self, StoreError::NoSuchKey(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Lazy, cancellable sequence of listing entries.
pub type ObjectStream = BoxStream<'static, StoreResult<ObjectInfo>>;

#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Open `key` for reading. Implementations may defer all network I/O
    /// until the first `stat` or `read`, so success here does not prove the
    /// object exists.
    async fn get_object(&self, key: &str) -> StoreResult<Box<dyn ObjectReader>>;

    /// Enumerate keys starting with `prefix`, in lexical order.
    ///
    /// When `recursive` is false, keys containing a further `/` after the
    /// prefix are grouped into a single entry ending in `/`.
    fn list_objects(&self, prefix: &str, recursive: bool, cancel: CancellationToken)
    -> ObjectStream;
}

/// Seekable reader over a single object.
#[async_trait]
pub trait ObjectReader: Send {
    async fn stat(&mut self) -> StoreResult<ObjectInfo>;

    /// Read into `buf`, returning 0 at end of object.
    async fn read(&mut self, buf: &mut [u8]) -> StoreResult<usize>;

    async fn seek(&mut self, pos: SeekFrom) -> StoreResult<u64>;

    /// Release the underlying resources. Calling it again is a no-op.
    async fn close(&mut self) -> StoreResult<()>;
}

/// Resolve a seek request against the current offset and object size.
pub(crate) fn seek_target(pos: SeekFrom, offset: u64, size: u64) -> StoreResult<u64> {
    let target = match pos {
        SeekFrom::Start(n) => return Ok(n),
        SeekFrom::Current(delta) => offset as i64 + delta,
        SeekFrom::End(delta) => size as i64 + delta,
    };
    if target < 0 {
        return Err(StoreError::InvalidSeek(target));
    }
    Ok(target as u64)
}
