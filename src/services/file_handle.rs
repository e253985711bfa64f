//! Uniform handle over resolved files and virtual directories.

use crate::{
    errors::{FsError, FsResult},
    models::{
        entry::{ListingPage, ResolvedEntry},
        object::ObjectInfo,
    },
    services::{
        directory::list_directory,
        fallback::ResolvedFile,
        object_store::{ObjectReader, ObjectStore},
    },
};
use std::{io::SeekFrom, sync::Arc};

/// What the HTTP layer gets back from `BucketFs::open`.
pub enum FileHandle {
    File(ObjectFile),
    Directory(VirtualDirectory),
}

/// A live object stream plus the stat that admitted it.
pub struct ObjectFile {
    reader: Box<dyn ObjectReader>,
    info: ObjectInfo,
    closed: bool,
}

/// A directory marker. Opening one costs nothing; only `readdir` hits the
/// store.
pub struct VirtualDirectory {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl ObjectFile {
    /// Wrap a reader whose stat already succeeded.
    pub(crate) fn from_parts(reader: Box<dyn ObjectReader>, info: ObjectInfo) -> Self {
        Self {
            reader,
            info,
            closed: false,
        }
    }
}

impl From<ResolvedFile> for ObjectFile {
    fn from(file: ResolvedFile) -> Self {
        Self::from_parts(file.reader, file.info)
    }
}

impl VirtualDirectory {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// Listing prefix: `""` for the root, otherwise ending in `/`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl FileHandle {
    pub fn is_dir(&self) -> bool {
        matches!(self, FileHandle::Directory(_))
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> FsResult<usize> {
        match self {
            FileHandle::File(file) => Ok(file.reader.read(buf).await?),
            FileHandle::Directory(_) => Err(FsError::InvalidOperation("read on a directory")),
        }
    }

    pub async fn seek(&mut self, pos: SeekFrom) -> FsResult<u64> {
        match self {
            FileHandle::File(file) => Ok(file.reader.seek(pos).await?),
            FileHandle::Directory(_) => Err(FsError::InvalidOperation("seek on a directory")),
        }
    }

    /// Release the object stream. Idempotent; a no-op for directories.
    pub async fn close(&mut self) -> FsResult<()> {
        match self {
            FileHandle::File(file) if !file.closed => {
                file.closed = true;
                Ok(file.reader.close().await?)
            }
            _ => Ok(()),
        }
    }

    /// Files report the store's stat; directories a synthetic entry stamped
    /// with the current time.
    pub fn stat(&self) -> ResolvedEntry {
        match self {
            FileHandle::File(file) => ResolvedEntry::File(file.info.clone()),
            FileHandle::Directory(dir) => ResolvedEntry::directory(&dir.prefix),
        }
    }

    /// List up to `count` entries (`count <= 0` lists everything).
    pub async fn readdir(&mut self, count: i64) -> FsResult<ListingPage> {
        match self {
            FileHandle::Directory(dir) => {
                list_directory(dir.store.as_ref(), &dir.prefix, count).await
            }
            FileHandle::File(_) => Err(FsError::InvalidOperation("readdir on a file")),
        }
    }
}
