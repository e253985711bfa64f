//! BucketFs: the object-to-filesystem adapter.
//!
//! Turns a request path into a `FileHandle`: directory-like paths become
//! virtual directories without touching the store, file-like paths go
//! through the fallback chain. Everything is built fresh per call; the only
//! shared state is the store client and the immutable configuration.

use crate::{
    config::FsConfig,
    errors::FsResult,
    models::entry::ListingPage,
    services::{
        directory::list_directory,
        fallback::{probe, resolve_file},
        file_handle::{FileHandle, ObjectFile, VirtualDirectory},
        object_store::ObjectStore,
        path_resolver::{ResolvedPath, resolve, root_prefix},
    },
};
use std::sync::Arc;

/// Index documents looked up inside a directory, in order.
const INDEX_DOCUMENTS: [&str; 2] = ["index.html", "index.htm"];

#[derive(Clone)]
pub struct BucketFs {
    store: Arc<dyn ObjectStore>,
    config: Arc<FsConfig>,
}

impl BucketFs {
    pub fn new(store: Arc<dyn ObjectStore>, config: FsConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    /// Open `request_path`, which must start with `/`.
    pub async fn open(&self, request_path: &str) -> FsResult<FileHandle> {
        match resolve(request_path, &self.config.bucket_path) {
            ResolvedPath::Directory { prefix } => Ok(FileHandle::Directory(
                VirtualDirectory::new(self.store.clone(), prefix),
            )),
            ResolvedPath::File { key } => {
                let file =
                    resolve_file(self.store.as_ref(), &key, self.config.spa_file.as_deref())
                        .await?;
                Ok(FileHandle::File(file.into()))
            }
        }
    }

    /// Look for an index document directly inside `dir`. Only exact keys are
    /// probed; the SPA and 404 fallbacks never stand in for an index.
    pub async fn open_index(&self, dir: &VirtualDirectory) -> Option<FileHandle> {
        for name in INDEX_DOCUMENTS {
            let key = format!("{}{}", dir.prefix(), name);
            if let Some((reader, info)) = probe(self.store.as_ref(), &key).await {
                return Some(FileHandle::File(ObjectFile::from_parts(reader, info)));
            }
        }
        None
    }

    /// File served in place of a directory with nothing under it. The prefix
    /// goes through the fallback chain as a file key, so a single page app or
    /// `404.html` answers for it. The served root never falls back.
    pub async fn open_empty_directory(&self, prefix: &str) -> FsResult<Option<FileHandle>> {
        if prefix == root_prefix(&self.config.bucket_path) {
            return Ok(None);
        }
        let key = prefix.trim_end_matches('/');
        let file = resolve_file(self.store.as_ref(), key, self.config.spa_file.as_deref()).await?;
        Ok(Some(FileHandle::File(file.into())))
    }

    /// Cheap reachability check: list at most one entry of the served root.
    pub async fn check_listing(&self) -> FsResult<ListingPage> {
        let prefix = root_prefix(&self.config.bucket_path);
        list_directory(self.store.as_ref(), &prefix, 1).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{errors::FsError, services::memory_store::MemoryStore};

    fn bucket_fs(store: &MemoryStore, bucket_path: &str, spa_file: Option<&str>) -> BucketFs {
        BucketFs::new(
            Arc::new(store.clone()),
            FsConfig {
                bucket_path: bucket_path.into(),
                spa_file: spa_file.map(String::from),
            },
        )
    }

    async fn read_all(handle: &mut FileHandle) -> String {
        let mut out = Vec::new();
        let mut buf = [0u8; 4];
        loop {
            let n = handle.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn directory_paths_do_not_touch_the_store() {
        let store = MemoryStore::new();
        let fs = bucket_fs(&store, "/", None);

        let handle = fs.open("/docs/").await.unwrap();
        assert!(handle.is_dir());
        let handle = fs.open("/").await.unwrap();
        assert!(handle.is_dir());
        assert_eq!(store.gets(), 0);
        assert_eq!(store.pages_fetched(), 0);
    }

    #[tokio::test]
    async fn file_paths_resolve_under_bucket_path() {
        let store = MemoryStore::new();
        store.put("site/css/main.css", "body{}");
        let fs = bucket_fs(&store, "/site", None);

        let mut handle = fs.open("/css/main.css").await.unwrap();
        assert_eq!(handle.stat().name(), "main.css");
        assert_eq!(read_all(&mut handle).await, "body{}");
    }

    #[tokio::test]
    async fn spa_file_is_an_absolute_key() {
        let store = MemoryStore::new();
        store.put("app.html", "spa");
        let fs = bucket_fs(&store, "/site", Some("app.html"));

        let mut handle = fs.open("/deep/link").await.unwrap();
        assert_eq!(read_all(&mut handle).await, "spa");
    }

    #[tokio::test]
    async fn missing_everything_is_not_found() {
        let store = MemoryStore::new();
        let fs = bucket_fs(&store, "/", None);

        assert!(matches!(fs.open("/nope").await, Err(FsError::NotFound)));
    }

    #[tokio::test]
    async fn open_index_ignores_fallbacks() {
        let store = MemoryStore::new();
        store.put("app.html", "spa");
        store.put("404.html", "missing");
        store.put("docs/index.htm", "old index");
        let fs = bucket_fs(&store, "/", Some("app.html"));

        let FileHandle::Directory(docs) = fs.open("/docs/").await.unwrap() else {
            panic!("expected a directory");
        };
        let mut index = fs.open_index(&docs).await.unwrap();
        assert_eq!(read_all(&mut index).await, "old index");

        let FileHandle::Directory(empty) = fs.open("/empty/").await.unwrap() else {
            panic!("expected a directory");
        };
        assert!(fs.open_index(&empty).await.is_none());
    }

    #[tokio::test]
    async fn directory_request_serves_its_index_document() {
        let store = MemoryStore::new();
        store.put("docs/index.html", "docs home");
        let fs = bucket_fs(&store, "/", None);

        let FileHandle::Directory(docs) = fs.open("/docs/").await.unwrap() else {
            panic!("expected a directory");
        };
        let mut index = fs.open_index(&docs).await.unwrap();
        assert_eq!(index.stat().name(), "index.html");
        assert_eq!(read_all(&mut index).await, "docs home");
    }

    #[tokio::test]
    async fn empty_directory_falls_back_to_spa_file() {
        let store = MemoryStore::new();
        store.put("app.html", "spa");
        let fs = bucket_fs(&store, "/", Some("/app.html"));

        let mut handle = fs.open_empty_directory("users/").await.unwrap().unwrap();
        assert_eq!(read_all(&mut handle).await, "spa");
    }

    #[tokio::test]
    async fn empty_directory_without_fallbacks_is_not_found() {
        let store = MemoryStore::new();
        let fs = bucket_fs(&store, "/site", None);

        assert!(matches!(
            fs.open_empty_directory("site/x/").await,
            Err(FsError::NotFound)
        ));
        assert!(fs.open_empty_directory("site/").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn check_listing_reads_one_entry() {
        let store = MemoryStore::with_page_size(10);
        for i in 0..50 {
            store.put(&format!("site/{i:02}.html"), "x");
        }
        let fs = bucket_fs(&store, "/site/", None);

        let page = fs.check_listing().await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(store.entries_listed(), 1);
    }
}
