//! In-process object store.
//!
//! Keeps objects in a sorted map and pages listings the way a remote store
//! does. Counters and failure injection make it usable as a test double for
//! the fallback chain and the bounded directory listing.

use crate::{
    models::object::ObjectInfo,
    services::object_store::{
        ObjectReader, ObjectStore, ObjectStream, StoreError, StoreResult, seek_target,
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use std::{
    collections::{BTreeMap, HashSet, VecDeque},
    io::SeekFrom,
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio_util::sync::CancellationToken;

const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Clone)]
struct StoredObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
}

#[derive(Default)]
struct Faults {
    get: HashSet<String>,
    stat: HashSet<String>,
    seek: HashSet<String>,
    listing_after: Option<usize>,
}

#[derive(Default)]
struct Counters {
    gets: AtomicUsize,
    closes: AtomicUsize,
    pages: AtomicUsize,
    listed: AtomicUsize,
}

struct Inner {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    faults: Mutex<Faults>,
    counters: Counters,
    page_size: usize,
    last_cancel: Mutex<Option<CancellationToken>>,
}

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Store whose listings return at most `page_size` entries per page.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                objects: RwLock::new(BTreeMap::new()),
                faults: Mutex::new(Faults::default()),
                counters: Counters::default(),
                page_size: page_size.max(1),
                last_cancel: Mutex::new(None),
            }),
        }
    }

    pub fn put(&self, key: &str, data: impl Into<Bytes>) {
        self.put_at(key, data, Utc::now());
    }

    pub fn put_at(&self, key: &str, data: impl Into<Bytes>, last_modified: DateTime<Utc>) {
        let object = StoredObject {
            data: data.into(),
            last_modified,
        };
        write(&self.inner.objects).insert(key.to_string(), object);
    }

    /// Make `get_object` fail with a transient error for `key`.
    pub fn fail_get(&self, key: &str) {
        lock(&self.inner.faults).get.insert(key.to_string());
    }

    /// Let `key` be opened but fail every stat, like an object that is not
    /// yet fully committed.
    pub fn fail_stat(&self, key: &str) {
        lock(&self.inner.faults).stat.insert(key.to_string());
    }

    /// Make every seek on `key` fail with a transient error.
    pub fn fail_seek(&self, key: &str) {
        lock(&self.inner.faults).seek.insert(key.to_string());
    }

    /// Fail listings after `entries` entries have been yielded.
    pub fn fail_listing_after(&self, entries: usize) {
        lock(&self.inner.faults).listing_after = Some(entries);
    }

    pub fn gets(&self) -> usize {
        self.inner.counters.gets.load(Ordering::SeqCst)
    }

    /// Number of readers actually released.
    pub fn closes(&self) -> usize {
        self.inner.counters.closes.load(Ordering::SeqCst)
    }

    pub fn pages_fetched(&self) -> usize {
        self.inner.counters.pages.load(Ordering::SeqCst)
    }

    /// Listing entries handed out to consumers.
    pub fn entries_listed(&self) -> usize {
        self.inner.counters.listed.load(Ordering::SeqCst)
    }

    /// Token passed to the most recent `list_objects` call.
    pub fn last_list_cancel(&self) -> Option<CancellationToken> {
        lock(&self.inner.last_cancel).clone()
    }
}

impl Inner {
    /// One page of the (optionally delimiter-grouped) listing, starting at
    /// entry `offset`.
    fn list_page(&self, prefix: &str, recursive: bool, offset: usize) -> Vec<ObjectInfo> {
        self.counters.pages.fetch_add(1, Ordering::SeqCst);
        let objects = read(&self.objects);
        let mut seen_prefixes = HashSet::new();

        objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter_map(|(key, object)| {
                let rest = &key[prefix.len()..];
                match rest.find('/') {
                    Some(pos) if !recursive => {
                        let common = format!("{}{}", prefix, &rest[..=pos]);
                        seen_prefixes
                            .insert(common.clone())
                            .then(|| ObjectInfo::new(common, 0, Utc::now()))
                    }
                    _ => Some(ObjectInfo::new(
                        key.clone(),
                        object.data.len() as u64,
                        object.last_modified,
                    )),
                }
            })
            .skip(offset)
            .take(self.page_size)
            .collect()
    }
}

#[derive(Default)]
struct ListCursor {
    offset: usize,
    yielded: usize,
    pending: VecDeque<ObjectInfo>,
    exhausted: bool,
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_object(&self, key: &str) -> StoreResult<Box<dyn ObjectReader>> {
        self.inner.counters.gets.fetch_add(1, Ordering::SeqCst);
        if lock(&self.inner.faults).get.contains(key) {
            return Err(StoreError::Request(format!("injected get failure for `{key}`")));
        }

        let object = read(&self.inner.objects)
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NoSuchKey(key.to_string()))?;
        let stat_fails = lock(&self.inner.faults).stat.contains(key);
        let seek_fails = lock(&self.inner.faults).seek.contains(key);

        Ok(Box::new(MemoryReader {
            store: self.inner.clone(),
            info: ObjectInfo::new(key, object.data.len() as u64, object.last_modified),
            data: object.data,
            offset: 0,
            stat_fails,
            seek_fails,
            closed: false,
        }))
    }

    fn list_objects(
        &self,
        prefix: &str,
        recursive: bool,
        cancel: CancellationToken,
    ) -> ObjectStream {
        *lock(&self.inner.last_cancel) = Some(cancel.clone());
        let inner = self.inner.clone();
        let prefix = prefix.to_string();

        stream::unfold(ListCursor::default(), move |mut cursor| {
            let inner = inner.clone();
            let prefix = prefix.clone();
            let cancel = cancel.clone();
            async move {
                if cancel.is_cancelled() {
                    return None;
                }
                let fail_after = lock(&inner.faults).listing_after;
                if let Some(limit) = fail_after {
                    if cursor.yielded >= limit && !cursor.exhausted {
                        cursor.exhausted = true;
                        cursor.pending.clear();
                        let err = StoreError::Request("injected listing failure".into());
                        return Some((Err(err), cursor));
                    }
                }
                if cursor.pending.is_empty() && !cursor.exhausted {
                    let page = inner.list_page(&prefix, recursive, cursor.offset);
                    cursor.offset += page.len();
                    cursor.exhausted = page.len() < inner.page_size;
                    cursor.pending.extend(page);
                }

                let info = cursor.pending.pop_front()?;
                cursor.yielded += 1;
                inner.counters.listed.fetch_add(1, Ordering::SeqCst);
                Some((Ok(info), cursor))
            }
        })
        .boxed()
    }
}

struct MemoryReader {
    store: Arc<Inner>,
    info: ObjectInfo,
    data: Bytes,
    offset: u64,
    stat_fails: bool,
    seek_fails: bool,
    closed: bool,
}

#[async_trait]
impl ObjectReader for MemoryReader {
    async fn stat(&mut self) -> StoreResult<ObjectInfo> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        if self.stat_fails {
            return Err(StoreError::Request(format!(
                "injected stat failure for `{}`",
                self.info.key
            )));
        }
        Ok(self.info.clone())
    }

    async fn read(&mut self, buf: &mut [u8]) -> StoreResult<usize> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        let start = (self.offset as usize).min(self.data.len());
        let available = &self.data[start..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.offset += n as u64;
        Ok(n)
    }

    async fn seek(&mut self, pos: SeekFrom) -> StoreResult<u64> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        if self.seek_fails {
            return Err(StoreError::Request(format!(
                "injected seek failure for `{}`",
                self.info.key
            )));
        }
        self.offset = seek_target(pos, self.offset, self.data.len() as u64)?;
        Ok(self.offset)
    }

    async fn close(&mut self) -> StoreResult<()> {
        if !self.closed {
            self.closed = true;
            self.data = Bytes::new();
            self.store.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(store: &MemoryStore, prefix: &str, recursive: bool) -> Vec<String> {
        store
            .list_objects(prefix, recursive, CancellationToken::new())
            .map(|item| item.unwrap().key)
            .collect()
            .await
    }

    #[tokio::test]
    async fn groups_common_prefixes_when_not_recursive() {
        let store = MemoryStore::new();
        store.put("a/b.txt", "b");
        store.put("a/c/d.txt", "d");
        store.put("a/c/e.txt", "e");
        store.put("z.txt", "z");

        assert_eq!(collect(&store, "a/", false).await, vec!["a/b.txt", "a/c/"]);
        assert_eq!(
            collect(&store, "a/", true).await,
            vec!["a/b.txt", "a/c/d.txt", "a/c/e.txt"]
        );
    }

    #[tokio::test]
    async fn pages_through_large_listings() {
        let store = MemoryStore::with_page_size(10);
        for i in 0..25 {
            store.put(&format!("k/{i:03}"), "x");
        }

        assert_eq!(collect(&store, "k/", true).await.len(), 25);
        assert_eq!(store.pages_fetched(), 3);
    }

    #[tokio::test]
    async fn cancelled_listing_stops_fetching() {
        let store = MemoryStore::with_page_size(1);
        store.put("a", "1");
        store.put("b", "2");
        let cancel = CancellationToken::new();
        let mut listing = store.list_objects("", true, cancel.clone());

        assert_eq!(listing.next().await.unwrap().unwrap().key, "a");
        cancel.cancel();
        assert!(listing.next().await.is_none());
        assert_eq!(store.pages_fetched(), 1);
    }

    #[tokio::test]
    async fn reader_reads_seeks_and_closes_once() {
        let store = MemoryStore::new();
        store.put("f.txt", "hello world");
        let mut reader = store.get_object("f.txt").await.unwrap();

        assert_eq!(reader.seek(SeekFrom::End(-5)).await.unwrap(), 6);
        let mut buf = [0u8; 16];
        let n = reader.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"world");
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);

        reader.close().await.unwrap();
        reader.close().await.unwrap();
        assert_eq!(store.closes(), 1);
        assert!(matches!(
            reader.read(&mut buf).await,
            Err(StoreError::Closed)
        ));
    }

    #[tokio::test]
    async fn missing_key_is_no_such_key() {
        let store = MemoryStore::new();
        let err = store.get_object("nope").await.err().unwrap();
        assert!(err.is_no_such_key());
    }
}
