//! S3-compatible object store client built on `rust-s3`.
//!
//! Readers are lazy: opening an object performs no request. `stat` issues a
//! HEAD and `read` issues ranged GETs in fixed windows starting at the
//! current offset, so seeking never downloads skipped bytes.

use crate::{
    config::StoreConfig,
    models::object::ObjectInfo,
    services::object_store::{
        ObjectReader, ObjectStore, ObjectStream, StoreError, StoreResult, seek_target,
    },
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use s3::{Region, bucket::Bucket, creds::Credentials, error::S3Error};
use std::{collections::VecDeque, io::SeekFrom};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Bytes fetched per ranged GET.
const READ_WINDOW: u64 = 4 * 1024 * 1024;

#[derive(Clone)]
pub struct S3Store {
    bucket: Box<Bucket>,
}

impl S3Store {
    pub fn new(cfg: &StoreConfig) -> Result<Self> {
        let credentials = match (&cfg.access_key, &cfg.secret_key) {
            (Some(access), Some(secret)) => {
                Credentials::new(Some(access.as_str()), Some(secret.as_str()), None, None, None)
                    .context("building static credentials")?
            }
            // env vars, shared profile, then instance metadata
            _ => Credentials::default()
                .or_else(|_| Credentials::anonymous())
                .context("resolving credentials")?,
        };

        let region = Region::Custom {
            region: cfg.region.clone(),
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
        };

        let bucket = Bucket::new(&cfg.bucket, region, credentials)
            .with_context(|| format!("creating client for bucket `{}`", cfg.bucket))?;
        let bucket = if cfg.path_style {
            bucket.with_path_style()
        } else {
            bucket
        };

        Ok(Self { bucket })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get_object(&self, key: &str) -> StoreResult<Box<dyn ObjectReader>> {
        Ok(Box::new(S3Object {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            info: None,
            offset: 0,
            window: Bytes::new(),
            window_start: 0,
            closed: false,
        }))
    }

    fn list_objects(
        &self,
        prefix: &str,
        recursive: bool,
        cancel: CancellationToken,
    ) -> ObjectStream {
        let bucket = self.bucket.clone();
        let prefix = prefix.to_string();
        let delimiter = (!recursive).then(|| "/".to_string());

        stream::try_unfold(ListCursor::default(), move |mut cursor| {
            let bucket = bucket.clone();
            let prefix = prefix.clone();
            let delimiter = delimiter.clone();
            let cancel = cancel.clone();
            async move {
                loop {
                    if let Some(info) = cursor.pending.pop_front() {
                        return Ok(Some((info, cursor)));
                    }
                    if cursor.exhausted || cancel.is_cancelled() {
                        return Ok(None);
                    }

                    let page = tokio::select! {
                        _ = cancel.cancelled() => return Ok(None),
                        page = bucket.list_page(
                            prefix.clone(),
                            delimiter.clone(),
                            cursor.continuation.take(),
                            None,
                            None,
                        ) => page,
                    };
                    let (result, status) = page.map_err(request_error)?;
                    if !(200..300).contains(&status) {
                        return Err(StoreError::Request(format!(
                            "listing `{prefix}` returned status {status}"
                        )));
                    }

                    let mut entries: Vec<ObjectInfo> = result
                        .contents
                        .into_iter()
                        .map(|obj| {
                            let modified = parse_timestamp(&obj.last_modified);
                            let mut info = ObjectInfo::new(obj.key, obj.size, modified);
                            info.etag = obj.e_tag;
                            info
                        })
                        .collect();
                    entries.extend(
                        result
                            .common_prefixes
                            .unwrap_or_default()
                            .into_iter()
                            .map(|cp| ObjectInfo::new(cp.prefix, 0, Utc::now())),
                    );
                    entries.sort_by(|a, b| a.key.cmp(&b.key));
                    debug!(prefix = %prefix, count = entries.len(), "fetched listing page");

                    cursor.continuation = result.next_continuation_token;
                    cursor.exhausted = !result.is_truncated || cursor.continuation.is_none();
                    cursor.pending.extend(entries);
                }
            }
        })
        .boxed()
    }
}

#[derive(Default)]
struct ListCursor {
    continuation: Option<String>,
    pending: VecDeque<ObjectInfo>,
    exhausted: bool,
}

struct S3Object {
    bucket: Box<Bucket>,
    key: String,
    info: Option<ObjectInfo>,
    offset: u64,
    window: Bytes,
    window_start: u64,
    closed: bool,
}

impl S3Object {
    fn window_covers(&self, offset: u64) -> bool {
        offset >= self.window_start && offset < self.window_start + self.window.len() as u64
    }

    async fn fill_window(&mut self, size: u64) -> StoreResult<()> {
        let end = (self.offset + READ_WINDOW).min(size) - 1;
        let response = self
            .bucket
            .get_object_range(&self.key, self.offset, Some(end))
            .await
            .map_err(|err| classify(&self.key, err))?;
        match response.status_code() {
            200..=299 => {}
            404 => return Err(StoreError::NoSuchKey(self.key.clone())),
            code => {
                return Err(StoreError::Request(format!(
                    "GET `{}` returned status {code}",
                    self.key
                )));
            }
        }
        self.window = response.bytes().clone();
        self.window_start = self.offset;
        Ok(())
    }
}

#[async_trait]
impl ObjectReader for S3Object {
    async fn stat(&mut self) -> StoreResult<ObjectInfo> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        if let Some(info) = &self.info {
            return Ok(info.clone());
        }

        let (head, status) = self
            .bucket
            .head_object(&self.key)
            .await
            .map_err(|err| classify(&self.key, err))?;
        match status {
            200..=299 => {}
            404 => return Err(StoreError::NoSuchKey(self.key.clone())),
            code => {
                return Err(StoreError::Request(format!(
                    "HEAD `{}` returned status {code}",
                    self.key
                )));
            }
        }

        let modified = head
            .last_modified
            .as_deref()
            .map(parse_timestamp)
            .unwrap_or_else(Utc::now);
        let mut info = ObjectInfo::new(
            self.key.clone(),
            head.content_length.unwrap_or(0).max(0) as u64,
            modified,
        );
        info.content_type = head.content_type;
        info.etag = head.e_tag;
        self.info = Some(info.clone());
        Ok(info)
    }

    async fn read(&mut self, buf: &mut [u8]) -> StoreResult<usize> {
        let size = self.stat().await?.size;
        if buf.is_empty() || self.offset >= size {
            return Ok(0);
        }
        if !self.window_covers(self.offset) {
            self.fill_window(size).await?;
            if self.window.is_empty() {
                return Ok(0);
            }
        }

        let start = (self.offset - self.window_start) as usize;
        let available = &self.window[start..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.offset += n as u64;
        Ok(n)
    }

    async fn seek(&mut self, pos: SeekFrom) -> StoreResult<u64> {
        let size = match pos {
            SeekFrom::End(_) => self.stat().await?.size,
            _ => 0,
        };
        if self.closed {
            return Err(StoreError::Closed);
        }
        self.offset = seek_target(pos, self.offset, size)?;
        Ok(self.offset)
    }

    async fn close(&mut self) -> StoreResult<()> {
        self.closed = true;
        self.window = Bytes::new();
        Ok(())
    }
}

fn classify(key: &str, err: S3Error) -> StoreError {
    match err {
        S3Error::HttpFailWithBody(404, _) => StoreError::NoSuchKey(key.to_string()),
        other => request_error(other),
    }
}

fn request_error(err: S3Error) -> StoreError {
    StoreError::Request(err.to_string())
}

/// Listings report RFC 3339 timestamps, HEAD responses RFC 2822 dates.
fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_rfc2822(value))
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
