//! Static file serving on top of `BucketFs`.
//! Object bodies are streamed from the handle; directories get their
//! index document or an HTML listing.

use crate::{
    errors::{AppError, FsError},
    models::entry::{ListingPage, ResolvedEntry},
    services::{file_handle::FileHandle, path_resolver::directory_path},
    state::AppState,
};
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream;
use std::io::{self, SeekFrom};
use tracing::debug;

/// Bytes read from the store per body chunk.
const STREAM_CHUNK: u64 = 64 * 1024;

/// Parsed `Range` header against a known object size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// No usable range; serve the whole object.
    Full,
    /// Inclusive byte span.
    Partial(u64, u64),
    Unsatisfiable,
}

/// `GET /` and `GET /{*path}` (HEAD is derived by axum).
pub async fn serve_path(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let raw = uri.path();
    let path = urlencoding::decode(raw)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| raw.to_string());

    match state.fs.open(&path).await? {
        FileHandle::Directory(dir) => {
            if !path.ends_with('/') {
                let location = encode_path(&directory_path(&path));
                let location = match uri.query() {
                    Some(query) => format!("{location}?{query}"),
                    None => location,
                };
                return Ok(redirect(&location));
            }
            if let Some(index) = state.fs.open_index(&dir).await {
                return serve_file(index, &headers).await;
            }
            let prefix = dir.prefix().to_string();
            let mut handle = FileHandle::Directory(dir);
            let entries = handle.readdir(state.listing_limit).await?;
            if entries.is_empty() {
                if let Some(file) = state.fs.open_empty_directory(&prefix).await? {
                    return serve_file(file, &headers).await;
                }
            }
            Ok(render_listing(entries))
        }
        file => serve_file(file, &headers).await,
    }
}

/// Percent-encode each segment of a decoded path.
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

async fn serve_file(mut handle: FileHandle, headers: &HeaderMap) -> Result<Response, AppError> {
    let ResolvedEntry::File(info) = handle.stat() else {
        return Err(FsError::InvalidOperation("serving a directory as a file").into());
    };
    let size = info.size;
    let content_type = info.content_type.clone().unwrap_or_else(|| {
        mime_guess::from_path(&info.key)
            .first_or_octet_stream()
            .to_string()
    });

    if not_modified(headers, info.last_modified) {
        release(&mut handle).await;
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NOT_MODIFIED;
        set_last_modified(response.headers_mut(), info.last_modified);
        return Ok(response);
    }

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(|v| parse_range_header(v, size))
        .unwrap_or(ByteRange::Full);

    let (status, start, length) = match range {
        ByteRange::Full => (StatusCode::OK, 0, size),
        ByteRange::Partial(start, end) => (StatusCode::PARTIAL_CONTENT, start, end - start + 1),
        ByteRange::Unsatisfiable => {
            release(&mut handle).await;
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::RANGE_NOT_SATISFIABLE;
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", size)) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
            return Ok(response);
        }
    };

    if start > 0 {
        if let Err(err) = handle.seek(SeekFrom::Start(start)).await {
            release(&mut handle).await;
            return Err(err.into());
        }
    }
    debug!(key = %info.key, start, length, "streaming object");

    let mut response = Response::new(stream_body(handle, length));
    *response.status_mut() = status;
    let resp_headers = response.headers_mut();
    resp_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    resp_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    resp_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if status == StatusCode::PARTIAL_CONTENT {
        let content_range = format!("bytes {}-{}/{}", start, start + length - 1, size);
        if let Ok(value) = HeaderValue::from_str(&content_range) {
            resp_headers.insert(header::CONTENT_RANGE, value);
        }
    }
    if let Some(etag) = info.etag.as_ref() {
        let quoted = if etag.starts_with('"') {
            etag.clone()
        } else {
            format!("\"{}\"", etag)
        };
        if let Ok(value) = HeaderValue::from_str(&quoted) {
            resp_headers.insert(header::ETAG, value);
        }
    }
    set_last_modified(resp_headers, info.last_modified);

    Ok(response)
}

/// Body that reads `length` bytes from the handle's current offset and
/// closes it once drained or failed.
fn stream_body(handle: FileHandle, length: u64) -> Body {
    let chunks = stream::unfold((handle, length), |(mut handle, remaining)| async move {
        if remaining == 0 {
            release(&mut handle).await;
            return None;
        }
        let mut buf = vec![0u8; remaining.min(STREAM_CHUNK) as usize];
        match handle.read(&mut buf).await {
            Ok(0) => {
                release(&mut handle).await;
                None
            }
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Bytes::from(buf)), (handle, remaining - n as u64)))
            }
            Err(err) => Some((Err(io::Error::other(err)), (handle, 0))),
        }
    });
    Body::from_stream(chunks)
}

async fn release(handle: &mut FileHandle) {
    if let Err(err) = handle.close().await {
        debug!("closing object handle: {}", err);
    }
}

/// Parse a single-span `bytes=` range. Multi-range and malformed headers
/// fall back to the full body.
pub fn parse_range_header(value: &str, size: u64) -> ByteRange {
    let Some(ranges) = value.trim().strip_prefix("bytes=") else {
        return ByteRange::Full;
    };
    if ranges.contains(',') {
        return ByteRange::Full;
    }
    let Some((start, end)) = ranges.split_once('-') else {
        return ByteRange::Full;
    };
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        let Ok(suffix) = end.parse::<u64>() else {
            return ByteRange::Full;
        };
        if suffix == 0 || size == 0 {
            return ByteRange::Unsatisfiable;
        }
        return ByteRange::Partial(size.saturating_sub(suffix), size - 1);
    }

    let Ok(start) = start.parse::<u64>() else {
        return ByteRange::Full;
    };
    if start >= size {
        return ByteRange::Unsatisfiable;
    }
    let end = if end.is_empty() {
        size - 1
    } else {
        match end.parse::<u64>() {
            Ok(end) if end >= start => end.min(size - 1),
            _ => return ByteRange::Full,
        }
    };
    ByteRange::Partial(start, end)
}

fn not_modified(headers: &HeaderMap, modified: DateTime<Utc>) -> bool {
    headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
        .is_some_and(|since| modified.timestamp() <= since.timestamp())
}

fn set_last_modified(headers: &mut HeaderMap, modified: DateTime<Utc>) {
    let value = modified.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}

fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, value)]).into_response(),
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

fn render_listing(mut entries: ListingPage) -> Response {
    entries.sort_by(|a, b| a.name().cmp(b.name()));

    let mut html = String::from(
        "<!doctype html>\n<meta name=\"viewport\" content=\"width=device-width\">\n<pre>\n",
    );
    for entry in &entries {
        let (href, label) = if entry.is_dir() {
            (
                format!("{}/", urlencoding::encode(entry.name())),
                format!("{}/", entry.name()),
            )
        } else {
            (
                urlencoding::encode(entry.name()).into_owned(),
                entry.name().to_string(),
            )
        };
        html.push_str(&format!(
            "<a href=\"{}\">{}</a>\n",
            html_escape(&href),
            html_escape(&label)
        ));
    }
    html.push_str("</pre>\n");

    let mut response = Response::new(Body::from(html));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_ranges() {
        assert_eq!(parse_range_header("bytes=0-4", 10), ByteRange::Partial(0, 4));
        assert_eq!(parse_range_header("bytes=6-", 10), ByteRange::Partial(6, 9));
        assert_eq!(parse_range_header("bytes=-3", 10), ByteRange::Partial(7, 9));
        assert_eq!(parse_range_header("bytes=-30", 10), ByteRange::Partial(0, 9));
        assert_eq!(parse_range_header("bytes=5-100", 10), ByteRange::Partial(5, 9));
    }

    #[test]
    fn rejects_ranges_past_the_end() {
        assert_eq!(parse_range_header("bytes=10-", 10), ByteRange::Unsatisfiable);
        assert_eq!(parse_range_header("bytes=-0", 10), ByteRange::Unsatisfiable);
        assert_eq!(parse_range_header("bytes=0-1", 0), ByteRange::Unsatisfiable);
    }

    #[test]
    fn ignores_unsupported_ranges() {
        assert_eq!(parse_range_header("items=0-4", 10), ByteRange::Full);
        assert_eq!(parse_range_header("bytes=0-1,3-4", 10), ByteRange::Full);
        assert_eq!(parse_range_header("bytes=4-2", 10), ByteRange::Full);
        assert_eq!(parse_range_header("bytes=x-2", 10), ByteRange::Full);
    }

    #[test]
    fn encodes_each_path_segment() {
        assert_eq!(encode_path("/my docs/a&b/"), "/my%20docs/a%26b/");
        assert_eq!(encode_path("/"), "/");
    }

    #[test]
    fn escapes_listing_names() {
        assert_eq!(html_escape("<a&b>"), "&lt;a&amp;b&gt;");
    }
}
