//! Maps request paths onto object keys.
//!
//! Pure string manipulation; never talks to the store.

/// Outcome of resolving a request path against the bucket sub-path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedPath {
    /// Directory-like request. `prefix` is `""` for the bucket root and
    /// otherwise ends with exactly one `/`.
    Directory { prefix: String },
    /// File-like request with its candidate object key.
    File { key: String },
}

/// Resolve `request_path` under `bucket_path`.
///
/// The request path is cleaned as a rooted path first so `..` segments can
/// never climb above the configured sub-path. Root and any request ending in
/// `/` are directory-like.
pub fn resolve(request_path: &str, bucket_path: &str) -> ResolvedPath {
    let request = clean_segments(request_path);
    let is_root = request.is_empty();
    let mut segments = clean_segments(bucket_path);
    segments.extend(request);

    if is_root || request_path.ends_with('/') {
        ResolvedPath::Directory {
            prefix: directory_prefix(&segments),
        }
    } else {
        ResolvedPath::File {
            key: segments.join("/"),
        }
    }
}

/// Cleaned, rooted form of a directory request path, ending in `/`.
pub fn directory_path(request_path: &str) -> String {
    let segments = clean_segments(request_path);
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", segments.join("/"))
    }
}

/// Listing prefix for the root of the served tree.
pub fn root_prefix(bucket_path: &str) -> String {
    directory_prefix(&clean_segments(bucket_path))
}

fn directory_prefix(segments: &[&str]) -> String {
    if segments.is_empty() {
        String::new()
    } else {
        format!("{}/", segments.join("/"))
    }
}

/// Split a slash-separated path into segments, dropping empty and `.`
/// segments and applying `..` (which stops at the root).
fn clean_segments(path: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments
}
