//! Directory emulation over prefix listings.
//!
//! A listing is a non-recursive enumeration of `prefix`. Keys that still
//! contain a `/` after the prefix collapse into one virtual directory each,
//! so the result is correct whether or not the store groups by delimiter.
//! Enumeration stops, and the listing token is cancelled, as soon as the
//! requested number of entries has been collected.

use crate::{
    errors::{FsError, FsResult},
    models::entry::{ListingPage, ResolvedEntry},
    services::object_store::ObjectStore,
};
use futures::StreamExt;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// List `prefix`. `count <= 0` means no bound.
///
/// A failure mid-listing discards everything read so far.
pub async fn list_directory(
    store: &dyn ObjectStore,
    prefix: &str,
    count: i64,
) -> FsResult<ListingPage> {
    let limit = usize::try_from(count).ok().filter(|n| *n > 0);
    let cancel = CancellationToken::new();
    // fires on every exit path, including errors and request cancellation
    let _guard = cancel.clone().drop_guard();
    let mut listing = store.list_objects(prefix, false, cancel.clone());

    let mut entries = ListingPage::new();
    let mut seen_dirs = HashSet::new();
    while let Some(item) = listing.next().await {
        let info = item.map_err(|source| FsError::ListingFailed {
            prefix: prefix.to_string(),
            source,
        })?;

        let Some(rest) = info.key.strip_prefix(prefix) else {
            continue;
        };
        // a zero-byte "folder" marker named exactly like the prefix
        if rest.is_empty() {
            continue;
        }

        match rest.find('/') {
            Some(pos) => {
                let name = &rest[..pos];
                if !name.is_empty() && seen_dirs.insert(name.to_string()) {
                    entries.push(ResolvedEntry::directory(&format!("{prefix}{name}")));
                }
            }
            None => entries.push(ResolvedEntry::File(info)),
        }

        if limit.is_some_and(|limit| entries.len() >= limit) {
            cancel.cancel();
            break;
        }
    }
    drop(listing);

    debug!(prefix, count = entries.len(), "listed directory");
    Ok(entries)
}
