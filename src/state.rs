//! Shared state handed to every request handler.

use crate::services::bucket_fs::BucketFs;

#[derive(Clone)]
pub struct AppState {
    pub fs: BucketFs,
    /// Entries rendered per directory listing; `<= 0` lists everything.
    pub listing_limit: i64,
}

impl AppState {
    pub fn new(fs: BucketFs, listing_limit: i64) -> Self {
        Self { fs, listing_limit }
    }
}
