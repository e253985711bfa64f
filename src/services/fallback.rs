//! Ordered fallback resolution for file-like requests.
//!
//! A request for `key` probes, strictly in order: the key itself,
//! `key/index.html`, `key/index.htm`, the configured SPA entry point, and
//! finally `404.html` at the bucket root. The first candidate that both
//! opens and stats wins.

use crate::{
    errors::{FsError, FsResult},
    models::object::ObjectInfo,
    services::object_store::{ObjectReader, ObjectStore, StoreError},
};
use tracing::{debug, warn};

/// Bucket-root object served when nothing else matched.
pub const NOT_FOUND_PAGE: &str = "404.html";

/// Which step of the chain produced a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidate {
    Exact,
    IndexHtml,
    IndexHtm,
    SpaFallback,
    NotFoundPage,
}

/// An opened object together with the stat that validated it.
pub struct ResolvedFile {
    pub candidate: Candidate,
    pub reader: Box<dyn ObjectReader>,
    pub info: ObjectInfo,
}

impl std::fmt::Debug for ResolvedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedFile")
            .field("candidate", &self.candidate)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Build the probe order for `key`.
pub fn candidates(key: &str, spa_file: Option<&str>) -> Vec<(Candidate, String)> {
    let mut list = vec![
        (Candidate::Exact, key.to_string()),
        (Candidate::IndexHtml, format!("{key}/index.html")),
        (Candidate::IndexHtm, format!("{key}/index.htm")),
    ];
    if let Some(spa) = spa_file {
        list.push((Candidate::SpaFallback, spa.trim_start_matches('/').to_string()));
    }
    list.push((Candidate::NotFoundPage, NOT_FOUND_PAGE.to_string()));
    list
}

/// Walk the chain for `key`. Individual candidate failures, transient or
/// not, are absorbed; exhausting the chain is always `FsError::NotFound`.
pub async fn resolve_file(
    store: &dyn ObjectStore,
    key: &str,
    spa_file: Option<&str>,
) -> FsResult<ResolvedFile> {
    for (candidate, candidate_key) in candidates(key, spa_file) {
        if let Some((reader, info)) = probe(store, &candidate_key).await {
            debug!(key, candidate = ?candidate, resolved = %candidate_key, "resolved file");
            return Ok(ResolvedFile {
                candidate,
                reader,
                info,
            });
        }
    }
    Err(FsError::NotFound)
}

/// Open and stat a single key. A reader whose stat fails is closed and
/// treated as a miss.
pub(crate) async fn probe(
    store: &dyn ObjectStore,
    key: &str,
) -> Option<(Box<dyn ObjectReader>, ObjectInfo)> {
    let mut reader = match store.get_object(key).await {
        Ok(reader) => reader,
        Err(err) => {
            log_miss(key, &err);
            return None;
        }
    };

    match reader.stat().await {
        Ok(info) => Some((reader, info)),
        Err(err) => {
            log_miss(key, &err);
            if let Err(err) = reader.close().await {
                debug!(key, "closing unresolved object: {}", err);
            }
            None
        }
    }
}

fn log_miss(key: &str, err: &StoreError) {
    // misses are the common case
    if !err.is_no_such_key() {
        warn!(key, "object store error while probing: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory_store::MemoryStore;

    async fn body(mut file: ResolvedFile) -> String {
        let mut buf = vec![0u8; file.info.size as usize];
        let n = file.reader.read(&mut buf).await.unwrap();
        String::from_utf8(buf[..n].to_vec()).unwrap()
    }

    #[test]
    fn candidate_order_is_fixed() {
        let keys: Vec<_> = candidates("docs", Some("/app.html"))
            .into_iter()
            .map(|(_, key)| key)
            .collect();
        assert_eq!(
            keys,
            vec![
                "docs",
                "docs/index.html",
                "docs/index.htm",
                "app.html",
                "404.html"
            ]
        );
        assert_eq!(candidates("docs", None).len(), 4);
    }

    #[tokio::test]
    async fn directory_key_resolves_through_index_candidate() {
        let store = MemoryStore::new();
        store.put("docs/index.html", "<h1>docs</h1>");

        let file = resolve_file(&store, "docs", None).await.unwrap();
        assert_eq!(file.candidate, Candidate::IndexHtml);
        assert_eq!(file.info.key, "docs/index.html");
        assert_eq!(body(file).await, "<h1>docs</h1>");
    }

    #[tokio::test]
    async fn spa_fallback_serves_unknown_paths() {
        let store = MemoryStore::new();
        store.put("app.html", "spa");

        let file = resolve_file(&store, "some/client/route", Some("app.html"))
            .await
            .unwrap();
        assert_eq!(file.candidate, Candidate::SpaFallback);
        assert_eq!(body(file).await, "spa");

        let direct = resolve_file(&store, "app.html", Some("app.html"))
            .await
            .unwrap();
        assert_eq!(direct.candidate, Candidate::Exact);
        assert_eq!(store.gets(), 5);
    }

    #[tokio::test]
    async fn not_found_page_is_last_resort() {
        let store = MemoryStore::new();
        store.put("404.html", "custom missing page");

        let file = resolve_file(&store, "missing.txt", None).await.unwrap();
        assert_eq!(file.candidate, Candidate::NotFoundPage);
        assert_eq!(body(file).await, "custom missing page");
    }

    #[tokio::test]
    async fn real_asset_wins_over_spa_and_404() {
        let store = MemoryStore::new();
        store.put("assets/app.js", "js");
        store.put("app.html", "spa");
        store.put("404.html", "missing");

        let file = resolve_file(&store, "assets/app.js", Some("app.html"))
            .await
            .unwrap();
        assert_eq!(file.candidate, Candidate::Exact);
        assert_eq!(store.gets(), 1);
    }

    #[tokio::test]
    async fn empty_store_is_not_found() {
        let store = MemoryStore::new();
        let err = resolve_file(&store, "x", Some("app.html")).await.unwrap_err();
        assert!(matches!(err, FsError::NotFound));
        assert_eq!(store.gets(), 5);
    }

    #[tokio::test]
    async fn stat_failure_skips_candidate_and_releases_reader() {
        let store = MemoryStore::new();
        store.put("page", "uncommitted");
        store.put("page/index.html", "index");
        store.fail_stat("page");

        let file = resolve_file(&store, "page", None).await.unwrap();
        assert_eq!(file.candidate, Candidate::IndexHtml);
        assert_eq!(store.closes(), 1);
    }

    #[tokio::test]
    async fn transient_errors_do_not_abort_the_chain() {
        let store = MemoryStore::new();
        store.put("404.html", "missing");
        store.fail_get("x");
        store.fail_get("x/index.html");

        let file = resolve_file(&store, "x", None).await.unwrap();
        assert_eq!(file.candidate, Candidate::NotFoundPage);
    }

    #[tokio::test]
    async fn unreachable_404_page_is_still_not_found() {
        let store = MemoryStore::new();
        store.put("404.html", "missing");
        store.fail_get("404.html");

        let err = resolve_file(&store, "x", None).await.unwrap_err();
        assert!(matches!(err, FsError::NotFound));
    }
}
