//! CORS policy for site responses.

use axum::http::{HeaderValue, Method, header, request::Parts};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use wildmatch::WildMatch;

/// Build the CORS layer. Patterns may use `*` and `?` wildcards, e.g.
/// `https://*.example.com`. No patterns means every origin is echoed back.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origin = if allowed_origins.is_empty() {
        AllowOrigin::mirror_request()
    } else {
        let patterns = compile_patterns(allowed_origins);
        AllowOrigin::predicate(move |origin: &HeaderValue, _parts: &Parts| {
            origin
                .to_str()
                .map(|origin| origin_allowed(&patterns, origin))
                .unwrap_or(false)
        })
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
        .expose_headers([
            header::CONTENT_LENGTH,
            header::CONTENT_RANGE,
            header::ACCEPT_RANGES,
            header::ETAG,
            header::LAST_MODIFIED,
        ])
        .allow_credentials(true)
}

fn compile_patterns(allowed_origins: &[String]) -> Vec<WildMatch> {
    allowed_origins.iter().map(|p| WildMatch::new(p)).collect()
}

fn origin_allowed(patterns: &[WildMatch], origin: &str) -> bool {
    patterns.iter().any(|pattern| pattern.matches(origin))
}
