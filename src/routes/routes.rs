//! Defines the routes of the static site server.
//!
//! ## Structure
//! - **Probes**
//!   - `GET /healthz` : liveness
//!   - `GET /readyz`  : lists one entry of the served root
//!
//! - **Site content**
//!   - `GET|HEAD /`         : root directory
//!   - `GET|HEAD /{*path}`  : any file or directory below it
//!
//! The probes are matched first, so objects named `healthz` or `readyz` at the
//! bucket root are shadowed.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        static_handlers::serve_path,
    },
    routes::cors::cors_layer,
    state::AppState,
};
use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

/// Build the router for probes and site content.
///
/// `allowed_origins` feeds the CORS layer; an empty list mirrors any origin.
pub fn routes(allowed_origins: &[String]) -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // site content; `get` also answers HEAD
        .route("/", get(serve_path))
        .route("/{*path}", get(serve_path))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
}
