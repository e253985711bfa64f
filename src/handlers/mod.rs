//! HTTP handlers: static file serving over `BucketFs` plus health probes.

pub mod health_handlers;
pub mod static_handlers;
