//! Serve the contents of an object-storage bucket as a static website.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod tls;
