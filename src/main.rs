use anyhow::Result;
use axum::Router;
use bucketfs_www::{
    config::AppConfig,
    routes::routes::routes,
    services::{bucket_fs::BucketFs, s3_store::S3Store},
    state::AppState,
    tls,
};
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config ---
    let cfg = AppConfig::from_env_and_args()?;

    tracing::info!("Starting bucketfs-www with config: {:?}", cfg);

    // --- Load TLS material before binding ---
    let tls_config = cfg.tls.as_ref().map(tls::load_server_config).transpose()?;

    // --- Initialize store + filesystem adapter ---
    let store = S3Store::new(&cfg.store)?;
    let fs = BucketFs::new(Arc::new(store), cfg.fs.clone());
    let state = AppState::new(fs, cfg.listing_limit);

    // --- Build router ---
    let app: Router = routes(&cfg.allowed_cors_origins).with_state(state);

    // --- Start server ---
    let addr = cfg.address.as_str();
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) if err.kind() == ErrorKind::PermissionDenied && binds_all_interfaces(addr) => {
            let port = addr.rsplit_once(':').map(|(_, port)| port).unwrap_or("8080");
            let fallback_addr = format!("127.0.0.1:{}", port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    match tls_config {
        Some(tls_config) => {
            tracing::info!("Server listening on https://{}", listener.local_addr()?);
            tls::serve_tls(listener, app, tls_config, shutdown_signal()).await?;
        }
        None => {
            tracing::info!("Server listening on http://{}", listener.local_addr()?);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }

    tracing::info!("Server stopped");
    Ok(())
}

fn binds_all_interfaces(addr: &str) -> bool {
    let host = addr.rsplit_once(':').map(|(host, _)| host).unwrap_or(addr);
    matches!(host, "0.0.0.0" | "::" | "[::]" | "")
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::warn!("failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
