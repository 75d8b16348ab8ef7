//! Filedrop server binary.
//!
//! Users drop files onto a public upload endpoint; the server stores them
//! under randomized names next to a single `metadata.json` describing each
//! upload. An admin panel guarded by a shared secret can list and delete the
//! stored files.

mod admin;
mod app;
mod atomic;
mod auth;
mod config;
mod error;
mod files;
mod http;
mod logging;
mod metadata;
mod naming;
mod storage;
mod upload;

use axum_server::Handle;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;

use crate::auth::AdminAuth;
use crate::config::{Args, SHUTDOWN_GRACE_SECS};
use crate::http::build_cors_layer;
use crate::naming::ExtensionBlocklist;
use crate::storage::FileStore;

/// Starts the Filedrop server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let args = Args::parse();
    args.validate()?;

    let blocklist = ExtensionBlocklist::new(&args.blocked_extensions);
    let storage = Arc::new(FileStore::new(PathBuf::from(&args.upload_dir), blocklist));
    storage.ensure_root().await?;
    let auth = Arc::new(AdminAuth::new(args.admin_password.clone()));
    info!(
        upload_dir = ?storage.root_path(),
        metadata = ?storage.metadata().path(),
        blocked_extensions = ?args.blocked_extensions,
        "file store ready"
    );

    let mut app = app::build_router(storage, auth, args.max_upload_size);
    if let Some(cors_layer) = build_cors_layer(args.cors_origins.as_deref()) {
        app = app.layer(cors_layer);
    }

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let handle = Handle::new();

    info!("Starting HTTP server at {}", addr);

    let server = axum_server::bind(addr)
        .handle(handle.clone())
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());

    tokio::select! {
        result = server => result?,
        _ = shutdown_signal(handle) => {}
    }

    Ok(())
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(SHUTDOWN_GRACE_SECS)));
}
