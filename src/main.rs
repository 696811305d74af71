//! project-drop server binary.
//!
//! Accepts project submissions (a file plus title, description, category and
//! an optional link), stores the file in the upload directory and appends a
//! record to a flat JSON array file. The stored records and files are served
//! back through a listing and a download endpoint.

mod atomic;
mod config;
mod error;
mod etag;
mod filename;
mod files;
mod frontend;
mod http;
mod logging;
mod projects;
mod routes;
mod storage;
mod store;
mod upload;

use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;

use crate::config::{Args, SHUTDOWN_GRACE_SECS};
use crate::http::build_cors_layer;
use crate::storage::Storage;
use crate::store::ProjectStore;

shadow!(build);

/// 启动服务并阻塞直到收到退出信号。
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let args = Args::parse();
    let storage = Arc::new(Storage::new(PathBuf::from(&args.upload_dir)));
    let store = Arc::new(ProjectStore::new(PathBuf::from(&args.data_file)));
    storage.ensure_root().await?;
    store
        .ensure_initialized()
        .await
        .map_err(|err| std::io::Error::other(err.to_string()))?;
    info!(
        upload_dir = ?storage.root_path(),
        data_file = ?store.path(),
        "storage ready"
    );

    let mut app = routes::build_router(storage, store, args.upload_max_size);
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

    tokio::spawn(shutdown_signal(handle));
    server.await
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
