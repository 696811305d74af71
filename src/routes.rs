//! 路由装配。

use axum::extract::{DefaultBodyLimit, Extension};
use axum::routing::{get, post};
use axum::{Router, middleware};
use std::sync::Arc;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::storage::Storage;
use crate::store::ProjectStore;
use crate::{files, frontend, http, projects, upload};

/// 构建应用路由；`upload_max_size` 为 0 时不限制上传请求体大小。
pub fn build_router(
    storage: Arc<Storage>,
    store: Arc<ProjectStore>,
    upload_max_size: u64,
) -> Router {
    let body_limit = match usize::try_from(upload_max_size) {
        Ok(0) | Err(_) => DefaultBodyLimit::disable(),
        Ok(limit) => DefaultBodyLimit::max(limit),
    };

    Router::new()
        .route("/", get(frontend::serve_index))
        .route(
            "/upload",
            post(upload::upload_project).layer(body_limit),
        )
        .route("/projects_json", get(projects::list_projects))
        .route("/uploads/{*filename}", get(files::download_upload))
        .layer(middleware::from_fn(http::add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(http::make_request_span::<axum::body::Body>)
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(storage))
        .layer(Extension(store))
}
