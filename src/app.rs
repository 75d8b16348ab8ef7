//! 路由装配：公开接口、管理接口与通用中间件。

use axum::extract::{DefaultBodyLimit, Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::routing::{delete, get, post};
use axum::{Router, middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info_span};

use crate::auth::{self, AdminAuth};
use crate::http::{add_security_headers, extract_forwarded_ip};
use crate::storage::FileStore;
use crate::{admin, files, upload};

/// Builds the application router with every route and shared layer.
pub fn build_router(
    storage: Arc<FileStore>,
    auth: Arc<AdminAuth>,
    max_upload_size: usize,
) -> Router {
    let admin_routes = Router::new()
        .route("/api/admin/files", get(admin::list_admin_files))
        .route("/api/admin/files/delete-bulk", post(admin::bulk_delete_files))
        .route("/api/admin/files/{stored_name}", delete(admin::delete_file))
        .route_layer(middleware::from_fn(auth::require_admin));

    Router::new()
        .route(
            "/upload",
            post(upload::upload_files).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route("/files", get(files::list_files))
        .route("/download/{stored_name}", get(files::download_file))
        .route("/api/admin/verify", post(auth::verify_admin))
        .merge(admin_routes)
        .layer(middleware::from_fn(add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let forwarded_ip =
                        extract_forwarded_ip(request.headers()).map(|ip| ip.to_string());
                    let connect_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.to_string());
                    let client_ip = forwarded_ip
                        .or(connect_ip)
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(storage))
        .layer(Extension(auth))
}
