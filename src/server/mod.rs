//! HTTP surface: upload and count, extract, clean up.
//!
//! All responses are JSON except the binary downloads from
//! `/api/pdf/extract`.

pub mod error;
pub mod routes;

use std::path::Path;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue},
    routing::{delete, get, post},
    Router,
};
use tower_http::compression::{
    predicate::{DefaultPredicate, NotForContentType, Predicate},
    CompressionLayer,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::extract::Extractor;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub extractor: Extractor,
    /// Reported by the health endpoint
    pub tool_version: Option<String>,
    /// Grace period between finishing a download and deleting its files
    pub cleanup_delay: Duration,
    pub max_upload_bytes: usize,
}

const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; style-src 'self' 'unsafe-inline'; \
    script-src 'self'; img-src 'self' data: blob:; connect-src 'self'; font-src 'self'; \
    object-src 'none'; media-src 'self'; frame-src 'none'";

pub fn router(state: AppState, static_dir: Option<&Path>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/api/health", get(routes::health))
        .route(
            "/api/pdf/info",
            post(routes::pdf_info).layer(DefaultBodyLimit::max(state.max_upload_bytes)),
        )
        .route("/api/pdf/extract", post(routes::extract_pages))
        .route("/api/cleanup/:temp_path", delete(routes::cleanup));

    if let Some(dir) = static_dir {
        let index = ServeFile::new(dir.join("index.html"));
        app = app.fallback_service(ServeDir::new(dir).fallback(index));
    }

    // PDFs and archives are already compressed
    let compression = CompressionLayer::new().compress_when(
        DefaultPredicate::new()
            .and(NotForContentType::const_new("application/pdf"))
            .and(NotForContentType::const_new("application/zip")),
    );

    app.layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(compression)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CONTENT_SECURITY_POLICY),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .with_state(state)
}
