// crates/server/src/lib.rs
//! Shapefiley server library.
//!
//! Axum HTTP server that accepts zipped shapefile uploads, converts each one
//! in the background with the worker script, and serves job status plus the
//! converted geometry as GeoJSON.

pub mod config;
pub mod error;
pub mod jobs;
pub mod routes;
pub mod state;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::*;
pub use jobs::{JobRunner, StatusChange};
pub use routes::api_routes;
pub use state::AppState;

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
///
/// This sets up:
/// - Upload, status and health routes
/// - Static files from `static_dir` for every other path, when given
/// - An upload body limit of `max_upload_bytes`
/// - CORS allowing any origin
/// - Request tracing
pub fn create_app(
    state: Arc<AppState>,
    static_dir: Option<PathBuf>,
    max_upload_bytes: usize,
) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = api_routes(state);
    if let Some(dir) = static_dir {
        tracing::info!(dir = %dir.display(), "Serving static files");
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
