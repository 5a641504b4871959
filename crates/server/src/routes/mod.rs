//! Route handlers for the shapefiley server.

pub mod health;
pub mod shapefiles;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined router for every dynamic route.
///
/// Routes:
/// - POST /upload - Accept an archive and start its conversion
/// - GET  /shapefiles/{shapefile_id} - Job status, plus geometry once finished
/// - GET  /api/health - Health check
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(shapefiles::router())
        .nest("/api", health::router())
        .with_state(state)
}
