//! Upload and status endpoints for shapefile jobs.
//!
//! - POST /upload - multipart form with a `file` field; only the first
//!   `file` field is processed
//! - GET /shapefiles/{shapefile_id} - the job, with its geometry once finished

use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use shapefiley_core::{Shapefile, ShapefileId};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// A job as returned by the status endpoint.
///
/// `Geom` is only present for finished jobs and has one entry per table row.
/// `GeomDropped` counts rows with no polygon geometry, `GeomError` a failed
/// geometry query (in which case `Geom` is empty).
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ShapefileResponse {
    #[serde(flatten)]
    pub shapefile: Shapefile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geom: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geom_dropped: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geom_error: Option<String>,
}

impl From<Shapefile> for ShapefileResponse {
    fn from(shapefile: Shapefile) -> Self {
        Self {
            shapefile,
            geom: None,
            geom_dropped: None,
            geom_error: None,
        }
    }
}

/// Path ids that are not integers resolve to 0, which no job ever has.
fn parse_shapefile_id(raw: &str) -> ShapefileId {
    raw.trim().parse().unwrap_or(0)
}

/// POST /upload - Create a job from the uploaded archive and start converting it.
///
/// Responds as soon as the job is recorded; the conversion runs in the
/// background.
async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<Shapefile>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Upload(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_owned)
            .ok_or_else(|| ApiError::BadRequest("form field `file` has no file name".to_string()))?;
        let archive = field
            .bytes()
            .await
            .map_err(|e| ApiError::Upload(e.to_string()))?;

        let job = state.jobs.create_job(&filename, &archive).await?;
        state.jobs.start_conversion(job.clone());
        return Ok(Json(job));
    }

    Err(ApiError::BadRequest("missing form field `file`".to_string()))
}

/// GET /shapefiles/{shapefile_id} - Job status, with geometry when finished.
async fn show_shapefile(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<ShapefileResponse>> {
    let id = parse_shapefile_id(&raw_id);
    let shapefile = state
        .store()
        .get(id)
        .await?
        .ok_or(ApiError::ShapefileNotFound(id))?;

    if !shapefile.is_finished() {
        return Ok(Json(shapefile.into()));
    }

    let geometry = state.geometry.fetch(&shapefile).await;
    let mut response = ShapefileResponse::from(shapefile);
    match geometry {
        Ok(set) => {
            response.geom = Some(set.features);
            response.geom_dropped = (set.dropped > 0).then_some(set.dropped);
        }
        Err(e) => {
            tracing::error!(shapefile_id = id, error = %e, "Geometry query failed");
            response.geom = Some(Vec::new());
            response.geom_error = Some(e.to_string());
        }
    }
    Ok(Json(response))
}

/// Build the shapefile router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/upload", post(upload))
        .route("/shapefiles/{shapefile_id}", get(show_shapefile))
}
