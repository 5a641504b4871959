//! Shared fixtures for handler and router tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use shapefiley_core::{ArchiveStore, ConversionRunner, JobStatus, ScriptRunner, Shapefile, ShapefileId};
use shapefiley_db::spatial::ExtractedRow;
use shapefiley_db::{Database, DbError, DbResult, GeometryReader, SpatialStore, SqlxError};
use tempfile::TempDir;

use crate::jobs::JobRunner;
use crate::state::AppState;

pub const BOUNDARY: &str = "shapefiley-test-boundary";

/// In-memory stand-in for the PostGIS work database.
///
/// Reading a table it does not know fails the way a missing relation does.
#[derive(Default)]
pub struct FakeSpatial {
    tables: HashMap<String, Vec<ExtractedRow>>,
}

impl FakeSpatial {
    pub fn with_table(name: &str, rows: Vec<ExtractedRow>) -> Self {
        let mut tables = HashMap::new();
        tables.insert(name.to_lowercase(), rows);
        Self { tables }
    }
}

#[async_trait]
impl SpatialStore for FakeSpatial {
    async fn extract_polygons(&self, table: &str) -> DbResult<Vec<ExtractedRow>> {
        self.tables
            .get(&table.to_lowercase())
            .cloned()
            .ok_or_else(|| {
                DbError::Sqlx(SqlxError::Protocol(format!(
                    "relation \"{}\" does not exist",
                    table.to_lowercase()
                )))
            })
    }
}

/// State over an in-memory job database, an archive directory in a fresh
/// temp dir, a converter that succeeds immediately and an empty work
/// database. Keep the `TempDir` alive for the duration of the test.
pub async fn test_state() -> (Arc<AppState>, TempDir) {
    let converter = ScriptRunner::new("/bin/sh").with_args(["-c", "exit 0", "worker"]);
    test_state_with(Arc::new(converter), Arc::new(FakeSpatial::default())).await
}

pub async fn test_state_with(
    converter: Arc<dyn ConversionRunner>,
    spatial: Arc<dyn SpatialStore>,
) -> (Arc<AppState>, TempDir) {
    let tmp = TempDir::new().unwrap();
    let db = Database::new_in_memory().await.unwrap();
    let archives = ArchiveStore::new(tmp.path());
    let jobs = Arc::new(JobRunner::new(Arc::new(db), archives, converter));
    let state = AppState::new(jobs, GeometryReader::new(spatial));
    (state, tmp)
}

pub fn shapefile(id: ShapefileId, name: &str, status: JobStatus) -> Shapefile {
    Shapefile {
        id,
        name: name.to_string(),
        status,
        archive_path: None,
        created_at: chrono::Utc::now(),
    }
}

/// A `multipart/form-data` body with a single file field.
pub fn multipart_body(field: &str, filename: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/zip\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_request(field: &str, filename: &str, content: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(field, filename, content)))
        .unwrap()
}
