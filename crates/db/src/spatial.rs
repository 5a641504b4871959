// crates/db/src/spatial.rs
//! Read side of the PostGIS work database.
//!
//! Each successfully converted job leaves a table named after the job in the
//! work database. Its geometry is never copied anywhere: every status read
//! of a finished job re-queries the table and serializes each row as a
//! GeoJSON string.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shapefiley_core::Shapefile;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::{DbError, DbResult};

/// One row of a converted table after polygon extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRow {
    /// `ST_AsGeoJSON` of the extracted geometry; `None` when the source
    /// geometry was NULL.
    pub geojson: Option<String>,
    /// Whether extraction left nothing behind (points or lines only).
    pub empty: bool,
}

/// Source of converted geometry, one table per job.
#[async_trait]
pub trait SpatialStore: Send + Sync {
    /// Run polygon extraction over every row of `table`, in scan order.
    async fn extract_polygons(&self, table: &str) -> DbResult<Vec<ExtractedRow>>;
}

/// Connection pool for the work database the conversion script loads into.
#[derive(Debug, Clone)]
pub struct WorkDatabase {
    pool: PgPool,
}

impl WorkDatabase {
    /// Build a lazily connecting pool. Nothing is dialled until the first
    /// geometry read, so the server starts even when PostGIS is down.
    pub fn connect_lazy(url: &str) -> DbResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect_lazy(url)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SpatialStore for WorkDatabase {
    async fn extract_polygons(&self, table: &str) -> DbResult<Vec<ExtractedRow>> {
        let sql = format!(
            "SELECT ST_AsGeoJSON(g), ST_IsEmpty(g) \
             FROM (SELECT ST_CollectionExtract(geom, 3) AS g FROM {}) AS extracted",
            quote_table(table)?
        );
        let rows: Vec<(Option<String>, Option<bool>)> =
            sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|(geojson, empty)| ExtractedRow {
                geojson,
                empty: empty.unwrap_or(true),
            })
            .collect())
    }
}

/// Quote a job name as a PostgreSQL table identifier.
///
/// shp2pgsql folds unquoted table names to lower case, so the name is
/// lowered before quoting.
pub fn quote_table(name: &str) -> DbResult<String> {
    if name.trim().is_empty() || name.contains('\0') {
        return Err(DbError::InvalidTableName(name.to_string()));
    }
    Ok(format!("\"{}\"", name.to_lowercase().replace('"', "\"\"")))
}

/// Geometry of one finished job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeometrySet {
    /// One GeoJSON string per table row, in table scan order.
    pub features: Vec<String>,
    /// Rows whose polygon extraction came back NULL or empty.
    pub dropped: usize,
}

/// Stands in for a row whose extraction returned NULL.
pub const EMPTY_POLYGON: &str = r#"{"type":"Polygon","coordinates":[]}"#;

/// Filtering policy for converted rows.
///
/// `ST_CollectionExtract(geom, 3)` keeps only the polygon parts of each
/// geometry. Every row still yields exactly one feature: rows left empty
/// (point and line data) keep their empty GeoJSON, NULL extractions become
/// [`EMPTY_POLYGON`]. Both are counted as dropped.
pub struct PolygonalExtraction;

impl PolygonalExtraction {
    pub fn apply(rows: Vec<ExtractedRow>) -> GeometrySet {
        let mut set = GeometrySet {
            features: Vec::with_capacity(rows.len()),
            dropped: 0,
        };
        for row in rows {
            if row.empty || row.geojson.is_none() {
                set.dropped += 1;
            }
            set.features
                .push(row.geojson.unwrap_or_else(|| EMPTY_POLYGON.to_string()));
        }
        set
    }
}

/// Serializes the geometry of finished jobs.
#[derive(Clone)]
pub struct GeometryReader {
    store: Arc<dyn SpatialStore>,
}

impl GeometryReader {
    pub fn new(store: Arc<dyn SpatialStore>) -> Self {
        Self { store }
    }

    /// Geometry for `job`.
    ///
    /// Jobs that are not `finished` have no table worth reading and always
    /// yield an empty set without touching the work database.
    pub async fn fetch(&self, job: &Shapefile) -> DbResult<GeometrySet> {
        if !job.is_finished() {
            return Ok(GeometrySet::default());
        }

        let rows = self.store.extract_polygons(&job.name).await?;
        let total = rows.len();
        let set = PolygonalExtraction::apply(rows);
        if set.dropped > 0 {
            tracing::warn!(
                job_id = job.id,
                table = %job.name,
                total,
                dropped = set.dropped,
                "Rows without polygon geometry"
            );
        }
        Ok(set)
    }
}
