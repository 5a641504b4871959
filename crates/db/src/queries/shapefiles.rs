//! Shapefile job record queries.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use shapefiley_core::{JobStatus, Shapefile, ShapefileId};

use crate::{Database, DbError, DbResult};

type ShapefileRow = (i64, String, String, Option<String>, i64);

fn row_to_shapefile(row: ShapefileRow) -> DbResult<Shapefile> {
    let (id, name, status, archive_path, created_at) = row;
    let status = status
        .parse::<JobStatus>()
        .map_err(|e| DbError::InvalidStatus { id, status: e.0 })?;
    Ok(Shapefile {
        id,
        name,
        status,
        archive_path: archive_path.map(PathBuf::from),
        created_at: DateTime::from_timestamp(created_at, 0).unwrap_or_default(),
    })
}

impl Database {
    /// Insert a new job in `started` state and return it with its id.
    pub async fn create_shapefile(&self, name: &str) -> DbResult<Shapefile> {
        let created_at = Utc::now().timestamp();
        let row: ShapefileRow = sqlx::query_as(
            "INSERT INTO shapefiles (name, status, created_at) VALUES (?, ?, ?)
             RETURNING id, name, status, archive_path, created_at",
        )
        .bind(name)
        .bind(JobStatus::Started.as_str())
        .bind(created_at)
        .fetch_one(self.pool())
        .await?;
        row_to_shapefile(row)
    }

    /// Record where the uploaded archive for `id` was written.
    pub async fn set_archive_path(&self, id: ShapefileId, path: &Path) -> DbResult<()> {
        sqlx::query("UPDATE shapefiles SET archive_path = ? WHERE id = ?")
            .bind(path.to_string_lossy().into_owned())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Move a `started` job to a terminal status.
    ///
    /// Returns `false` without touching the row if the job is missing or has
    /// already left `started`, so a status changes at most once.
    pub async fn finish_shapefile(&self, id: ShapefileId, status: JobStatus) -> DbResult<bool> {
        let result = sqlx::query("UPDATE shapefiles SET status = ? WHERE id = ? AND status = ?")
            .bind(status.as_str())
            .bind(id)
            .bind(JobStatus::Started.as_str())
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn get_shapefile(&self, id: ShapefileId) -> DbResult<Option<Shapefile>> {
        let row: Option<ShapefileRow> = sqlx::query_as(
            "SELECT id, name, status, archive_path, created_at FROM shapefiles WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        row.map(row_to_shapefile).transpose()
    }

    /// Remove a job whose intake never completed.
    pub async fn delete_shapefile(&self, id: ShapefileId) -> DbResult<()> {
        sqlx::query("DELETE FROM shapefiles WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
