// crates/db/src/store.rs
//! The job record store seam.
//!
//! The lifecycle manager only needs these five operations, so it takes an
//! `Arc<dyn JobRecordStore>` instead of a concrete [`Database`].

use std::path::Path;

use async_trait::async_trait;
use shapefiley_core::{JobStatus, Shapefile, ShapefileId};

use crate::{Database, DbResult};

#[async_trait]
pub trait JobRecordStore: Send + Sync {
    /// Insert a `started` job and return it with its assigned id.
    async fn create(&self, name: &str) -> DbResult<Shapefile>;

    async fn set_archive_path(&self, id: ShapefileId, path: &Path) -> DbResult<()>;

    /// Move a `started` job to `status`. Returns whether the row changed.
    async fn finish(&self, id: ShapefileId, status: JobStatus) -> DbResult<bool>;

    async fn get(&self, id: ShapefileId) -> DbResult<Option<Shapefile>>;

    /// Drop a job whose intake failed before conversion could start.
    async fn discard(&self, id: ShapefileId) -> DbResult<()>;
}

#[async_trait]
impl JobRecordStore for Database {
    async fn create(&self, name: &str) -> DbResult<Shapefile> {
        self.create_shapefile(name).await
    }

    async fn set_archive_path(&self, id: ShapefileId, path: &Path) -> DbResult<()> {
        Database::set_archive_path(self, id, path).await
    }

    async fn finish(&self, id: ShapefileId, status: JobStatus) -> DbResult<bool> {
        self.finish_shapefile(id, status).await
    }

    async fn get(&self, id: ShapefileId) -> DbResult<Option<Shapefile>> {
        self.get_shapefile(id).await
    }

    async fn discard(&self, id: ShapefileId) -> DbResult<()> {
        self.delete_shapefile(id).await
    }
}
