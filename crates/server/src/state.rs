// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use shapefiley_db::{GeometryReader, JobRecordStore};

use crate::jobs::JobRunner;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Job lifecycle: intake, background conversion, status writes.
    pub jobs: Arc<JobRunner>,
    /// Reads converted geometry out of the work database.
    pub geometry: GeometryReader,
}

impl AppState {
    /// Create a new application state wrapped in an Arc for sharing.
    pub fn new(jobs: Arc<JobRunner>, geometry: GeometryReader) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            jobs,
            geometry,
        })
    }

    /// The job record store the runner writes to.
    pub fn store(&self) -> &Arc<dyn JobRecordStore> {
        self.jobs.store()
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
