// crates/server/src/jobs/types.rs
//! Types for the conversion job system.

use serde::Serialize;
use shapefiley_core::{JobStatus, ShapefileId};

/// A job reached a terminal status. Sent after the status is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub job_id: ShapefileId,
    pub name: String,
    pub status: JobStatus,
    pub timestamp: String,
}
