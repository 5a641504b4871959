// crates/core/src/types.rs
//! The shapefile job record and its status.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier assigned by the job store when a record is created.
pub type ShapefileId = i64;

/// Where a conversion job is in its lifecycle.
///
/// A job is created `Started` and moves exactly once, to `Finished` or
/// `Failed`. Neither terminal state ever changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Started,
    Finished,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Started => "started",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Started)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown job status {:?}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(JobStatus::Started),
            "finished" => Ok(JobStatus::Finished),
            "failed" => Ok(JobStatus::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// One upload-to-conversion job.
///
/// Serializes to `{"Id":1,"Name":"parcels","Status":"started"}`. The archive
/// path and creation time stay internal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Shapefile {
    pub id: ShapefileId,
    pub name: String,
    pub status: JobStatus,
    #[serde(skip)]
    pub archive_path: Option<PathBuf>,
    #[serde(skip, default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Shapefile {
    pub fn is_finished(&self) -> bool {
        self.status == JobStatus::Finished
    }
}

/// Derive the job name from an uploaded file name.
///
/// The name is everything before the first `.` of the final path component,
/// so `parcels.zip` and `parcels.shp.zip` both become `parcels`. The name
/// doubles as the spatial table name. Returns `None` when nothing is left.
pub fn job_name_from_filename(filename: &str) -> Option<String> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let stem = base.split('.').next().unwrap_or_default().trim();
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}
