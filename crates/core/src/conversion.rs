// crates/core/src/conversion.rs
//! The external conversion step.
//!
//! Turning an archive into a spatial table is somebody else's job: a shell
//! script that unzips, runs shp2pgsql and pipes the SQL into the work
//! database. From here it is a black box that either succeeds or fails.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::ConversionError;

/// Longest stderr excerpt kept on a failed run.
const STDERR_TAIL_BYTES: usize = 2048;

/// Loads an archive into a spatial table named after the job.
#[async_trait]
pub trait ConversionRunner: Send + Sync {
    async fn run(&self, archive_path: &Path, job_name: &str) -> Result<(), ConversionError>;
}

/// Runs `<program> [args..] <archive_path> <job_name>` and waits for it.
///
/// There is no timeout. A process that never exits keeps its job in
/// `started` forever.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ScriptRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Arguments placed before the archive path and job name.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl ConversionRunner for ScriptRunner {
    async fn run(&self, archive_path: &Path, job_name: &str) -> Result<(), ConversionError> {
        tracing::info!(
            program = %self.program.display(),
            archive = %archive_path.display(),
            job_name,
            "Starting conversion"
        );

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(archive_path)
            .arg(job_name)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false)
            .spawn()
            .map_err(|source| ConversionError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| ConversionError::Wait {
                program: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            tracing::debug!(
                job_name,
                stdout_bytes = output.stdout.len(),
                "Conversion process exited cleanly"
            );
            Ok(())
        } else {
            Err(ConversionError::Exited {
                code: output.status.code(),
                stderr: stderr_tail(&output.stderr),
            })
        }
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}
