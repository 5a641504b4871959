// crates/core/src/archive.rs
//! On-disk storage for uploaded archives.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::error::IntakeError;
use crate::types::ShapefileId;

/// Writes uploaded archives into a shared working directory.
///
/// Every archive lands at `<root>/<id>_<filename>`, so concurrent jobs never
/// write to the same path. The conversion script later unpacks the archive
/// in the same directory.
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    root: PathBuf,
}

impl ArchiveStore {
    /// Create a store rooted at `root`. Relative roots are resolved against
    /// the current directory so recorded archive paths are always absolute.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = if root.is_relative() {
            std::env::current_dir()
                .map(|cwd| cwd.join(&root))
                .unwrap_or(root)
        } else {
            root
        };
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the working directory if it does not exist yet.
    pub async fn ensure_root(&self) -> Result<(), IntakeError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| IntakeError::CreateDir {
                path: self.root.clone(),
                source,
            })
    }

    /// Path an archive for job `id` would be written to.
    ///
    /// Any directory components in the client-supplied name are dropped.
    pub fn path_for(&self, id: ShapefileId, filename: &str) -> Result<PathBuf, IntakeError> {
        let base = Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| IntakeError::InvalidFilename {
                filename: filename.to_string(),
            })?;
        Ok(self.root.join(format!("{id}_{base}")))
    }

    /// Write the raw archive bytes for job `id` and return where they went.
    pub async fn persist(
        &self,
        id: ShapefileId,
        filename: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, IntakeError> {
        let path = self.path_for(id, filename)?;
        self.ensure_root().await?;

        let io_err = |source| IntakeError::Io {
            path: path.clone(),
            source,
        };
        let mut file = tokio::fs::File::create(&path).await.map_err(io_err)?;
        file.write_all(bytes).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;

        tracing::debug!(job_id = id, path = %path.display(), size = bytes.len(), "Archive persisted");
        Ok(path)
    }
}
