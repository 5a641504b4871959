// crates/core/src/worker_script.rs
//! Generation of `worker.sh`, the script [`ScriptRunner`](crate::ScriptRunner)
//! invokes for every upload.
//!
//! The script is regenerated at startup so it always points at the
//! shp2pgsql found on this machine and the currently configured work
//! database command.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::error::WorkerScriptError;

/// The converter the script shells out to.
pub const SHP2PGSQL: &str = "shp2pgsql";

/// Inputs for rendering the worker script.
#[derive(Debug, Clone)]
pub struct WorkerScript {
    /// Directory the archive was written to; unzip output lands here too.
    pub work_dir: PathBuf,
    /// Absolute path of shp2pgsql.
    pub shp2pgsql: PathBuf,
    /// Shell command that executes SQL read from stdin against the work
    /// database, e.g. `psql postgres://localhost/shapefiley_work`.
    pub work_command: String,
}

impl WorkerScript {
    /// Render the script text. `$1` is the archive path, `$2` the job name.
    pub fn render(&self) -> String {
        [
            "#!/usr/bin/env bash".to_string(),
            "set -euo pipefail".to_string(),
            format!("cd {}", shell_quote(&self.work_dir.display().to_string())),
            r#"unzip -o -a "$1""#.to_string(),
            format!(
                r#"{} -s 4326 -I -c -W UTF-8 "$2" "$2" > "$2.sql""#,
                shell_quote(&self.shp2pgsql.display().to_string())
            ),
            format!(r#"{} < "$2.sql""#, self.work_command),
        ]
        .join("\n")
            + "\n"
    }

    /// Write the rendered script to `path` and mark it executable.
    pub fn write(&self, path: &Path) -> Result<(), WorkerScriptError> {
        let io_err = |source| WorkerScriptError::Io {
            path: path.to_path_buf(),
            source,
        };
        std::fs::write(path, self.render()).map_err(io_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
                .map_err(io_err)?;
        }

        tracing::info!(path = %path.display(), shp2pgsql = %self.shp2pgsql.display(), "Worker script written");
        Ok(())
    }
}

/// Find `tool` in the directories of a `PATH`-style list.
pub fn find_on_path(tool: &str, path_var: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(path_var)
        .map(|dir| dir.join(tool))
        .find(|candidate| is_executable(candidate))
}

/// Find `tool` on this process's `PATH`.
pub fn locate_tool(tool: &str) -> Result<PathBuf, WorkerScriptError> {
    std::env::var_os("PATH")
        .and_then(|path| find_on_path(tool, &path))
        .ok_or_else(|| WorkerScriptError::ToolMissing {
            tool: tool.to_string(),
        })
}

fn is_executable(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Single-quote `s` for a POSIX shell.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
