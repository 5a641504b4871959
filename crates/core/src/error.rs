// crates/core/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Errors that stop an upload from becoming a job.
///
/// When one of these is returned no conversion is started.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Archive has no usable file name: {filename:?}")]
    InvalidFilename { filename: String },

    #[error("Failed to create archive directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write archive {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to record job: {0}")]
    Store(String),
}

/// Errors from a single run of the external conversion process.
///
/// Only ever logged; the job itself just moves to `failed`.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Job has no archive to convert")]
    MissingArchive,

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed waiting for {program}: {source}")]
    Wait {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Conversion exited with {}: {stderr}", exit_label(.code))]
    Exited { code: Option<i32>, stderr: String },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "a signal".to_string(),
    }
}

/// Errors while generating the worker script at startup.
#[derive(Debug, Error)]
pub enum WorkerScriptError {
    #[error("{tool} not found on PATH")]
    ToolMissing { tool: String },

    #[error("Failed to write worker script {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
