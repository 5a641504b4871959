// crates/core/src/lib.rs
//! Domain types and process boundaries for shapefiley.
//!
//! Nothing in here talks to a database. The job record, the archive store
//! and the conversion runner live here so the db and server crates can share
//! them without depending on each other.

pub mod archive;
pub mod conversion;
pub mod error;
pub mod types;
pub mod worker_script;

pub use archive::ArchiveStore;
pub use conversion::{ConversionRunner, ScriptRunner};
pub use error::*;
pub use types::*;
